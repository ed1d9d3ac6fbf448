//! tabula-configs
//!
//! Configuration types and loader for Tabula.

pub mod config;
pub mod file_helpers;

pub use config::defaults;
pub use config::*;
