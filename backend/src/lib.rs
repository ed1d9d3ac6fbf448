//! Tabula admin binary library
//!
//! Exposes the binary's modules for integration testing.

pub mod args;
pub mod commands;
pub mod lifecycle;
pub mod logging;
