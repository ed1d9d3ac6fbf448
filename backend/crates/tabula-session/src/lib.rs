//! # tabula-session
//!
//! Resolves what a caller may see and change in a table, given the table's
//! access policy and the caller's `AccessContext`.
//!
//! ## Security Philosophy
//!
//! - **Fail Closed**: a caller without a resolved identity never writes to a
//!   private table, and reads from it come back empty.
//! - **Exhaustive**: every decision matches on all caller kinds; adding a
//!   kind is a compile error until each rule handles it.
//!
//! ## Rules
//!
//! | Policy | admin | api_key | end_user (id) | end_user (no id) / anonymous |
//! |--------|-------|---------|---------------|------------------------------|
//! | public | all rows | all rows | all rows | all rows |
//! | private | all rows | all rows | owned rows | read: empty, write: auth required |
//! | system | all rows | all rows | denied | auth required |

pub mod error;
pub mod permissions;

pub use error::{SessionError, SessionResult};
pub use permissions::{read_scope, write_scope, ReadScope, WriteScope};
