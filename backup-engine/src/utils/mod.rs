//! Utility modules for the backup engine.

pub(crate) mod deadline;
pub mod errors;
pub mod logger;

pub(crate) use deadline::Deadline;
pub use errors::{BackupError, Result};
