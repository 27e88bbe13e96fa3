//! Wall-clock budget for long-running operations.

use super::errors::{BackupError, Result};
use std::time::{Duration, Instant};

/// Fails with [`BackupError::TimedOut`] once the budget is spent.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn start(budget: Option<Duration>) -> Option<Self> {
        budget.map(|budget| Self {
            at: Instant::now() + budget,
            budget,
        })
    }

    pub(crate) fn check(deadline: Option<Self>) -> Result<()> {
        match deadline {
            Some(d) if Instant::now() >= d.at => Err(BackupError::TimedOut(d.budget)),
            _ => Ok(()),
        }
    }
}
