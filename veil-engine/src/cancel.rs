//! Cooperative cancellation, checked between rows and before commits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use veil_core::errors::RunError;

/// Cloneable cancellation handle shared between the caller and workers.
#[derive(Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a clean stop. Workers notice at the next row or commit
    /// boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Bail out with `RunError::Cancelled` if a stop was requested.
    pub fn check(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_trips_after_cancel() {
        let cancel = Cancellation::new();
        assert!(cancel.check().is_ok());
        let clone = cancel.clone();
        clone.cancel();
        assert!(matches!(cancel.check(), Err(RunError::Cancelled)));
    }
}
