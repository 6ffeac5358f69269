//! Exponential backoff for transient storage errors.

use std::time::Duration;

use veil_core::errors::StorageError;

/// Run `op`, retrying transient failures with exponential backoff up to
/// `max_retries` extra attempts. Persistent errors propagate immediately.
pub fn with_backoff<T>(
    max_retries: u32,
    base_delay: Duration,
    mut op: impl FnMut() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient storage error; backing off"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_retry_until_success() {
        let mut failures = 2;
        let result = with_backoff(5, Duration::from_millis(1), || {
            if failures > 0 {
                failures -= 1;
                Err(StorageError::Busy)
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn persistent_errors_fail_fast() {
        let mut calls = 0;
        let result: Result<(), _> = with_backoff(5, Duration::from_millis(1), || {
            calls += 1;
            Err(StorageError::Corrupt {
                details: "x".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhaustion_returns_the_error() {
        let result: Result<(), _> =
            with_backoff(2, Duration::from_millis(1), || Err(StorageError::Busy));
        assert!(matches!(result, Err(StorageError::Busy)));
    }
}
