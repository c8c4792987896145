//! Retry policy for transient SQLite contention.
//!
//! SQLite reports concurrent-writer conflicts as SQLITE_BUSY. Operations
//! wrapped in [`RetryPolicy::run`] are retried with exponential backoff
//! and jitter before the error is surfaced to the caller.

use std::thread;
use std::time::Duration;

use rand::Rng;

use super::error::DatabaseError;

/// An error type that can classify and represent transient contention.
pub trait Retryable {
    /// True when the error is transient contention worth retrying.
    fn is_busy(&self) -> bool;

    /// The error reported once the retry budget is exhausted.
    fn exhausted(retries: u32) -> Self;
}

impl Retryable for DatabaseError {
    fn is_busy(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }

    fn exhausted(retries: u32) -> Self {
        DatabaseError::Busy { retries }
    }
}

/// Backoff parameters for retrying busy database operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (0-based): `base * 2^retry` plus jitter.
    fn delay(&self, retry: u32) -> Duration {
        let backoff = self.base_delay * 2u32.saturating_pow(retry.min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        backoff + jitter
    }

    /// Runs `op`, retrying busy failures until the budget is spent.
    /// Non-busy errors are returned immediately.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Result<T, E>,
    {
        let mut retries = 0;
        loop {
            match op() {
                Err(e) if e.is_busy() => {
                    if retries >= self.max_retries {
                        log::warn!("Database still busy after {} retries, giving up", retries);
                        return Err(E::exhausted(retries));
                    }
                    let delay = self.delay(retries);
                    retries += 1;
                    log::debug!("Database busy, retry {} in {:?}", retries, delay);
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_error() -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        ))
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_succeeds_after_transient_busy() {
        let mut calls = 0;
        let result: Result<u32, DatabaseError> = fast_policy(5).run(|| {
            calls += 1;
            if calls < 3 {
                Err(busy_error())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let mut calls = 0;
        let result: Result<(), DatabaseError> = fast_policy(3).run(|| {
            calls += 1;
            Err(busy_error())
        });
        assert!(matches!(result, Err(DatabaseError::Busy { retries: 3 })));
        // Initial attempt plus three retries.
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_non_busy_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), DatabaseError> = fast_policy(5).run(|| {
            calls += 1;
            Err(DatabaseError::LockPoisoned)
        });
        assert!(matches!(result, Err(DatabaseError::LockPoisoned)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_retries_fails_fast() {
        let mut calls = 0;
        let result: Result<(), DatabaseError> = fast_policy(0).run(|| {
            calls += 1;
            Err(busy_error())
        });
        assert!(matches!(result, Err(DatabaseError::Busy { retries: 0 })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }
}
