//! Bounded retry with session restart for flaky remote extraction.
//!
//! The browser session degrades in ways a plain retry does not fix
//! (wedged renderer, dead DevTools socket). The supervisor keeps a
//! consecutive-failure counter across calls; once it reaches the
//! restart threshold the whole session is torn down and relaunched
//! before the next attempt.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::extractor::{ExtractError, PageExtractor};

/// Retry parameters, independent of the operation being wrapped.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per operation before the failure is handed back.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Consecutive failures (across operations) that trigger a session
    /// restart.
    pub restart_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            restart_threshold: 3,
        }
    }
}

/// Wraps fallible extraction operations for one run. Owns the
/// consecutive-failure counter; the counter survives between listings
/// and resets on any success.
pub struct SessionSupervisor {
    policy: RetryPolicy,
    consecutive_failures: u32,
}

impl SessionSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one extraction operation with retries. The operation gets a
    /// fresh borrow of the extractor and its context on every attempt.
    /// Exhausting attempts returns the last observed failure; the
    /// caller decides whether that is per-listing or run-fatal.
    pub async fn run<E, C, T, F>(
        &mut self,
        extractor: &mut E,
        ctx: &C,
        mut op: F,
    ) -> Result<T, ExtractError>
    where
        E: PageExtractor,
        C: ?Sized,
        F: for<'a> FnMut(&'a mut E, &'a C) -> BoxFuture<'a, Result<T, ExtractError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op(extractor, ctx).await {
                Ok(value) => {
                    self.consecutive_failures = 0;
                    return Ok(value);
                }
                Err(err) => err,
            };

            self.consecutive_failures += 1;
            warn!(
                "Extraction attempt {}/{} failed ({} consecutive): {}",
                attempt, max_attempts, self.consecutive_failures, err
            );

            if self.consecutive_failures >= self.policy.restart_threshold {
                info!(
                    "{} consecutive failures, restarting browser session",
                    self.consecutive_failures
                );
                match extractor.restart().await {
                    Ok(()) => self.consecutive_failures = 0,
                    // Counter stays up so the next failure tries again.
                    Err(restart_err) => warn!("Session restart failed: {}", restart_err),
                }
            }

            if attempt >= max_attempts {
                return Err(err);
            }
            tokio::time::sleep(self.policy.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::FutureExt;

    use super::*;
    use crate::extractor::SearchHit;
    use crate::models::{ListingRef, RatingFields, RawDetails};

    /// Scripted extractor: `fail_first` operations fail, the rest
    /// succeed. Counts restarts.
    struct Scripted {
        fail_first: u32,
        calls: u32,
        restarts: u32,
    }

    impl Scripted {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: 0,
                restarts: 0,
            }
        }

        fn attempt(&mut self) -> Result<u32, ExtractError> {
            self.calls += 1;
            if self.calls <= self.fail_first {
                Err(ExtractError::MissingField("title"))
            } else {
                Ok(self.calls)
            }
        }
    }

    #[async_trait]
    impl PageExtractor for Scripted {
        async fn enumerate_listings(
            &mut self,
            _base_url: &str,
        ) -> Result<Vec<ListingRef>, ExtractError> {
            unreachable!()
        }
        async fn extract_details(&mut self, _href: &str) -> Result<RawDetails, ExtractError> {
            unreachable!()
        }
        async fn search_external(&mut self, _query: &str) -> Result<Vec<SearchHit>, ExtractError> {
            unreachable!()
        }
        async fn fetch_credits_text(&mut self, _url: &str) -> Result<String, ExtractError> {
            unreachable!()
        }
        async fn extract_rating_fields(
            &mut self,
            _url: &str,
        ) -> Result<RatingFields, ExtractError> {
            unreachable!()
        }
        async fn restart(&mut self) -> Result<(), ExtractError> {
            self.restarts += 1;
            Ok(())
        }
    }

    fn attempt_op<'a>(e: &'a mut Scripted, _ctx: &'a ()) -> BoxFuture<'a, Result<u32, ExtractError>> {
        async move { e.attempt() }.boxed()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
            restart_threshold: 3,
        }
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let mut supervisor = SessionSupervisor::new(fast_policy());
        let mut ex = Scripted::new(1);

        let value = supervisor
            .run(&mut ex, &(), attempt_op)
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(supervisor.consecutive_failures(), 0);
        assert_eq!(ex.restarts, 0);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error() {
        let mut supervisor = SessionSupervisor::new(fast_policy());
        let mut ex = Scripted::new(10);

        let err = supervisor
            .run(&mut ex, &(), attempt_op)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingField("title")));
        assert_eq!(ex.calls, 3);
    }

    #[tokio::test]
    async fn test_restart_at_threshold_resets_counter() {
        let mut supervisor = SessionSupervisor::new(fast_policy());
        let mut ex = Scripted::new(10);

        let _ = supervisor
            .run(&mut ex, &(), attempt_op)
            .await;
        // Third consecutive failure restarted the session and reset.
        assert_eq!(ex.restarts, 1);
        assert_eq!(supervisor.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_counter_carries_across_operations() {
        let mut supervisor = SessionSupervisor::new(RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(1),
            restart_threshold: 3,
        });
        let mut ex = Scripted::new(10);

        for _ in 0..2 {
            let _ = supervisor
                .run(&mut ex, &(), attempt_op)
                .await;
        }
        assert_eq!(supervisor.consecutive_failures(), 2);
        assert_eq!(ex.restarts, 0);

        let _ = supervisor
            .run(&mut ex, &(), attempt_op)
            .await;
        assert_eq!(ex.restarts, 1);
        assert_eq!(supervisor.consecutive_failures(), 0);
    }
}
