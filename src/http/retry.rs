use std::sync::Arc;
use std::time::Duration;

use crate::http::error::HttpError;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: f64 },
}

/// Answer from the policy for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    pub fn stop() -> Self {
        Self { retry: false, delay: Duration::ZERO }
    }
}

/// Per-request retry configuration. Pure: `should_retry` has no side
/// effects and asking it past `max_attempts` always answers no.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
    backoff: Backoff,
    predicate: Option<Arc<dyn Fn(&HttpError) -> bool + Send + Sync>>,
}

impl RetryPolicy {
    /// `max_attempts` counts total attempts, so 0 and 1 both mean no retry.
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            predicate: None,
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Restrict retry to errors the predicate accepts. Kinds that are
    /// terminal by contract stay non-retryable no matter what it says.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HttpError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// `attempt` is the number of attempts already made (1-based after
    /// the first failure).
    pub fn should_retry(&self, error: &HttpError, attempt: usize) -> RetryDecision {
        if attempt >= self.max_attempts || error.is_terminal() {
            return RetryDecision::stop();
        }

        let accepted = match &self.predicate {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        };
        if !accepted {
            return RetryDecision::stop();
        }

        let delay = match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor } => {
                // attempt >= 1 here, first retry waits the base delay
                self.delay.mul_f64(factor.powi(attempt as i32 - 1))
            }
        };

        RetryDecision { retry: true, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorKind;

    #[test]
    fn stops_at_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let err = HttpError::transient("connection reset");

        assert!(policy.should_retry(&err, 1).retry);
        assert!(policy.should_retry(&err, 2).retry);
        assert!(!policy.should_retry(&err, 3).retry);
        // Beyond the ceiling stays false forever
        assert!(!policy.should_retry(&err, 4).retry);
        assert!(!policy.should_retry(&err, 100).retry);
    }

    #[test]
    fn zero_attempts_never_retries() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        let err = HttpError::transient("timeout");
        assert!(!policy.should_retry(&err, 0).retry);
        assert!(!policy.should_retry(&err, 1).retry);
    }

    #[test]
    fn default_policy_only_retries_transient() {
        let policy = RetryPolicy::new(5, Duration::ZERO);

        assert!(policy.should_retry(&HttpError::transient("x"), 1).retry);
        assert!(!policy.should_retry(&HttpError::application("x"), 1).retry);
        assert!(!policy.should_retry(&HttpError::malformed("x"), 1).retry);
        assert!(!policy.should_retry(&HttpError::fatal("x"), 1).retry);
    }

    #[test]
    fn predicate_can_widen_to_application_errors() {
        let policy = RetryPolicy::new(5, Duration::ZERO).with_predicate(|err| {
            matches!(err.kind, ErrorKind::Transient | ErrorKind::Application)
        });

        assert!(policy.should_retry(&HttpError::application("busy"), 1).retry);
        // Malformed is terminal by contract even if the predicate says yes
        let open = RetryPolicy::new(5, Duration::ZERO).with_predicate(|_| true);
        assert!(!open.should_retry(&HttpError::malformed("bad json"), 1).retry);
        assert!(!open.should_retry(&HttpError::fatal("bug"), 1).retry);
    }

    #[test]
    fn exponential_backoff_grows() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100))
            .with_backoff(Backoff::Exponential { factor: 2.0 });
        let err = HttpError::transient("x");

        assert_eq!(policy.should_retry(&err, 1).delay, Duration::from_millis(100));
        assert_eq!(policy.should_retry(&err, 2).delay, Duration::from_millis(200));
        assert_eq!(policy.should_retry(&err, 3).delay, Duration::from_millis(400));
    }

    #[test]
    fn fixed_backoff_stays_flat() {
        let policy = RetryPolicy::new(4, Duration::from_millis(50));
        let err = HttpError::transient("x");

        assert_eq!(policy.should_retry(&err, 1).delay, Duration::from_millis(50));
        assert_eq!(policy.should_retry(&err, 3).delay, Duration::from_millis(50));
    }
}
