//! Retry policy for report generation.
//!
//! Only rate-limited failures are retried. Every other failure ends the loop
//! on the attempt that produced it. The transitions are plain functions over
//! [`RetryState`] so the timing and exhaustion rules can be tested without a
//! provider.

use std::time::Duration;

use thiserror::Error;

use super::{GenerateResponse, ProviderError};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to generate report after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: ProviderError,
    },

    #[error("report generation failed on attempt {attempt}: {source}")]
    NonRetryable {
        attempt: u32,
        #[source]
        source: ProviderError,
    },
}

impl GenerationError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::NonRetryable { attempt, .. } => *attempt,
        }
    }

    pub fn last_error(&self) -> &ProviderError {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::NonRetryable { source, .. } => source,
        }
    }
}

#[derive(Debug)]
pub enum RetryState {
    Attempting(u32),
    Backoff {
        attempt: u32,
        delay: Duration,
        error: ProviderError,
    },
    Succeeded(GenerateResponse),
    Failed(GenerationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn start(&self) -> RetryState {
        RetryState::Attempting(1)
    }

    /// Linear backoff: `base_delay * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn on_outcome(
        &self,
        attempt: u32,
        outcome: Result<GenerateResponse, ProviderError>,
    ) -> RetryState {
        match outcome {
            Ok(resp) => RetryState::Succeeded(resp),
            Err(error) if error.is_rate_limited() => RetryState::Backoff {
                attempt,
                delay: self.delay_for(attempt),
                error,
            },
            Err(source) => RetryState::Failed(GenerationError::NonRetryable { attempt, source }),
        }
    }

    /// Called once the backoff delay for `attempt` has elapsed.
    pub fn after_backoff(&self, attempt: u32, error: ProviderError) -> RetryState {
        if attempt < self.max_attempts {
            RetryState::Attempting(attempt + 1)
        } else {
            RetryState::Failed(GenerationError::Exhausted {
                attempts: attempt,
                last_error: error,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderErrorKind;

    fn rate_limited() -> ProviderError {
        ProviderError::new(ProviderErrorKind::RateLimited, "quota exhausted")
    }

    fn response() -> GenerateResponse {
        GenerateResponse {
            content: "ok".to_string(),
            model: "test-model".to_string(),
            input_tokens: 1,
            output_tokens: 1,
            finish_reason: "stop".to_string(),
            provider: "fake".to_string(),
        }
    }

    #[test]
    fn test_delay_is_linear_in_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_success_ends_loop() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.on_outcome(1, Ok(response())),
            RetryState::Succeeded(_)
        ));
    }

    #[test]
    fn test_rate_limit_moves_to_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        match policy.on_outcome(2, Err(rate_limited())) {
            RetryState::Backoff { attempt, delay, .. } => {
                assert_eq!(attempt, 2);
                assert_eq!(delay, Duration::from_millis(20));
            }
            other => panic!("expected backoff, got {other:?}"),
        }
    }

    #[test]
    fn test_other_failures_are_terminal() {
        let policy = RetryPolicy::default();
        for kind in [
            ProviderErrorKind::Auth,
            ProviderErrorKind::InvalidRequest,
            ProviderErrorKind::Server,
            ProviderErrorKind::Network,
        ] {
            let state = policy.on_outcome(1, Err(ProviderError::new(kind, "boom")));
            match state {
                RetryState::Failed(GenerationError::NonRetryable { attempt, source }) => {
                    assert_eq!(attempt, 1);
                    assert_eq!(source.kind, kind);
                }
                other => panic!("expected terminal failure for {kind:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_backoff_advances_until_exhausted() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        assert!(matches!(
            policy.after_backoff(1, rate_limited()),
            RetryState::Attempting(2)
        ));
        assert!(matches!(
            policy.after_backoff(2, rate_limited()),
            RetryState::Attempting(3)
        ));
        match policy.after_backoff(3, rate_limited()) {
            RetryState::Failed(err) => {
                assert_eq!(err.attempts(), 3);
                let msg = err.to_string();
                assert!(msg.contains("3 attempts"), "{msg}");
                assert!(msg.contains("quota exhausted"), "{msg}");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
