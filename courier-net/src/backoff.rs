//! Backoff between re-authentication replays.

use std::time::Duration;

/// Delay policy applied before an unauthorized call is replayed.
#[derive(Debug, Clone, Default)]
pub enum BackoffStrategy {
    /// Replay immediately.
    #[default]
    None,
    /// Constant delay before every replay.
    Constant(Duration),
    /// Linear backoff: delay grows by a fixed amount per attempt.
    Linear {
        /// Delay increment per attempt.
        delay: Duration,
        /// Maximum delay.
        max: Duration,
    },
    /// Exponential backoff.
    Exponential {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier (typically 2.0).
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Exponential backoff doubling from `initial`, capped at 30 seconds.
    pub fn exponential(initial: Duration) -> Self {
        Self::Exponential {
            initial,
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Linear backoff growing by `delay`, capped at 30 seconds.
    pub fn linear(delay: Duration) -> Self {
        Self::Linear {
            delay,
            max: Duration::from_secs(30),
        }
    }

    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Linear { delay, max } => {
                let total = delay.saturating_mul(attempt + 1);
                total.min(*max)
            }
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backoff_by_default() {
        let strategy = BackoffStrategy::default();
        assert_eq!(strategy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(strategy.delay_for_attempt(2), Duration::ZERO);
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = BackoffStrategy::exponential(Duration::from_millis(100));

        assert_eq!(strategy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(strategy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_backoff_is_capped() {
        let strategy = BackoffStrategy::Linear {
            delay: Duration::from_millis(100),
            max: Duration::from_millis(250),
        };

        assert_eq!(strategy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(strategy.delay_for_attempt(2), Duration::from_millis(250));
    }
}
