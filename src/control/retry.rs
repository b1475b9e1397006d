use std::time::Duration;

use anyhow::{anyhow, Result};

/// Delay applied after a skipped iteration.
///
/// `Immediate` retries with no delay at all, which is the default. The other
/// policies key on the number of consecutive skipped iterations; the counter
/// resets after any iteration that reaches the decision stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Immediate,
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

impl RetryPolicy {
    /// Parse a policy name with its delay settings.
    pub fn from_parts(name: &str, delay: Duration, max_delay: Duration) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "immediate" | "none" => Ok(RetryPolicy::Immediate),
            "fixed" => Ok(RetryPolicy::Fixed(delay)),
            "exponential" | "backoff" => {
                if max_delay < delay {
                    return Err(anyhow!(
                        "retry max delay ({:?}) must not be below the initial delay ({:?})",
                        max_delay,
                        delay
                    ));
                }
                Ok(RetryPolicy::Exponential {
                    initial: delay,
                    max: max_delay,
                })
            }
            other => Err(anyhow!(
                "unknown retry policy '{}'; expected immediate, fixed or exponential",
                other
            )),
        }
    }

    /// Delay before the next iteration after `consecutive_failures` skips (>= 1).
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        match *self {
            RetryPolicy::Immediate => Duration::ZERO,
            RetryPolicy::Fixed(delay) => delay,
            RetryPolicy::Exponential { initial, max } => {
                let exponent = consecutive_failures.saturating_sub(1).min(20);
                initial.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}
