//! Retry policy and concurrency limits (spec §3).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// `{max_retries, initial_delay, max_delay, backoff_factor}`. Delay sequence:
/// `d_k = min(initial_delay * backoff_factor^k, max_delay)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `k` (0-indexed).
    pub fn delay_for(&self, k: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(k as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// `{global_max, per_workflow_max}` — admission control limits (spec §3,
/// §4.7). Defaults `{10, 3}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ConcurrencyLimits {
    pub global_max: usize,
    pub per_workflow_max: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            global_max: 10,
            per_workflow_max: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_sequence_follows_exponential_backoff_capped_at_max() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(10), Duration::from_millis(100)); // capped
    }
}
