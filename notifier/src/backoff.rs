//! Delay between primary-channel attempts.

use common::DispatchConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed { delay: Duration },
    /// `base * factor^attempt`, capped at `max`, optionally with +/- 50% jitter
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(4),
            jitter: true,
        }
    }
}

impl Backoff {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::Exponential {
            base: Duration::from_millis(config.backoff_base_ms),
            factor: 2.0,
            max: Duration::from_millis(config.backoff_max_ms),
            jitter: true,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let capped = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped);

                if !jitter {
                    return delay;
                }
                let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                let offset = fastrand::u64(0..=(jitter_ms * 2));
                let total_ms = delay.as_millis() as i64 + offset as i64 - jitter_ms as i64;
                Duration::from_millis(total_ms.max(0) as u64)
            }
        }
    }
}
