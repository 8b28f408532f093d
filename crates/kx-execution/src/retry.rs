//! Exponential backoff for broker transport retries. Applies only to
//! [`crate::broker::BrokerError::Transport`]; business rejections never
//! retry.

use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const fn orders() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            multiplier: 2.0,
            cap: Duration::from_millis(10_000),
            max_attempts: 3,
        }
    }

    pub const fn queries() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 1.5,
            cap: Duration::from_millis(5_000),
            max_attempts: 5,
        }
    }

    /// Delay before the `attempt`-th retry (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 1);
        let capped = millis.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_then_caps() {
        let p = BackoffPolicy::orders();
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        assert_eq!(p.delay_for(10), p.cap);
    }
}
