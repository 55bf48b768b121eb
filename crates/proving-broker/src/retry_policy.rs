use std::time::Duration;

use trellis_config::proving::BrokerConfig;

/// Retry schedule whose delays grow geometrically and add up to a fixed time budget.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    max_retries: u64,
    total_time: Duration,
    base: f64,
}

impl ExponentialBackoff {
    pub fn new(max_retries: u64, total_time: Duration, base: f64) -> Self {
        Self {
            max_retries,
            total_time,
            base,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_total_time_ms),
            config.retry_backoff_base,
        )
    }

    pub fn max_retries(&self) -> u64 {
        self.max_retries
    }

    /// Delay before retry number `retry_counter`, rounded to whole milliseconds.
    pub fn get_delay(&self, retry_counter: u64) -> Duration {
        if retry_counter == 0 || self.max_retries == 0 {
            return Duration::ZERO;
        }

        // Geometric series sum: S_n = (1 - base^n) / (1 - base)
        let n = self.max_retries as f64;
        let sum_of_series = if (self.base - 1.0).abs() < f64::EPSILON {
            n
        } else {
            (1.0 - self.base.powf(n)) / (1.0 - self.base)
        };
        let base_delay = self.total_time.as_millis() as f64 / sum_of_series;
        let delay = base_delay * self.base.powf((retry_counter - 1) as f64);

        Duration::from_millis(delay.round() as u64)
    }
}
