use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the accrual poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Base URL of the accrual authority, e.g. `http://localhost:8081`
    pub accrual_address: String,

    /// Seconds between the start of two poll cycles
    pub poll_interval_secs: u64,

    /// Minimum spacing between two lookups once the burst is spent.
    /// Zero disables pacing.
    pub request_spacing_ms: u64,

    /// Lookups that may go out back to back before pacing kicks in
    pub burst: u32,

    /// Upper bound on lookups outstanding at the same time
    pub max_in_flight: usize,

    /// Pause after a cycle the authority rate limited
    pub rate_limit_cooldown_secs: u64,

    /// Timeout of one lookup request
    pub request_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            accrual_address: "http://localhost:8081".to_string(),
            poll_interval_secs: 5,
            request_spacing_ms: 100,
            burst: 1,
            max_in_flight: 1,
            rate_limit_cooldown_secs: 60,
            request_timeout_ms: 10_000,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.accrual_address.trim().is_empty() {
            anyhow::bail!("accrual address must not be empty");
        }
        if !self.accrual_address.starts_with("http://") && !self.accrual_address.starts_with("https://") {
            anyhow::bail!("accrual address must start with http:// or https://, got {}", self.accrual_address);
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll interval must be at least one second");
        }
        if self.burst == 0 {
            anyhow::bail!("burst must be at least 1");
        }
        if self.max_in_flight == 0 {
            anyhow::bail!("max_in_flight must be at least 1");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("request timeout must be positive");
        }
        Ok(())
    }
}
