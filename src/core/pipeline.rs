//! Pipeline settings.
//!
//! Settings are read from the `pipeline` section of the config file; every
//! field has a default so an empty section is valid.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tunables for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Retry policy applied to every category extraction call
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Mandatory spacing between inference calls in milliseconds
    #[serde(default = "default_rate_interval")]
    pub rate_interval_ms: u64,

    /// Silence after which the stream receives a keepalive ping
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,

    /// Wall-clock ceiling for a whole run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

fn default_rate_interval() -> u64 {
    2000
}
fn default_keepalive() -> u64 {
    15
}
fn default_run_timeout() -> u64 {
    1800
} // 30 min

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            rate_interval_ms: default_rate_interval(),
            keepalive_seconds: default_keepalive(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

impl PipelineSettings {
    /// Parse settings from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline settings YAML")
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.retry_policy.max_attempts == 0 {
            anyhow::bail!("retry_policy.max_attempts must be at least 1");
        }
        if self.keepalive_seconds == 0 {
            anyhow::bail!("keepalive_seconds must be at least 1");
        }
        if self.run_timeout_seconds == 0 {
            anyhow::bail!("run_timeout_seconds must be at least 1");
        }
        Ok(())
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_seconds)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}

/// Retry policy for failed inference calls
///
/// `backoff(attempt) = max(min_delay, 2^attempt seconds + jitter)`, with
/// jitter drawn uniformly from `0..=jitter_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Floor for every backoff delay in milliseconds
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the random jitter in milliseconds
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_min_delay() -> u64 {
    3000
}
fn default_jitter() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay(),
            jitter_ms: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Delay after a failed attempt (1-indexed) for a given jitter
    pub fn delay_for_attempt(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponential = Duration::from_secs(2u64.saturating_pow(attempt)) + jitter;
        exponential.max(Duration::from_millis(self.min_delay_ms))
    }

    /// Delay after a failed attempt with freshly drawn jitter
    pub fn sample_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.delay_for_attempt(attempt, Duration::from_millis(jitter_ms))
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.retry_policy.max_attempts, 3);
        assert_eq!(settings.rate_interval(), Duration::from_secs(2));
        assert_eq!(settings.keepalive(), Duration::from_secs(15));
        assert_eq!(settings.run_timeout(), Duration::from_secs(30 * 60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings = PipelineSettings::from_yaml(
            r#"
rate_interval_ms: 500
retry_policy:
  max_attempts: 5
"#,
        )
        .unwrap();

        assert_eq!(settings.rate_interval_ms, 500);
        assert_eq!(settings.retry_policy.max_attempts, 5);
        assert_eq!(settings.retry_policy.min_delay_ms, 3000);
        assert_eq!(settings.keepalive_seconds, 15);
    }

    #[test]
    fn test_invalid_settings() {
        let settings = PipelineSettings {
            retry_policy: RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::default();

        // 2^1 = 2s is below the 3s floor
        assert_eq!(policy.delay_for_attempt(1, Duration::ZERO), Duration::from_secs(3));
        assert_eq!(
            policy.delay_for_attempt(1, Duration::from_millis(900)),
            Duration::from_secs(3)
        );
        assert_eq!(policy.delay_for_attempt(2, Duration::ZERO), Duration::from_secs(4));
        assert_eq!(
            policy.delay_for_attempt(2, Duration::from_millis(500)),
            Duration::from_millis(4500)
        );
        assert_eq!(policy.delay_for_attempt(3, Duration::ZERO), Duration::from_secs(8));
    }

    #[test]
    fn test_sampled_delay_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.sample_delay(2);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_retry_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
