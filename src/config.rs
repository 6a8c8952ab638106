use std::collections::BTreeMap;
use std::time::Duration;

use dotenv::dotenv;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::common::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LEASE_TTL_SECS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RETRY_BACKOFF_MS, LOSSLESS_QUALITY_THRESHOLD,
};
use crate::presets::{QualityPreset, SizeBox, SizeTag, default_presets};

/// What happens to a task whose handler failed fatally.
///
/// `Park` dead-letters on the first failure: nothing is ever silently
/// lost, nothing is retried. `Bounded` re-queues with a linear backoff
/// until `max_attempts` claims have failed, then dead-letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RetryPolicy {
    Park,
    Bounded { max_attempts: u32, backoff_ms: u64 },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Park
    }
}

/// Full configuration surface of the pipeline: size table, quality
/// presets, worker timing, and the retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sizes: BTreeMap<SizeTag, SizeBox>,
    pub presets: Vec<QualityPreset>,
    pub default_policy: String,
    pub poll_interval_ms: u64,
    pub idle_timeout_secs: u64,
    pub lease_ttl_secs: u64,
    pub lossless_threshold: u8,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut sizes = BTreeMap::new();
        sizes.insert(SizeTag::Xs, SizeBox::new(160, 160));
        sizes.insert(SizeTag::Sm, SizeBox::new(320, 320));
        sizes.insert(SizeTag::Md, SizeBox::new(640, 640));
        sizes.insert(SizeTag::Lg, SizeBox::new(1024, 1024));
        sizes.insert(SizeTag::Xl, SizeBox::new(1920, 1920));
        sizes.insert(SizeTag::Full, SizeBox::UNBOUNDED);
        Self {
            sizes,
            presets: default_presets(),
            default_policy: "standard".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            lossless_threshold: LOSSLESS_QUALITY_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `PIXELMILL_*` environment variables (a
    /// `.env` file is honored when present).
    pub fn from_env() -> Self {
        dotenv().ok();
        let mut config = Self::default();
        if let Some(ms) = read_env_u64("PIXELMILL_POLL_INTERVAL_MS") {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = read_env_u64("PIXELMILL_IDLE_TIMEOUT_SECS") {
            config.idle_timeout_secs = secs;
        }
        if let Some(secs) = read_env_u64("PIXELMILL_LEASE_TTL_SECS") {
            config.lease_ttl_secs = secs;
        }
        if let Ok(policy) = std::env::var("PIXELMILL_DEFAULT_POLICY") {
            if !policy.trim().is_empty() {
                config.default_policy = policy.trim().to_string();
            }
        }
        if let Some(attempts) = read_env_u64("PIXELMILL_MAX_ATTEMPTS") {
            config.retry = match attempts {
                0 | 1 => RetryPolicy::Park,
                n => RetryPolicy::Bounded {
                    max_attempts: n as u32,
                    backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
                },
            };
        }
        config
    }

    pub fn preset(&self, name: &str) -> Option<&QualityPreset> {
        self.presets.iter().find(|preset| preset.name == name)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparseable {key}={raw:?}");
            None
        }
    }
}
