use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    buffer::BufferPlan,
    error::{OnairError, OnairResult},
    retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_JITTER, MAX_RETRY_DELAY},
    source::DEFAULT_USER_AGENT,
};

pub const DEFAULT_CACHE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Everything a [`crate::tuner::Tuner`] needs, loadable from TOML.
///
/// ```toml
/// [http]
/// user_agent = "my-player/1.0"
///
/// [retry]
/// jitter = 0.0
///
/// [cache]
/// enabled = true
/// dir = "/var/cache/onair"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnairConfig {
    pub http: HttpOptions,
    pub buffer: BufferPlan,
    pub retry: RetryOptions,
    pub cache: CacheOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    pub base_delay_ms: u64,
    /// Capped at 5000ms whatever the file says.
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: MAX_RETRY_DELAY.as_millis() as u64,
            jitter: DEFAULT_JITTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub enabled: bool,
    /// Cache directory. In memory when unset.
    pub dir: Option<PathBuf>,
    pub max_bytes: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            max_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

impl OnairConfig {
    pub fn load(path: impl AsRef<Path>) -> OnairResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&data)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(data: &str) -> OnairResult<Self> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OnairResult<()> {
        self.buffer.validate()?;

        if self.http.user_agent.trim().is_empty() {
            return Err(OnairError::InvalidConfig(
                "user agent must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(OnairError::InvalidConfig(format!(
                "retry jitter {} is outside 0.0..=1.0",
                self.retry.jitter
            )));
        }
        if self.retry.max_delay_ms > MAX_RETRY_DELAY.as_millis() as u64 {
            tracing::warn!(
                "Retry max delay {}ms exceeds {}ms and will be capped",
                self.retry.max_delay_ms,
                MAX_RETRY_DELAY.as_millis()
            );
        }
        if self.cache.enabled && self.cache.max_bytes == 0 {
            return Err(OnairError::InvalidConfig(
                "cache is enabled with a zero byte budget".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_jitter(self.retry.jitter)
    }
}
