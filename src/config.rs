use crate::env::{
    DELAY_BUFFER_CAPACITY_ENV, DELAY_BUFFER_DELAY_MS_ENV, DELAY_BUFFER_FLUSH_LEVEL_ENV,
    DELAY_BUFFER_FLUSH_ON_CLOSE_ENV,
};
use crate::error::ConfigError;
use crate::record::Severity;
use std::time::Duration;

/// Configuration of a [`BufferedDelayHandler`](crate::handler::BufferedDelayHandler).
///
/// **Fields**
/// - `capacity`: number of records that fills the buffer and forces a flush.
/// - `delay`: time between the first buffered record and the automatic
///   flush. `None` disables the delay trigger.
/// - `flush_level`: a record at or above this severity flushes immediately.
/// - `flush_on_close`: flush residual records on shutdown instead of
///   discarding them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerConfig {
    pub capacity: usize,
    pub delay: Option<Duration>,
    pub flush_level: Severity,
    pub flush_on_close: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            delay: Some(Duration::from_secs(10)),
            flush_level: Severity::Error,
            flush_on_close: true,
        }
    }
}

impl HandlerConfig {
    /// Defaults with the given capacity and no delay trigger.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            delay: None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Build a configuration from `DELAY_BUFFER_*` environment variables,
    /// falling back to [`HandlerConfig::default`] for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(DELAY_BUFFER_CAPACITY_ENV) {
            config.capacity = raw
                .trim()
                .parse()
                .map_err(|_| invalid(DELAY_BUFFER_CAPACITY_ENV, &raw))?;
        }

        if let Some(raw) = lookup(DELAY_BUFFER_DELAY_MS_ENV) {
            let trimmed = raw.trim();
            config.delay = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                None
            } else {
                let ms: u64 = trimmed
                    .parse()
                    .map_err(|_| invalid(DELAY_BUFFER_DELAY_MS_ENV, &raw))?;
                Some(Duration::from_millis(ms))
            };
        }

        if let Some(raw) = lookup(DELAY_BUFFER_FLUSH_LEVEL_ENV) {
            config.flush_level = raw
                .parse()
                .map_err(|_| invalid(DELAY_BUFFER_FLUSH_LEVEL_ENV, &raw))?;
        }

        if let Some(raw) = lookup(DELAY_BUFFER_FLUSH_ON_CLOSE_ENV) {
            config.flush_on_close = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid(DELAY_BUFFER_FLUSH_ON_CLOSE_ENV, &raw)),
            };
        }

        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    }
}
