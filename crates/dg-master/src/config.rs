//! Engine configuration, loadable from TOML.
//!
//! Every field has a default, so a config file only names what it changes:
//!
//! ```toml
//! sample_rate = 44100
//!
//! [lookahead]
//! max_ms = 150
//!
//! [retry]
//! max_retries = 8
//! ```

use std::path::Path;
use std::time::Duration;

use dg_engine::{validate_bpm, EngineSettings, SchedulerConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::supervisor::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub max_inserts: usize,
    pub max_instruments: usize,
    pub tick_interval_ms: u64,
    pub initial_bpm: f64,
    pub lookahead: LookaheadConfig,
    /// Silence after which an insert goes to sleep.
    pub idle_timeout_ms: u64,
    pub silence_threshold: f32,
    pub ramp_ms: f64,
    pub retry: RetryConfig,
    pub command_capacity: usize,
    /// Samples per spectrum frame; a power of two.
    pub fft_size: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookaheadConfig {
    pub min_ms: f64,
    pub max_ms: f64,
    pub slow_bpm: f64,
    pub fast_bpm: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            sample_rate: engine.sample_rate,
            block_size: engine.block_size,
            max_inserts: engine.max_inserts,
            max_instruments: engine.max_instruments,
            tick_interval_ms: 10,
            initial_bpm: 120.0,
            lookahead: LookaheadConfig::default(),
            idle_timeout_ms: 2000,
            silence_threshold: engine.silence_threshold,
            ramp_ms: engine.ramp_ms,
            retry: RetryConfig::default(),
            command_capacity: engine.command_capacity,
            fft_size: 1024,
        }
    }
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        let s = SchedulerConfig::default();
        Self {
            min_ms: s.min_lookahead_ms,
            max_ms: s.max_lookahead_ms,
            slow_bpm: s.slow_bpm,
            fast_bpm: s.fast_bpm,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { initial_backoff_ms: 50, max_backoff_ms: 800, max_retries: 5 }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive");
        }
        if self.block_size == 0 {
            return invalid("block_size must be positive");
        }
        if self.max_inserts == 0 || self.max_instruments == 0 {
            return invalid("max_inserts and max_instruments must be positive");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be positive");
        }
        if validate_bpm(self.initial_bpm).is_err() {
            return invalid("initial_bpm must be in (0, 999]");
        }
        let la = &self.lookahead;
        if !(la.min_ms > 0.0 && la.min_ms <= la.max_ms) {
            return invalid("lookahead needs 0 < min_ms <= max_ms");
        }
        if !(la.slow_bpm < la.fast_bpm) {
            return invalid("lookahead needs slow_bpm < fast_bpm");
        }
        // The window must stay ahead of the next control tick.
        if la.min_ms <= self.tick_interval_ms as f64 {
            return invalid("lookahead.min_ms must exceed tick_interval_ms");
        }
        if self.retry.initial_backoff_ms == 0
            || self.retry.max_backoff_ms < self.retry.initial_backoff_ms
        {
            return invalid("retry needs 0 < initial_backoff_ms <= max_backoff_ms");
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 64 {
            return invalid("fft_size must be a power of two of at least 64");
        }
        if self.command_capacity < 16 {
            return invalid("command_capacity must be at least 16");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            max_inserts: self.max_inserts,
            max_instruments: self.max_instruments,
            command_capacity: self.command_capacity,
            silence_threshold: self.silence_threshold,
            ramp_ms: self.ramp_ms,
            ..EngineSettings::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_lookahead_ms: self.lookahead.min_ms,
            max_lookahead_ms: self.lookahead.max_ms,
            slow_bpm: self.lookahead.slow_bpm,
            fast_bpm: self.lookahead.fast_bpm,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            max_retries: self.retry.max_retries,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.initial_backoff_ms, 50);
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            "sample_rate = 44100\n[lookahead]\nmax_ms = 150.0\n[retry]\nmax_retries = 8\n",
        )
        .unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.lookahead.max_ms, 150.0);
        assert_eq!(config.lookahead.min_ms, 60.0);
        assert_eq!(config.retry.max_retries, 8);
        assert_eq!(config.retry.initial_backoff_ms, 50);
        assert_eq!(config.block_size, 256);
    }

    #[test]
    fn rejects_inverted_lookahead() {
        let err = EngineConfig::from_toml_str("[lookahead]\nmin_ms = 200.0\nmax_ms = 100.0\n");
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("sample_rate = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn projections_carry_values() {
        let config = EngineConfig { sample_rate: 96_000, idle_timeout_ms: 500, ..Default::default() };
        assert_eq!(config.engine_settings().sample_rate, 96_000);
        assert_eq!(config.idle_timeout(), Duration::from_millis(500));
        assert_eq!(config.retry_policy().max_retries, 5);
    }
}
