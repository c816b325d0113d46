//! Runtime configuration
//!
//! Settings are read from an optional JSON file; every field has a default so
//! a partial file (or no file at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
use crate::error::{Result, SomnusError};

/// Default length of the looped noise buffer in seconds
pub const DEFAULT_NOISE_DURATION_SECS: f32 = 2.0;

/// Default master volume in percent
pub const DEFAULT_VOLUME_PERCENT: u8 = 50;

/// Lowest accepted audio context sample rate
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest accepted audio context sample rate
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Longest accepted looped noise buffer
pub const MAX_NOISE_DURATION_SECS: f32 = 60.0;

/// Default timer tick period (1 Hz)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default location of the key-value store file
pub const DEFAULT_STORE_PATH: &str = "somnus_store.json";

/// Top-level configuration for the CLI and engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SomnusConfig {
    /// Audio context sample rate in Hz.
    pub sample_rate: u32,
    /// Length of the looped noise buffer in seconds.
    pub noise_duration_secs: f32,
    /// Master volume applied when the audio context is first created.
    pub initial_volume: u8,
    /// Period of the session timer's display refresh.
    pub tick_interval_ms: u64,
    /// Path of the JSON key-value store holding the sleep history.
    pub store_path: PathBuf,
    /// Fixed seed for the noise generator. `None` seeds from OS entropy.
    pub noise_seed: Option<u64>,
}

impl Default for SomnusConfig {
    fn default() -> Self {
        Self {
            sample_rate: INTERNAL_SAMPLE_RATE,
            noise_duration_secs: DEFAULT_NOISE_DURATION_SECS,
            initial_volume: DEFAULT_VOLUME_PERCENT,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            noise_seed: None,
        }
    }
}

impl SomnusConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SomnusError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: SomnusConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values the engines cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(SomnusError::InvalidConfig {
                reason: format!(
                    "sample_rate must be within {}-{} Hz, got {}",
                    MIN_SAMPLE_RATE, MAX_SAMPLE_RATE, self.sample_rate
                ),
            });
        }
        if !(self.noise_duration_secs.is_finite()
            && self.noise_duration_secs > 0.0
            && self.noise_duration_secs <= MAX_NOISE_DURATION_SECS)
        {
            return Err(SomnusError::InvalidConfig {
                reason: format!(
                    "noise_duration_secs must be within (0, {}], got {}",
                    MAX_NOISE_DURATION_SECS, self.noise_duration_secs
                ),
            });
        }
        if self.initial_volume > 100 {
            return Err(SomnusError::InvalidConfig {
                reason: format!(
                    "initial_volume must be within 0-100, got {}",
                    self.initial_volume
                ),
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(SomnusError::InvalidConfig {
                reason: "tick_interval_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn test_default_is_valid() {
        let config = SomnusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.initial_volume, 50);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sample_rate": 22050, "noise_seed": 7 }}"#).unwrap();

        let config = SomnusConfig::load(file.path()).unwrap();
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.noise_seed, Some(7));
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let config = SomnusConfig {
            initial_volume: 101,
            ..SomnusConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test_case(0 ; "zero")]
    #[test_case(16 ; "below cutoff floor")]
    #[test_case(7999 ; "just under minimum")]
    #[test_case(384_000 ; "above maximum")]
    fn test_sample_rate_out_of_range_rejected(sample_rate: u32) {
        let config = SomnusConfig {
            sample_rate,
            ..SomnusConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_sample_rate_bounds_accepted() {
        for sample_rate in [MIN_SAMPLE_RATE, MAX_SAMPLE_RATE] {
            let config = SomnusConfig {
                sample_rate,
                ..SomnusConfig::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-1.0 ; "negative")]
    #[test_case(f32::NAN ; "nan")]
    #[test_case(60.5 ; "just over maximum")]
    #[test_case(1.0e9 ; "huge")]
    fn test_noise_duration_out_of_range_rejected(noise_duration_secs: f32) {
        let config = SomnusConfig {
            noise_duration_secs,
            ..SomnusConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_low_sample_rate_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "sample_rate": 16 }}"#).unwrap();

        let err = SomnusConfig::load(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = SomnusConfig::load(Path::new("/nonexistent/somnus.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_READ_ERROR");
    }
}
