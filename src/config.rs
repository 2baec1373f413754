//! Compressor configuration.
//!
//! A [`CompressorConfig`] is passed explicitly into every
//! [`Compressor`](crate::Compressor); nothing is held in process-wide state.
//! Configurations serialize to JSON (for operators) and bincode (for
//! shipping to workers).
//!
//! # Example
//!
//! ```
//! use routing_compressor::CompressorConfig;
//!
//! let config = CompressorConfig::new(1023).with_time_budget_ms(500);
//! let json = config.to_json().unwrap();
//! let restored = CompressorConfig::from_json(&json).unwrap();
//! assert_eq!(config, restored);
//! ```

use crate::error::{CompressorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Router entry slots on a standard chip.
pub const DEFAULT_TARGET_LENGTH: usize = 1023;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressorConfig {
    /// Version of the serialization format
    pub version: String,

    /// Router entry capacity the table must be compressed to
    pub target_length: usize,

    /// Time budget for one compression attempt
    #[serde(default)]
    pub time_budget_ms: Option<u64>,

    /// Byte limit for the compressor's memory pool
    #[serde(default)]
    pub memory_limit: Option<usize>,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_LENGTH)
    }
}

impl CompressorConfig {
    pub fn new(target_length: usize) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            target_length,
            time_budget_ms: None,
            memory_limit: None,
        }
    }

    pub fn with_time_budget_ms(mut self, ms: u64) -> Self {
        self.time_budget_ms = Some(ms);
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.time_budget_ms == Some(0) {
            return Err(CompressorError::InvalidInput(
                "time budget must be positive".into(),
            ));
        }
        if self.memory_limit == Some(0) {
            return Err(CompressorError::InvalidInput(
                "memory limit must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize to binary (bincode).
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary (bincode).
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        let config: Self = bincode::deserialize(data)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompressorConfig::default();
        assert_eq!(config.target_length, DEFAULT_TARGET_LENGTH);
        assert_eq!(config.time_budget(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = CompressorConfig::new(256)
            .with_time_budget_ms(20)
            .with_memory_limit(1 << 16);

        let json = config.to_json().unwrap();
        assert_eq!(CompressorConfig::from_json(&json).unwrap(), config);

        let binary = config.to_binary().unwrap();
        assert_eq!(CompressorConfig::from_binary(&binary).unwrap(), config);
    }

    #[test]
    fn test_missing_optionals_default() {
        let json = r#"{ "version": "1.0.0", "target_length": 16 }"#;
        let config = CompressorConfig::from_json(json).unwrap();
        assert_eq!(config.target_length, 16);
        assert_eq!(config.memory_limit, None);
    }

    #[test]
    fn test_invalid_rejected() {
        let json = r#"{ "version": "1.0.0", "target_length": 16, "time_budget_ms": 0 }"#;
        assert!(matches!(
            CompressorConfig::from_json(json),
            Err(CompressorError::InvalidInput(_))
        ));
    }
}
