//! Engine configuration
//!
//! YAML-backed configuration with load/save helpers. Loading never fails:
//! a missing or unparseable file falls back to defaults with a logged
//! warning, so a broken config can't keep audio from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::{COMMAND_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY};
use crate::types::DEFAULT_SAMPLE_RATE;

/// Engine startup configuration
///
/// `sample_rate` and `block_size` here are defaults only; the host
/// callback is authoritative and `EngineCommand::Init` overrides the rate
/// at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default engine sample rate in Hz
    pub sample_rate: u32,
    /// Nominal render block size in frames (informational, reported in Ready)
    pub block_size: usize,
    /// Master output gain in dB (headroom for summing many buses)
    pub master_gain_db: f32,
    /// Capacity of the control -> audio command ring buffer
    pub command_queue_capacity: usize,
    /// Capacity of the audio -> control notification ring buffer
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: 128,
            master_gain_db: -6.0,
            command_queue_capacity: COMMAND_QUEUE_CAPACITY,
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
        }
    }
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!(
                "load_config: Failed to read config file: {}, using defaults",
                e
            );
            T::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.block_size, 128);
        assert_eq!(config.master_gain_db, -6.0);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/path/engine.yaml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");

        let config = EngineConfig {
            sample_rate: 44100,
            master_gain_db: 0.0,
            ..Default::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "sample_rate: 44100\n").unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.sample_rate, 44100);
        assert_eq!(loaded.block_size, 128);
    }
}
