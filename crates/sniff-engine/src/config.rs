//! Engine configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sniff_protocol::{HopSequence, TemporaryKey};

use crate::buffer::DEFAULT_CAPACITY;
use crate::error::SnifferError;

/// Default serial baud rate of the sniffer firmware
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// Engine settings
///
/// Commands update the live copy held by the sniffer; the worker reads it at
/// setup. Missing fields in a loaded file take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Serial port path
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Advertising channel hop order
    pub hop_sequence: HopSequence,
    /// Decryption key forwarded to the device at setup
    pub temporary_key: Option<TemporaryKey>,
    /// Packets kept before the oldest are evicted
    pub buffer_capacity: usize,
    /// Upper bound on one transport read
    pub read_timeout_ms: u64,
    /// Silence after which a live connection is considered lost
    pub link_timeout_ms: u64,
    /// Time allowed for draining buffered data on exit
    pub drain_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            hop_sequence: HopSequence::default(),
            temporary_key: None,
            buffer_capacity: DEFAULT_CAPACITY,
            read_timeout_ms: 100,
            link_timeout_ms: 5_000,
            drain_timeout_ms: 200,
        }
    }
}

impl EngineConfig {
    /// Config for a given port, everything else default
    pub fn with_port(port: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            ..Self::default()
        }
    }

    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnifferError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnifferError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("sniff-engine-{}-{}", name, std::process::id()))
            .join("config.json")
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.baud_rate, 460_800);
        assert_eq!(config.hop_sequence.numbers(), vec![37, 38, 39]);
        assert_eq!(config.buffer_capacity, 80_000);
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
        assert!(config.port.is_none());
        assert!(config.temporary_key.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"port": "/dev/ttyACM0", "hop_sequence": [39, 37]}"#).unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.hop_sequence.numbers(), vec![39, 37]);
        assert_eq!(config.link_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_hop_sequence_rejected() {
        let result: Result<EngineConfig, _> = serde_json::from_str(r#"{"hop_sequence": [37, 37]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save");
        let mut config = EngineConfig::with_port("COM7");
        config.temporary_key = Some(TemporaryKey::from_passkey(123_456).unwrap());
        config.drain_timeout_ms = 50;

        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(temp_path("missing"));
        assert!(matches!(result, Err(SnifferError::Io(_))));
    }
}
