//! Server configuration.
//!
//! [`ServerConfig`] is deserialized from JSON or YAML by a [`ConfigLoader`].
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```yaml
//! network: tcp
//! address: 0.0.0.0:12345
//! service_name: lobby
//! workers: 4
//! load_balance: hash
//! attach:
//!   region: eu-west
//! ```

mod loader;

pub use loader::{ConfigCallback, ConfigLoader, ConfigWatch, FileLoader, ValueLoader};

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::channel::DEFAULT_READ_BUFFER_SIZE;
use crate::error::{Result, SmartError};
use crate::protocol::{DEFAULT_MAX_FRAME_SIZE, META_SIZE};
use crate::transport::Network;
use crate::worker::LoadBalance;
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PENDING_FRAMES};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:12345";
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_DRAIN_DEADLINE_MS: u64 = 600_000;

/// Listener, worker pool and per-connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: Network,
    pub address: String,
    pub service_name: String,
    /// Worker threads; `0` means one per available CPU.
    pub workers: usize,
    #[serde(alias = "load-balance", deserialize_with = "deserialize_load_balance")]
    pub load_balance: LoadBalance,
    /// Exclusive upper bound on a frame's length field.
    pub max_frame_size: usize,
    pub drain_interval_ms: u64,
    pub drain_deadline_ms: u64,
    pub read_buffer_size: usize,
    pub writer: WriterSettings,
    /// Free-form application settings.
    pub attach: serde_json::Map<String, serde_json::Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            address: DEFAULT_ADDRESS.to_string(),
            service_name: String::new(),
            workers: 0,
            load_balance: LoadBalance::RoundRobin,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            drain_deadline_ms: DEFAULT_DRAIN_DEADLINE_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer: WriterSettings::default(),
            attach: serde_json::Map::new(),
        }
    }
}

impl ServerConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(SmartError::Config("address is empty".into()));
        }
        if self.max_frame_size <= META_SIZE {
            return Err(SmartError::Config(format!(
                "max_frame_size must be greater than {}",
                META_SIZE
            )));
        }
        if self.drain_interval_ms == 0 {
            return Err(SmartError::Config("drain_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.drain_deadline_ms)
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.writer.max_pending_frames,
            channel_capacity: self.writer.channel_capacity,
        }
    }

    /// Typed view of one `attach` entry.
    pub fn attachment<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.attach.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }
}

/// Outbound queue limits per connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub max_pending_frames: usize,
    pub channel_capacity: usize,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn deserialize_load_balance<'de, D>(deserializer: D) -> std::result::Result<LoadBalance, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(LoadBalance::parse_or_default(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.drain_interval(), Duration::from_secs(1));
        assert_eq!(config.drain_deadline(), Duration::from_secs(600));
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_with_dashed_load_balance() {
        let yaml = r#"
network: unix
address: /tmp/smart.sock
workers: 4
load-balance: hash
writer:
  max_pending_frames: 16
attach:
  region: eu-west
  shards: 3
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.network, Network::Unix);
        assert_eq!(config.workers, 4);
        assert_eq!(config.load_balance, LoadBalance::Hash);
        assert_eq!(config.writer.max_pending_frames, 16);
        assert_eq!(config.writer.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.writer_config().max_pending_frames, 16);
        assert_eq!(
            config.attachment::<String>("region").unwrap().as_deref(),
            Some("eu-west")
        );
        assert_eq!(config.attachment::<u32>("shards").unwrap(), Some(3));
        assert_eq!(config.attachment::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn test_unknown_load_balance_falls_back() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"load_balance": "least-busy"}"#).unwrap();
        assert_eq!(config.load_balance, LoadBalance::RoundRobin);
    }

    #[test]
    fn test_validate_rejects_tiny_frames() {
        let config = ServerConfig {
            max_frame_size: 4,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(SmartError::Config(_))));
    }
}
