//! Configuration for the CSI link.
//!
//! Defaults reproduce the fixed constants both nodes ship with, so a device
//! without a config file joins the standard network and filters for the
//! standard transmitter.

use crate::capture::DEFAULT_QUEUE_CAPACITY;
use crate::link::RetryPolicy;
use crate::radio::AccessPointSettings;
use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for both roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network both nodes share
    pub network: NetworkConfig,

    /// Receiver settings
    pub receiver: ReceiverConfig,

    /// Transmitter settings
    pub transmitter: TransmitterConfig,

    /// Path for storing link statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("csi-link");

        Self {
            network: NetworkConfig::default(),
            receiver: ReceiverConfig::default(),
            transmitter: TransmitterConfig::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("csi-link")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::WriteFailed(self.data_path.clone(), e))
    }

    /// Access point settings for the transmitter.
    pub fn access_point(&self) -> AccessPointSettings {
        let tx = &self.transmitter;
        AccessPointSettings {
            ssid: self.network.ssid.clone(),
            password: self.network.password.clone(),
            channel: tx.channel,
            hidden: tx.hidden,
            max_clients: tx.max_clients,
            local_ip: tx.local_ip,
            gateway: tx.gateway,
            subnet: tx.subnet,
        }
    }
}

/// Network identity and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: "CSI_PROJECT_NETWORK".to_string(),
            password: "passwordhardlikeassembly".to_string(),
        }
    }
}

/// Receiver role settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Hardware address of the only transmitter whose CSI is emitted
    #[serde(with = "mac_serde")]
    pub peer: MacAddr6,

    /// Where keepalive datagrams are sent
    pub target: SocketAddr,

    /// Depth of the queue between the CSI callback and the emitter
    pub queue_capacity: usize,

    /// Sleep at the end of every control-loop iteration
    #[serde(with = "duration_serde")]
    pub loop_interval: Duration,

    /// Connect/reconnect wait policy
    pub retry: RetryPolicy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            peer: MacAddr6::new(0x84, 0x1F, 0xE8, 0x67, 0xF6, 0xAD),
            target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 1), 8080)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            loop_interval: Duration::from_millis(15),
            retry: RetryPolicy::default(),
        }
    }
}

/// Transmitter role settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterConfig {
    /// Destination of the beacon stream
    pub broadcast: SocketAddr,

    /// Time between beacons (15 ms is roughly 66 frames per second)
    #[serde(with = "duration_serde")]
    pub beacon_interval: Duration,

    /// Beacon content; only its arrival matters to the receiver
    pub payload: String,

    pub channel: u8,
    pub hidden: bool,
    pub max_clients: u16,
    pub local_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        let ap = AccessPointSettings::default();
        Self {
            broadcast: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 255), 8080)),
            beacon_interval: Duration::from_millis(15),
            payload: "ADA_IS_SILLY".to_string(),
            channel: ap.channel,
            hidden: ap.hidden,
            max_clients: ap.max_clients,
            local_ip: ap.local_ip,
            gateway: ap.gateway,
            subnet: ap.subnet,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
}

/// Serde support for Duration, in milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for hardware addresses in `AA:BB:CC:DD:EE:FF` form.
mod mac_serde {
    use macaddr::MacAddr6;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(mac: &MacAddr6, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(mac)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<MacAddr6, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse()
            .map_err(|e| D::Error::custom(format!("invalid hardware address {text:?}: {e}")))
    }
}
