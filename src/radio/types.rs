//! Types shared by every radio backend.
//!
//! A [`CsiRecord`] is a borrowed view handed to the CSI handler for the
//! duration of one callback. It is never stored past that call.

use crate::radio::RadioError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// One channel measurement as delivered by the radio driver.
#[derive(Debug, Clone, Copy)]
pub struct CsiRecord<'a> {
    /// Hardware address of the frame that produced the measurement
    pub source: [u8; 6],
    /// Received signal strength in the driver's native units
    pub rssi: i32,
    /// Number of samples reported by the driver
    pub len: i32,
    /// Raw measurement samples
    pub buf: &'a [i8],
}

impl<'a> CsiRecord<'a> {
    /// Build a well-formed record whose reported length matches `buf`.
    pub fn new(source: [u8; 6], rssi: i32, buf: &'a [i8]) -> Self {
        Self {
            source,
            rssi,
            len: i32::try_from(buf.len()).unwrap_or(i32::MAX),
            buf,
        }
    }
}

/// Association status as reported by the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl LinkStatus {
    /// Whether the station is associated.
    pub fn is_connected(self) -> bool {
        self == LinkStatus::Connected
    }
}

/// Measurement configuration applied when CSI capture is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsiConfig {
    /// Legacy long training field
    pub lltf: bool,
    /// High-throughput long training field
    pub htltf: bool,
    /// Space-time block code HT-LTF2
    pub stbc_htltf2: bool,
    /// Merge LTF measurements
    pub ltf_merge: bool,
    pub channel_filter: bool,
    /// `false` lets the driver pick the scale
    pub manual_scale: bool,
    pub shift: u8,
}

impl Default for CsiConfig {
    fn default() -> Self {
        Self {
            lltf: true,
            htltf: true,
            stbc_htltf2: true,
            ltf_merge: true,
            channel_filter: false,
            manual_scale: false,
            shift: 0,
        }
    }
}

/// Settings for the transmitter's access point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointSettings {
    pub ssid: String,
    pub password: String,
    pub channel: u8,
    pub hidden: bool,
    pub max_clients: u16,
    pub local_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

impl Default for AccessPointSettings {
    fn default() -> Self {
        Self {
            ssid: "CSI_PROJECT_NETWORK".to_string(),
            password: "passwordhardlikeassembly".to_string(),
            channel: 6,
            hidden: false,
            max_clients: 4,
            local_ip: Ipv4Addr::new(192, 168, 4, 1),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
        }
    }
}

impl AccessPointSettings {
    /// Check the settings against what the access point can host.
    ///
    /// The access point is its own clients' gateway, so `gateway` must equal
    /// `local_ip`.
    pub fn validate(&self) -> Result<(), RadioError> {
        if !(1..=13).contains(&self.channel) {
            return Err(RadioError::driver(
                "esp_wifi_set_config",
                format!("channel {} outside 1-13", self.channel),
            ));
        }
        if self.gateway != self.local_ip {
            return Err(RadioError::driver(
                "esp_netif_set_ip_info",
                format!(
                    "gateway {} differs from access point address {}",
                    self.gateway, self.local_ip
                ),
            ));
        }
        Ok(())
    }

    /// Prefix length of the subnet mask.
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.subnet).count_ones() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_length_follows_buffer() {
        let samples = [1i8, -2, 127];
        let record = CsiRecord::new([0; 6], -45, &samples);
        assert_eq!(record.len, 3);
        assert_eq!(record.buf, &samples);
    }

    #[test]
    fn test_default_csi_config() {
        let config = CsiConfig::default();
        assert!(config.lltf && config.htltf && config.stbc_htltf2 && config.ltf_merge);
        assert!(!config.channel_filter);
        assert!(!config.manual_scale);
        assert_eq!(config.shift, 0);
    }

    #[test]
    fn test_access_point_validation() {
        let settings = AccessPointSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.prefix_len(), 24);

        let bad_channel = AccessPointSettings {
            channel: 0,
            ..AccessPointSettings::default()
        };
        assert!(bad_channel.validate().is_err());

        let foreign_gateway = AccessPointSettings {
            gateway: Ipv4Addr::new(192, 168, 4, 254),
            ..AccessPointSettings::default()
        };
        assert!(foreign_gateway.validate().is_err());
    }
}
