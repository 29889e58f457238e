//! ESP32 implementation of the radio traits using the ESP-IDF Wi-Fi driver.
//!
//! Station and access-point control go through `esp-idf-svc`; CSI capture is
//! only exposed by the raw driver API, so it is wired up through `sys` with a
//! C trampoline that forwards each `wifi_csi_info_t` to the installed
//! [`CsiHandler`].

use crate::radio::types::{AccessPointSettings, CsiConfig, CsiRecord, LinkStatus};
use crate::radio::{AccessPoint, CsiDriver, CsiHandler, PowerSave, RadioError, Station};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::ipv4;
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{self, esp};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use std::ffi::c_void;
use std::sync::{Arc, Mutex};

/// Slot the driver callback reads the current handler from.
///
/// Boxed once and never freed while the radio lives, so the context pointer
/// handed to the driver stays valid across re-registrations.
type HandlerSlot = Mutex<Option<Arc<dyn CsiHandler>>>;

/// The ESP32 Wi-Fi radio.
pub struct EspRadio {
    wifi: EspWifi<'static>,
    slot: Box<HandlerSlot>,
}

impl EspRadio {
    /// Take the modem peripheral and bring up the Wi-Fi driver.
    pub fn new() -> Result<Self, RadioError> {
        let peripherals =
            Peripherals::take().map_err(|e| RadioError::driver("Peripherals::take", e))?;
        let sysloop = EspSystemEventLoop::take()
            .map_err(|e| RadioError::driver("EspSystemEventLoop::take", e))?;
        let nvs = EspDefaultNvsPartition::take()
            .map_err(|e| RadioError::driver("EspDefaultNvsPartition::take", e))?;

        let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs))
            .map_err(|e| RadioError::driver("esp_wifi_init", e))?;

        Ok(Self {
            wifi,
            slot: Box::new(Mutex::new(None)),
        })
    }

    fn ensure_started(&mut self) -> Result<(), RadioError> {
        let started = self
            .wifi
            .is_started()
            .map_err(|e| RadioError::driver("esp_wifi_get_mode", e))?;
        if !started {
            self.wifi
                .start()
                .map_err(|e| RadioError::driver("esp_wifi_start", e))?;
        }
        Ok(())
    }
}

impl Station for EspRadio {
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials(format!("SSID too long: {ssid}")))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials("password too long".to_string()))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        self.wifi
            .set_configuration(&config)
            .map_err(|e| RadioError::driver("esp_wifi_set_config", e))?;
        self.ensure_started()?;
        self.wifi
            .connect()
            .map_err(|e| RadioError::driver("esp_wifi_connect", e))
    }

    fn status(&self) -> LinkStatus {
        match self.wifi.is_up() {
            Ok(true) => LinkStatus::Connected,
            _ => LinkStatus::Disconnected,
        }
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.wifi
            .disconnect()
            .map_err(|e| RadioError::driver("esp_wifi_disconnect", e))
    }
}

impl PowerSave for EspRadio {
    fn disable_power_save(&mut self) -> Result<(), RadioError> {
        esp!(unsafe { sys::esp_wifi_set_ps(sys::wifi_ps_type_t_WIFI_PS_NONE) })
            .map_err(|e| RadioError::driver("esp_wifi_set_ps", e))
    }
}

impl CsiDriver for EspRadio {
    fn enable_csi(
        &mut self,
        config: &CsiConfig,
        handler: Arc<dyn CsiHandler>,
    ) -> Result<(), RadioError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(handler);

        let raw = sys::wifi_csi_config_t {
            lltf_en: config.lltf,
            htltf_en: config.htltf,
            stbc_htltf2_en: config.stbc_htltf2,
            ltf_merge_en: config.ltf_merge,
            channel_filter_en: config.channel_filter,
            manu_scale: config.manual_scale,
            shift: config.shift,
            ..Default::default()
        };

        let ctx = &*self.slot as *const HandlerSlot as *mut c_void;

        esp!(unsafe { sys::esp_wifi_set_csi(true) })
            .map_err(|e| RadioError::driver("esp_wifi_set_csi", e))?;
        esp!(unsafe { sys::esp_wifi_set_csi_config(&raw) })
            .map_err(|e| RadioError::driver("esp_wifi_set_csi_config", e))?;
        esp!(unsafe { sys::esp_wifi_set_csi_rx_cb(Some(csi_rx_trampoline), ctx) })
            .map_err(|e| RadioError::driver("esp_wifi_set_csi_rx_cb", e))
    }
}

impl AccessPoint for EspRadio {
    fn start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), RadioError> {
        settings.validate()?;

        let netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: ipv4::Subnet {
                    gateway: settings.local_ip,
                    mask: ipv4::Mask(settings.prefix_len()),
                },
                dhcp_enabled: true,
                dns: None,
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        let netif = EspNetif::new_with_conf(&netif_config)
            .map_err(|e| RadioError::driver("esp_netif_new", e))?;
        self.wifi
            .swap_netif_ap(netif)
            .map_err(|e| RadioError::driver("esp_netif_attach", e))?;

        let config = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: settings.ssid.as_str().try_into().map_err(|_| {
                RadioError::InvalidCredentials(format!("SSID too long: {}", settings.ssid))
            })?,
            password: settings
                .password
                .as_str()
                .try_into()
                .map_err(|_| RadioError::InvalidCredentials("password too long".to_string()))?,
            channel: settings.channel,
            ssid_hidden: settings.hidden,
            max_connections: settings.max_clients,
            auth_method: if settings.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        self.wifi
            .set_configuration(&config)
            .map_err(|e| RadioError::driver("esp_wifi_set_config", e))?;
        self.ensure_started()
    }
}

/// Called by the Wi-Fi task for every frame that produced CSI.
unsafe extern "C" fn csi_rx_trampoline(ctx: *mut c_void, info: *mut sys::wifi_csi_info_t) {
    if ctx.is_null() || info.is_null() {
        return;
    }

    let slot = &*(ctx as *const HandlerSlot);
    let handler = match slot.try_lock() {
        Ok(guard) => guard.clone(),
        // Being re-armed right now; this frame is skipped.
        Err(_) => return,
    };
    let Some(handler) = handler else {
        return;
    };

    let info = &*info;
    let buf: &[i8] = if info.buf.is_null() || info.len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(info.buf as *const i8, info.len as usize)
    };

    handler.on_csi(&CsiRecord {
        source: info.mac,
        rssi: info.rx_ctrl.rssi() as i32,
        len: info.len as i32,
        buf,
    });
}
