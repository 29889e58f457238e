//! Radio hardware access.
//!
//! The receiver and transmitter only talk to the radio through the traits in
//! this module. On ESP-IDF targets the [`esp32`] backend drives the real Wi-Fi
//! driver; everywhere else the [`sim`] backend stands in for it so the
//! pipeline can run on a development host.

pub mod types;

#[cfg(target_os = "espidf")]
pub mod esp32;

#[cfg(not(target_os = "espidf"))]
pub mod sim;

use std::sync::Arc;

pub use types::{AccessPointSettings, CsiConfig, CsiRecord, LinkStatus};

#[cfg(target_os = "espidf")]
pub use esp32::EspRadio;

/// Platform-agnostic radio type alias
#[cfg(target_os = "espidf")]
pub type Radio = EspRadio;

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimCall, SimHandle, SimRadio, SyntheticPeer};

/// Platform-agnostic radio type alias
#[cfg(not(target_os = "espidf"))]
pub type Radio = SimRadio;

/// Errors reported by a radio backend.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("radio driver call `{call}` failed: {reason}")]
    Driver { call: &'static str, reason: String },

    #[error("invalid network credentials: {0}")]
    InvalidCredentials(String),
}

impl RadioError {
    /// Wrap a failed driver call.
    pub fn driver(call: &'static str, reason: impl ToString) -> Self {
        RadioError::Driver {
            call,
            reason: reason.to_string(),
        }
    }
}

/// Consumer of CSI measurement events.
///
/// Called from the radio driver's own context, which may preempt the main
/// control loop. Implementations must not block.
pub trait CsiHandler: Send + Sync {
    fn on_csi(&self, record: &CsiRecord<'_>);
}

/// Station (client) side of the association stack.
pub trait Station {
    /// Issue an asynchronous association request.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// Current association status.
    fn status(&self) -> LinkStatus;

    /// Drop the current association, if any.
    fn disconnect(&mut self) -> Result<(), RadioError>;
}

/// Radio power management.
pub trait PowerSave {
    /// Keep the radio awake so every frame is received and measured.
    fn disable_power_save(&mut self) -> Result<(), RadioError>;
}

/// CSI capture feature of the radio.
pub trait CsiDriver {
    /// Enable capture, apply `config` and install `handler` as the sole
    /// callback. Safe to call again after a reconnect.
    fn enable_csi(
        &mut self,
        config: &CsiConfig,
        handler: Arc<dyn CsiHandler>,
    ) -> Result<(), RadioError>;
}

/// Access-point side of the association stack.
pub trait AccessPoint {
    fn start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), RadioError>;
}
