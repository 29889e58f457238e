//! Beacon transmitter.
//!
//! Hosts the network and broadcasts a fixed datagram at a steady cadence.
//! The content is irrelevant; every frame exists only to make listening
//! radios produce a CSI measurement.

use crate::link::association::sleep_while_running;
use crate::link::DatagramSink;
use crate::radio::{AccessPoint, AccessPointSettings, PowerSave, RadioError};
use crate::stats::SharedLinkStats;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct Transmitter<R, S: DatagramSink> {
    radio: R,
    sink: S,
    settings: AccessPointSettings,
    broadcast: SocketAddr,
    payload: Vec<u8>,
    interval: Duration,
    stats: SharedLinkStats,
}

impl<R, S> Transmitter<R, S>
where
    R: AccessPoint + PowerSave,
    S: DatagramSink,
{
    /// Create a transmitter that beacons `payload` to `broadcast` every `interval`.
    pub fn new(
        radio: R,
        sink: S,
        settings: AccessPointSettings,
        broadcast: SocketAddr,
        payload: impl Into<Vec<u8>>,
        interval: Duration,
        stats: SharedLinkStats,
    ) -> Self {
        Self {
            radio,
            sink,
            settings,
            broadcast,
            payload: payload.into(),
            interval,
            stats,
        }
    }

    /// Start the access point and keep the radio awake.
    pub fn start(&mut self) -> Result<(), RadioError> {
        self.radio.start_access_point(&self.settings)?;
        tracing::info!(
            ssid = %self.settings.ssid,
            channel = self.settings.channel,
            ip = %self.settings.local_ip,
            "access point started"
        );

        if let Err(e) = self.radio.disable_power_save() {
            tracing::warn!(error = %e, "could not disable power saving");
        }
        Ok(())
    }

    /// Send one beacon. Failures are absorbed.
    pub fn beacon(&self) -> bool {
        let delivered = match self.sink.send_to(&self.payload, self.broadcast) {
            Ok(_) => true,
            Err(e) => {
                tracing::trace!(error = %e, "beacon not sent");
                false
            }
        };
        self.stats.record_beacon(delivered);
        delivered
    }

    /// Beacon until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), RadioError> {
        self.start()?;
        tracing::info!(
            broadcast = %self.broadcast,
            interval_ms = self.interval.as_millis() as u64,
            "beaconing"
        );

        while running.load(Ordering::SeqCst) {
            self.beacon();
            sleep_while_running(self.interval, running);
        }
        Ok(())
    }
}
