//! Simulated radio for targets without a CSI-capable Wi-Fi driver.
//!
//! This exists so the receiver and transmitter can run on a development host.
//! The simulated station associates after a configurable number of status
//! polls, and CSI events are injected through a [`SimHandle`], either by tests
//! or by a [`SyntheticPeer`] thread that imitates the transmitter's cadence.
//!
//! Dropping the association also disarms CSI capture, so the receiver has to
//! re-apply the configuration after every reconnect.

use crate::radio::types::{AccessPointSettings, CsiConfig, CsiRecord, LinkStatus};
use crate::radio::{AccessPoint, CsiDriver, CsiHandler, PowerSave, RadioError, Station};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A driver call observed by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Connect { ssid: String },
    Disconnect,
    EnableCsi(CsiConfig),
    DisablePowerSave,
    StartAccessPoint { ssid: String, channel: u8 },
}

#[derive(Default)]
struct SimState {
    connected: AtomicBool,
    connect_pending: AtomicBool,
    polls_remaining: AtomicU32,
    connect_delay_polls: AtomicU32,
    refuse_connect: AtomicBool,
    csi_armed: AtomicBool,
    fail_csi: AtomicBool,
    handler: Mutex<Option<Arc<dyn CsiHandler>>>,
    calls: Mutex<Vec<SimCall>>,
}

impl SimState {
    fn record(&self, call: SimCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated station/access-point radio.
pub struct SimRadio {
    state: Arc<SimState>,
}

impl SimRadio {
    /// Create a simulated radio whose connect requests succeed after
    /// `connect_delay_polls` status polls.
    pub fn new(connect_delay_polls: u32) -> Self {
        let state = SimState::default();
        state
            .connect_delay_polls
            .store(connect_delay_polls, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    /// Get a handle for injecting events and inspecting driver calls.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Station for SimRadio {
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(RadioError::InvalidCredentials(format!(
                "SSID must be 1-32 bytes, got {}",
                ssid.len()
            )));
        }
        if !password.is_empty() && !(8..=64).contains(&password.len()) {
            return Err(RadioError::InvalidCredentials(
                "password must be empty or 8-64 bytes".to_string(),
            ));
        }

        self.state.record(SimCall::Connect {
            ssid: ssid.to_string(),
        });

        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Ok(());
        }
        // A repeated request joins the association already in progress.
        if !self.state.connect_pending.swap(true, Ordering::SeqCst) {
            let delay = self.state.connect_delay_polls.load(Ordering::SeqCst);
            self.state.polls_remaining.store(delay, Ordering::SeqCst);
        }
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        if self.state.connected.load(Ordering::SeqCst) {
            return LinkStatus::Connected;
        }

        if self.state.connect_pending.load(Ordering::SeqCst) {
            let remaining = self.state.polls_remaining.load(Ordering::SeqCst);
            if remaining == 0 {
                self.state.connect_pending.store(false, Ordering::SeqCst);
                self.state.connected.store(true, Ordering::SeqCst);
                return LinkStatus::Connected;
            }
            self.state
                .polls_remaining
                .store(remaining - 1, Ordering::SeqCst);
        }

        LinkStatus::Disconnected
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.state.record(SimCall::Disconnect);
        self.state.connect_pending.store(false, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.csi_armed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl PowerSave for SimRadio {
    fn disable_power_save(&mut self) -> Result<(), RadioError> {
        self.state.record(SimCall::DisablePowerSave);
        Ok(())
    }
}

impl CsiDriver for SimRadio {
    fn enable_csi(
        &mut self,
        config: &CsiConfig,
        handler: Arc<dyn CsiHandler>,
    ) -> Result<(), RadioError> {
        self.state.record(SimCall::EnableCsi(*config));

        if self.state.fail_csi.load(Ordering::SeqCst) {
            return Err(RadioError::driver("esp_wifi_set_csi", "ESP_ERR_WIFI_NOT_INIT"));
        }

        *lock(&self.state.handler) = Some(handler);
        self.state.csi_armed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl AccessPoint for SimRadio {
    fn start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), RadioError> {
        settings.validate()?;
        self.state.record(SimCall::StartAccessPoint {
            ssid: settings.ssid.clone(),
            channel: settings.channel,
        });
        Ok(())
    }
}

/// Handle for driving a [`SimRadio`] from outside the control loop.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<SimState>,
}

impl SimHandle {
    /// Deliver a CSI event to the installed handler, as the driver would.
    ///
    /// Returns `false` when capture is not armed and the event was discarded.
    pub fn deliver(&self, record: &CsiRecord<'_>) -> bool {
        if !self.state.csi_armed.load(Ordering::SeqCst) {
            return false;
        }
        let handler = lock(&self.state.handler).clone();
        match handler {
            Some(handler) => {
                handler.on_csi(record);
                true
            }
            None => false,
        }
    }

    /// Simulate the access point going away.
    pub fn drop_link(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.connect_pending.store(false, Ordering::SeqCst);
        self.state.csi_armed.store(false, Ordering::SeqCst);
    }

    /// Whether CSI capture is currently armed.
    pub fn is_csi_armed(&self) -> bool {
        self.state.csi_armed.load(Ordering::SeqCst)
    }

    /// Number of status polls before a connect request completes.
    pub fn set_connect_delay(&self, polls: u32) {
        self.state.connect_delay_polls.store(polls, Ordering::SeqCst);
    }

    /// Make connect requests never complete.
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.state.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Make the next CSI activation fail.
    pub fn set_fail_csi(&self, fail: bool) {
        self.state.fail_csi.store(fail, Ordering::SeqCst);
    }

    /// All driver calls observed so far, in order.
    pub fn calls(&self) -> Vec<SimCall> {
        lock(&self.state.calls).clone()
    }

    /// Forget the recorded driver calls.
    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }
}

/// Number of samples in a synthetic frame (64 subcarriers, I/Q interleaved).
const SYNTHETIC_SAMPLES: usize = 128;

/// Every Nth synthetic frame comes from a neighbouring emitter.
const FOREIGN_FRAME_PERIOD: u64 = 10;

const FOREIGN_SOURCE: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

/// Background thread that imitates the transmitter by feeding CSI events
/// into a [`SimHandle`] at a fixed cadence.
pub struct SyntheticPeer {
    handle: SimHandle,
    source: [u8; 6],
    interval: Duration,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SyntheticPeer {
    /// Create a generator that sends frames from `source` every `interval`.
    pub fn new(handle: SimHandle, source: [u8; 6], interval: Duration) -> Self {
        Self {
            handle,
            source,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Start generating frames in a background thread.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let handle = self.handle.clone();
        let source = self.source;
        let interval = self.interval;
        let running = self.running.clone();
        let frames = self.frames.clone();

        self.thread_handle = Some(thread::spawn(move || {
            let mut buf = [0i8; SYNTHETIC_SAMPLES];
            let mut n: u64 = 0;
            while running.load(Ordering::SeqCst) {
                fill_samples(&mut buf, n);
                let from = if n % FOREIGN_FRAME_PERIOD == FOREIGN_FRAME_PERIOD - 1 {
                    FOREIGN_SOURCE
                } else {
                    source
                };
                let rssi = -40 - (n % 20) as i32;
                if handle.deliver(&CsiRecord::new(from, rssi, &buf)) {
                    frames.fetch_add(1, Ordering::Relaxed);
                }
                n = n.wrapping_add(1);
                thread::sleep(interval);
            }
        }));
    }

    /// Stop generating frames.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Frames delivered to an armed handler so far.
    pub fn frames_delivered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Drop for SyntheticPeer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deterministic triangle-wave samples that drift from frame to frame.
fn fill_samples(buf: &mut [i8], frame: u64) {
    for (i, sample) in buf.iter_mut().enumerate() {
        let phase = (frame as usize).wrapping_mul(7).wrapping_add(i * 3) % 64;
        let tri = if phase < 32 { phase } else { 63 - phase };
        *sample = tri as i8 - 16;
    }
}
