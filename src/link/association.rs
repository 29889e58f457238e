//! Station association lifecycle.
//!
//! The manager connects to the transmitter's network, keeps polling the
//! link, and on loss disassociates explicitly before connecting again so no
//! half-open association is left behind. Every time the link comes up, CSI
//! capture is re-armed with the fixed measurement configuration; if the
//! driver refuses, that is fatal.

use crate::config::duration_serde;
use crate::radio::{CsiConfig, CsiDriver, CsiHandler, PowerSave, RadioError, Station};
use crate::stats::SharedLinkStats;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Longest single sleep while waiting, so a shutdown request is noticed quickly.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Association state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    Initial,
    Connecting,
    Connected,
    Reconnecting,
}

/// Outcome of one supervision pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervision {
    /// The link was up when polled
    Healthy,
    /// The link was down and has been re-established
    Recovered,
}

/// How long to wait for the link and how to back off between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Sleep between status polls
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Status polls per connect attempt before it is abandoned
    pub polls_per_attempt: u32,
    /// Pause after the first failed attempt
    #[serde(with = "duration_serde")]
    pub initial_backoff: Duration,
    /// Cap for the doubling pause
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            polls_per_attempt: 40,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Errors that end association supervision.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("CSI capture could not be activated: {0}")]
    CsiActivation(#[source] RadioError),

    #[error("connect request rejected: {0}")]
    Connect(#[source] RadioError),

    #[error("link still down after {attempts} connect attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("shutdown requested while waiting for the link")]
    Cancelled,
}

/// Owns the radio and drives the association state machine.
pub struct AssociationManager<R> {
    radio: R,
    ssid: String,
    password: String,
    csi_config: CsiConfig,
    handler: Arc<dyn CsiHandler>,
    policy: RetryPolicy,
    state: AssociationState,
    stats: SharedLinkStats,
}

impl<R> AssociationManager<R>
where
    R: Station + CsiDriver + PowerSave,
{
    /// Create a manager in the `Initial` state. `handler` is installed on every connect.
    pub fn new(
        radio: R,
        ssid: impl Into<String>,
        password: impl Into<String>,
        handler: Arc<dyn CsiHandler>,
        policy: RetryPolicy,
        stats: SharedLinkStats,
    ) -> Self {
        Self {
            radio,
            ssid: ssid.into(),
            password: password.into(),
            csi_config: CsiConfig::default(),
            handler,
            policy,
            state: AssociationState::Initial,
            stats,
        }
    }

    /// Current association state.
    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// Bring the link up for the first time.
    pub fn establish(&mut self, running: &AtomicBool) -> Result<(), LinkError> {
        if let Err(e) = self.radio.disable_power_save() {
            tracing::warn!(error = %e, "could not disable power saving");
        }

        self.transition(AssociationState::Connecting);
        tracing::info!(ssid = %self.ssid, "connecting");
        self.request_connect()?;
        self.wait_for_link(running)?;
        self.on_link_up()
    }

    /// Poll the link once and recover it if it dropped.
    pub fn supervise(&mut self, running: &AtomicBool) -> Result<Supervision, LinkError> {
        if self.radio.status().is_connected() {
            return Ok(Supervision::Healthy);
        }

        self.transition(AssociationState::Reconnecting);
        tracing::info!(ssid = %self.ssid, "connection lost, reconnecting");
        self.stats.record_reconnect();

        if let Err(e) = self.radio.disconnect() {
            tracing::warn!(error = %e, "disconnect before reconnect failed");
        }
        self.request_connect()?;
        self.wait_for_link(running)?;
        self.on_link_up()?;
        Ok(Supervision::Recovered)
    }

    fn transition(&mut self, next: AssociationState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "association state change");
            self.state = next;
        }
    }

    /// Issue a connect request. Bad credentials are fatal; anything else is
    /// left to the wait loop to retry.
    fn request_connect(&mut self) -> Result<(), LinkError> {
        match self.radio.connect(&self.ssid, &self.password) {
            Ok(()) => Ok(()),
            Err(e @ RadioError::InvalidCredentials(_)) => Err(LinkError::Connect(e)),
            Err(e) => {
                tracing::warn!(error = %e, "connect request failed");
                Ok(())
            }
        }
    }

    /// Wait for the link in bounded attempts with exponential backoff.
    ///
    /// A timed-out attempt leaves the pending association in place; the link
    /// keeps being polled through the backoff and the connect request is
    /// re-issued on top of it.
    fn wait_for_link(&mut self, running: &AtomicBool) -> Result<(), LinkError> {
        let mut attempt: u32 = 1;
        let mut backoff = self.policy.initial_backoff;

        loop {
            for poll in 0..self.policy.polls_per_attempt.max(1) {
                if !running.load(Ordering::SeqCst) {
                    return Err(LinkError::Cancelled);
                }
                if self.radio.status().is_connected() {
                    return Ok(());
                }
                tracing::info!(attempt, poll, "waiting for association");
                sleep_while_running(self.policy.poll_interval, running);
            }

            if let Some(max) = self.policy.max_attempts {
                if attempt >= max {
                    return Err(LinkError::RetriesExhausted { attempts: attempt });
                }
            }

            tracing::warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "association attempt timed out, retrying"
            );
            if self.poll_for(backoff, running)? {
                return Ok(());
            }
            backoff = (backoff * 2).min(self.policy.max_backoff);

            self.request_connect()?;
            attempt += 1;
        }
    }

    /// Keep polling the link for `total`. Returns `true` as soon as it is up.
    fn poll_for(&self, total: Duration, running: &AtomicBool) -> Result<bool, LinkError> {
        let step = self.policy.poll_interval.max(Duration::from_millis(1));
        let mut remaining = total;
        loop {
            if self.radio.status().is_connected() {
                return Ok(true);
            }
            if remaining.is_zero() {
                return Ok(false);
            }
            let nap = remaining.min(step);
            if !sleep_while_running(nap, running) {
                return Err(LinkError::Cancelled);
            }
            remaining -= nap;
        }
    }

    fn on_link_up(&mut self) -> Result<(), LinkError> {
        let previous = self.state;
        self.transition(AssociationState::Connected);
        match previous {
            AssociationState::Reconnecting => tracing::info!("reconnected"),
            _ => tracing::info!("connected"),
        }

        self.radio
            .enable_csi(&self.csi_config, self.handler.clone())
            .map_err(LinkError::CsiActivation)?;
        tracing::debug!(config = ?self.csi_config, "CSI capture armed");
        Ok(())
    }

}

/// Sleep for `total`, waking early if `running` clears.
///
/// Returns whether the flag was still set at the end.
pub(crate) fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(CANCEL_CHECK_INTERVAL);
        thread::sleep(step);
        remaining -= step;
    }
    running.load(Ordering::SeqCst)
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::radio::{CsiRecord, SimCall, SimRadio};
    use crate::stats::create_shared_stats;

    struct NullHandler;

    impl CsiHandler for NullHandler {
        fn on_csi(&self, _record: &CsiRecord<'_>) {}
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            poll_interval: Duration::from_millis(1),
            polls_per_attempt: 10,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts: None,
        }
    }

    fn manager(radio: SimRadio, policy: RetryPolicy) -> AssociationManager<SimRadio> {
        AssociationManager::new(
            radio,
            "CSI_PROJECT_NETWORK",
            "passwordhardlikeassembly",
            Arc::new(NullHandler),
            policy,
            create_shared_stats(),
        )
    }

    fn connect_call() -> SimCall {
        SimCall::Connect {
            ssid: "CSI_PROJECT_NETWORK".to_string(),
        }
    }

    #[test]
    fn test_establish_connects_then_arms_csi() {
        let radio = SimRadio::new(3);
        let handle = radio.handle();
        let mut manager = manager(radio, fast_policy());
        let running = AtomicBool::new(true);

        assert_eq!(manager.state(), AssociationState::Initial);
        manager.establish(&running).unwrap();

        assert_eq!(manager.state(), AssociationState::Connected);
        assert_eq!(
            handle.calls(),
            vec![
                SimCall::DisablePowerSave,
                connect_call(),
                SimCall::EnableCsi(CsiConfig::default()),
            ]
        );
        assert!(handle.is_csi_armed());
    }

    #[test]
    fn test_reconnect_disconnects_once_and_rearms() {
        let radio = SimRadio::new(2);
        let handle = radio.handle();
        let mut manager = manager(radio, fast_policy());
        let running = AtomicBool::new(true);

        manager.establish(&running).unwrap();
        assert_eq!(manager.supervise(&running).unwrap(), Supervision::Healthy);

        handle.clear_calls();
        handle.drop_link();
        assert_eq!(manager.supervise(&running).unwrap(), Supervision::Recovered);
        assert_eq!(
            handle.calls(),
            vec![
                SimCall::Disconnect,
                connect_call(),
                SimCall::EnableCsi(CsiConfig::default()),
            ]
        );
        assert_eq!(manager.state(), AssociationState::Connected);
        assert!(handle.is_csi_armed());
        assert_eq!(manager.supervise(&running).unwrap(), Supervision::Healthy);
    }

    #[test]
    fn test_timed_out_attempt_backs_off_and_retries() {
        let radio = SimRadio::new(0);
        let handle = radio.handle();
        handle.set_refuse_connect(true);
        let policy = RetryPolicy {
            max_attempts: Some(3),
            polls_per_attempt: 2,
            ..fast_policy()
        };
        let mut manager = manager(radio, policy);
        let running = AtomicBool::new(true);

        match manager.establish(&running) {
            Err(LinkError::RetriesExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }

        let calls = handle.calls();
        let connects = calls.iter().filter(|c| **c == connect_call()).count();
        let disconnects = calls.iter().filter(|c| **c == SimCall::Disconnect).count();
        assert_eq!(connects, 3);
        assert_eq!(disconnects, 0);
        assert!(!handle.is_csi_armed());
    }

    #[test]
    fn test_slow_association_survives_attempt_timeouts() {
        let radio = SimRadio::new(0);
        let handle = radio.handle();
        let policy = RetryPolicy {
            polls_per_attempt: 3,
            max_attempts: None,
            ..fast_policy()
        };
        let mut manager = manager(radio, policy);
        let running = AtomicBool::new(true);
        manager.establish(&running).unwrap();

        handle.set_connect_delay(7);
        handle.clear_calls();
        handle.drop_link();
        assert_eq!(manager.supervise(&running).unwrap(), Supervision::Recovered);

        let calls = handle.calls();
        let connects = calls.iter().filter(|c| **c == connect_call()).count();
        let disconnects = calls.iter().filter(|c| **c == SimCall::Disconnect).count();
        assert_eq!(disconnects, 1);
        assert!(connects >= 2);
        assert_eq!(calls.last(), Some(&SimCall::EnableCsi(CsiConfig::default())));
        assert!(handle.is_csi_armed());
        assert_eq!(manager.state(), AssociationState::Connected);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_wait_progress_visible_at_info() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let mut manager = manager(SimRadio::new(2), fast_policy());
        let running = AtomicBool::new(true);
        tracing::subscriber::with_default(subscriber, || manager.establish(&running)).unwrap();

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("waiting for association").count(), 2);
    }

    #[test]
    fn test_csi_activation_failure_is_fatal() {
        let radio = SimRadio::new(0);
        radio.handle().set_fail_csi(true);
        let mut manager = manager(radio, fast_policy());
        let running = AtomicBool::new(true);

        assert!(matches!(
            manager.establish(&running),
            Err(LinkError::CsiActivation(_))
        ));
    }

    #[test]
    fn test_invalid_credentials_are_fatal() {
        let mut manager = AssociationManager::new(
            SimRadio::new(0),
            "",
            "passwordhardlikeassembly",
            Arc::new(NullHandler) as Arc<dyn CsiHandler>,
            fast_policy(),
            create_shared_stats(),
        );
        let running = AtomicBool::new(true);

        assert!(matches!(
            manager.establish(&running),
            Err(LinkError::Connect(RadioError::InvalidCredentials(_)))
        ));
    }

    #[test]
    fn test_shutdown_cancels_wait() {
        let radio = SimRadio::new(0);
        radio.handle().set_refuse_connect(true);
        let mut manager = manager(radio, fast_policy());
        let running = AtomicBool::new(false);

        assert!(matches!(
            manager.establish(&running),
            Err(LinkError::Cancelled)
        ));
    }

    #[test]
    fn test_sleep_while_running_returns_early() {
        let running = AtomicBool::new(false);
        let start = std::time::Instant::now();
        assert!(!sleep_while_running(Duration::from_secs(5), &running));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
