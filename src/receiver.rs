//! The receiver's main control loop.
//!
//! One iteration polls the link, recovers it if it dropped, otherwise sends a
//! keepalive, then sleeps a fixed interval. CSI capture runs alongside in the
//! driver's context and never waits on this loop.

use crate::link::association::sleep_while_running;
use crate::link::{
    AssociationManager, AssociationState, DatagramSink, LinkError, LivenessSignal, Supervision,
};
use crate::radio::{CsiDriver, LinkStatus, PowerSave, Station};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// What one control-loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Link was up and a keepalive was attempted
    Pulsed { delivered: bool },
    /// Link was down and has been re-established; no keepalive this round
    Recovered,
}

pub struct CsiReceiver<R, S: DatagramSink> {
    association: AssociationManager<R>,
    liveness: LivenessSignal<S>,
    loop_interval: Duration,
}

impl<R, S> CsiReceiver<R, S>
where
    R: Station + CsiDriver + PowerSave,
    S: DatagramSink,
{
    /// Create the control loop. `loop_interval` is slept after every iteration.
    pub fn new(
        association: AssociationManager<R>,
        liveness: LivenessSignal<S>,
        loop_interval: Duration,
    ) -> Self {
        Self {
            association,
            liveness,
            loop_interval,
        }
    }

    /// Connect for the first time and arm CSI capture.
    pub fn start(&mut self, running: &AtomicBool) -> Result<(), LinkError> {
        self.association.establish(running)
    }

    /// One control-loop iteration, without the trailing sleep.
    pub fn tick(&mut self, running: &AtomicBool) -> Result<Tick, LinkError> {
        match self.association.supervise(running)? {
            Supervision::Healthy => Ok(Tick::Pulsed {
                delivered: self.liveness.pulse(LinkStatus::Connected),
            }),
            Supervision::Recovered => Ok(Tick::Recovered),
        }
    }

    /// Run until `running` clears.
    ///
    /// A shutdown request is a clean exit; any other link error (failed CSI
    /// activation, exhausted retries, rejected credentials) is returned.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), LinkError> {
        let result = self.run_inner(running);
        match result {
            Err(LinkError::Cancelled) => Ok(()),
            other => other,
        }
    }

    fn run_inner(&mut self, running: &AtomicBool) -> Result<(), LinkError> {
        if self.association.state() == AssociationState::Initial {
            self.start(running)?;
        }

        tracing::info!(target_addr = %self.liveness.target(), "receiver running");
        while running.load(Ordering::SeqCst) {
            self.tick(running)?;
            sleep_while_running(self.loop_interval, running);
        }
        Ok(())
    }
}
