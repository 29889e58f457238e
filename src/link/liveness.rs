//! Keepalive traffic toward the transmitter.
//!
//! Each datagram keeps the association's data path warm and makes the
//! transmitter answer at the link layer, which gives the receiver's radio
//! more frames to measure.

use crate::link::transport::DatagramSink;
use crate::radio::LinkStatus;
use crate::stats::SharedLinkStats;
use std::net::SocketAddr;

/// Keepalive content: the ASCII digit zero.
pub const KEEPALIVE_PAYLOAD: &[u8] = b"0";

/// Fire-and-forget keepalive sender.
pub struct LivenessSignal<S: DatagramSink> {
    sink: S,
    target: SocketAddr,
    stats: SharedLinkStats,
}

impl<S: DatagramSink> LivenessSignal<S> {
    /// Create a keepalive sender toward `target`.
    pub fn new(sink: S, target: SocketAddr, stats: SharedLinkStats) -> Self {
        Self {
            sink,
            target,
            stats,
        }
    }

    /// Where keepalives are sent.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one keepalive if the link is up.
    ///
    /// Returns whether a datagram was handed to the transport. Send errors
    /// are absorbed; there is no retry.
    pub fn pulse(&self, status: LinkStatus) -> bool {
        if !status.is_connected() {
            return false;
        }

        match self.sink.send_to(KEEPALIVE_PAYLOAD, self.target) {
            Ok(_) => {
                self.stats.record_keepalive(true);
                true
            }
            Err(e) => {
                self.stats.record_keepalive(false);
                tracing::trace!(dest = %self.target, error = %e, "keepalive not sent");
                false
            }
        }
    }
}
