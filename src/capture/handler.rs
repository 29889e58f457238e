//! The CSI handler installed into the radio driver.

use crate::capture::filter::admit;
use crate::capture::frame::CapturedFrame;
use crate::radio::{CsiHandler, CsiRecord};
use crate::stats::SharedLinkStats;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use macaddr::MacAddr6;

/// Default queue depth between the driver callback and the emitter.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Capture context handed to the driver at registration time.
///
/// Runs in the driver's context: it filters, copies admitted samples and
/// hands them to the emitter without ever blocking. When the queue is full
/// the frame is dropped and counted.
pub struct CaptureCore {
    peer: MacAddr6,
    sender: Sender<CapturedFrame>,
    stats: SharedLinkStats,
}

impl CaptureCore {
    /// Create a capture core for `peer` and the receiving end of its queue.
    pub fn new(
        peer: MacAddr6,
        queue_capacity: usize,
        stats: SharedLinkStats,
    ) -> (Self, Receiver<CapturedFrame>) {
        // Use a bounded channel to prevent unbounded memory growth
        let (sender, receiver) = bounded(queue_capacity.max(1));
        (
            Self {
                peer,
                sender,
                stats,
            },
            receiver,
        )
    }
}

impl CsiHandler for CaptureCore {
    fn on_csi(&self, record: &CsiRecord<'_>) {
        let Some(payload) = admit(record, &self.peer) else {
            return;
        };

        self.stats.record_admitted();
        match self.sender.try_send(CapturedFrame::new(record.rssi, payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.record_dropped();
            }
        }
    }
}
