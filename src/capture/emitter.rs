//! Output side of the capture pipeline.
//!
//! The emitter is the only consumer of the capture queue. It owns the packet
//! sequence counter and the output writer, so neither is ever touched from
//! the driver's context.

use crate::capture::frame::CapturedFrame;
use crate::stats::SharedLinkStats;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the emitter waits for a frame before re-checking the run flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Formats queued frames and writes them to the output stream.
pub struct Emitter<W: Write> {
    receiver: Receiver<CapturedFrame>,
    writer: W,
    next_seq: u64,
    stats: SharedLinkStats,
}

impl<W: Write> Emitter<W> {
    /// Create an emitter reading from `receiver`. Numbering starts at 0.
    pub fn new(receiver: Receiver<CapturedFrame>, writer: W, stats: SharedLinkStats) -> Self {
        Self {
            receiver,
            writer,
            next_seq: 0,
            stats,
        }
    }

    /// Sequence number the next record will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }

    /// Write one record. Write failures are logged and counted, never returned.
    pub fn emit(&mut self, frame: &CapturedFrame) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let result = writeln!(self.writer, "{}", frame.line(seq)).and_then(|_| self.writer.flush());
        match result {
            Ok(()) => self.stats.record_emitted(),
            Err(e) => {
                self.stats.record_write_error();
                tracing::warn!(seq, error = %e, "failed to write CSI record");
            }
        }
        seq
    }

    /// Emit everything currently queued. Returns the number of records written.
    pub fn emit_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(frame) = self.receiver.try_recv() {
            self.emit(&frame);
            count += 1;
        }
        count
    }

    /// Emit frames until `running` clears or every producer is gone, then
    /// drain what is left. Returns the number of records emitted.
    pub fn run(&mut self, running: &AtomicBool) -> u64 {
        let start = self.next_seq;

        while running.load(Ordering::SeqCst) {
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => {
                    self.emit(&frame);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("capture queue closed");
                    break;
                }
            }
        }

        self.emit_pending();
        self.next_seq - start
    }

    /// Consume the emitter and return its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Run `emitter` on a dedicated thread until `running` clears.
pub fn spawn_emitter<W>(mut emitter: Emitter<W>, running: Arc<AtomicBool>) -> JoinHandle<u64>
where
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        let emitted = emitter.run(&running);
        tracing::debug!(emitted, "emitter stopped");
        emitted
    })
}
