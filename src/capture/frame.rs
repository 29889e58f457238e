//! Admitted frames and their line format.

use std::fmt;

/// An admitted measurement, copied out of the driver's buffer so it can
/// cross the queue to the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub rssi: i32,
    pub payload: Vec<i8>,
}

impl CapturedFrame {
    /// Copy `payload` into an owned frame.
    pub fn new(rssi: i32, payload: &[i8]) -> Self {
        Self {
            rssi,
            payload: payload.to_vec(),
        }
    }

    /// Pair this frame with its sequence number for output.
    pub fn line(&self, seq: u64) -> CsiLine<'_> {
        CsiLine { seq, frame: self }
    }
}

/// One output record:
///
/// ```text
/// [CSI DATA] Packet no. <seq>, RSSI <rssi>, Length <n>, Packet Data: <b0>, <b1>, ..., <bn>
/// ```
pub struct CsiLine<'a> {
    pub seq: u64,
    pub frame: &'a CapturedFrame,
}

impl fmt::Display for CsiLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[CSI DATA] Packet no. {}, RSSI {}, Length {}, Packet Data: ",
            self.seq,
            self.frame.rssi,
            self.frame.payload.len()
        )?;

        let mut samples = self.frame.payload.iter();
        if let Some(first) = samples.next() {
            write!(f, "{first}")?;
        }
        for sample in samples {
            write!(f, ", {sample}")?;
        }
        Ok(())
    }
}
