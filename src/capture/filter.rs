//! Admission rule for CSI events.

use crate::radio::CsiRecord;
use macaddr::MacAddr6;

/// Return the payload of `record` if it should be emitted.
///
/// A record is admitted only when it reports a positive length, actually
/// carries that many samples, and comes from `peer` (all six bytes equal).
/// Anything else is rejected without side effects.
pub fn admit<'a>(record: &CsiRecord<'a>, peer: &MacAddr6) -> Option<&'a [i8]> {
    if record.len <= 0 {
        return None;
    }
    if record.source != peer.into_array() {
        return None;
    }
    let len = usize::try_from(record.len).ok()?;
    record.buf.get(..len)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: [u8; 6] = [0x84, 0x1F, 0xE8, 0x67, 0xF6, 0xAD];

    fn peer() -> MacAddr6 {
        MacAddr6::from(PEER)
    }

    #[test]
    fn test_admits_matching_peer() {
        let samples = [1i8, -2, 127];
        let record = CsiRecord::new(PEER, -45, &samples);
        assert_eq!(admit(&record, &peer()), Some(&samples[..]));
    }

    #[test]
    fn test_rejects_foreign_source() {
        let samples = [1i8];
        for byte in 0..6 {
            let mut source = PEER;
            source[byte] ^= 0x01;
            let record = CsiRecord::new(source, -45, &samples);
            assert_eq!(admit(&record, &peer()), None, "byte {byte} flipped");
        }
    }

    #[test]
    fn test_rejects_non_positive_length() {
        let record = CsiRecord::new(PEER, -45, &[]);
        assert_eq!(admit(&record, &peer()), None);

        let samples = [3i8, 4];
        let negative = CsiRecord {
            len: -1,
            ..CsiRecord::new(PEER, -45, &samples)
        };
        assert_eq!(admit(&negative, &peer()), None);
    }

    #[test]
    fn test_rejects_truncated_buffer() {
        let samples = [3i8, 4];
        let record = CsiRecord {
            len: 5,
            ..CsiRecord::new(PEER, -45, &samples)
        };
        assert_eq!(admit(&record, &peer()), None);
    }

    #[test]
    fn test_uses_reported_length() {
        let samples = [3i8, 4, 5, 6];
        let record = CsiRecord {
            len: 2,
            ..CsiRecord::new(PEER, -45, &samples)
        };
        assert_eq!(admit(&record, &peer()), Some(&samples[..2]));
    }
}
