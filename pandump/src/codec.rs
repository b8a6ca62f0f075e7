//! Wire records exchanged with the panda device.
//!
//! Every datagram from the device is a whole number of 16-byte records:
//!
//! ```text
//!  0       4       8               16
//!  +-------+-------+---------------+
//!  |  h0   |  h1   |  payload[8]   |
//!  +-------+-------+---------------+
//! ```
//!
//! `h0` and `h1` are little-endian. The identifier is the top 11 bits of `h0`,
//! the data length is the low nibble of `h1` and the bus is the rest of `h1`.

use crate::Frame;
use chrono::{DateTime, Local};
use thiserror::Error;

pub const RECORD_LEN: usize = 16;
pub const MAX_RECORDS: usize = 512;
pub const MAX_DATAGRAM_LEN: usize = RECORD_LEN * MAX_RECORDS;
pub const MAX_DATA_LEN: usize = 8;

/// Bus and id of the session challenge sent by the device
pub const ACK_BUS: u32 = 15;
pub const ACK_ID: u16 = 6;

const ID_SHIFT: u32 = 21;
const LEN_MASK: u32 = 0x0F;
const BUS_SHIFT: u32 = 4;
const DATA_OFFSET: usize = 8;

/// Outcome of decoding a single wire record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Frame(Frame),
    /// empty slot (id 0), carries nothing
    Padding,
    /// session challenge; the subscription must be resent
    Ack,
    /// declared data length outside 1..=8
    BadLength { bus: u32, id: u16, len: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error(
        "datagram of {0} bytes exceeds {max} bytes ({records} records)",
        max = MAX_DATAGRAM_LEN,
        records = MAX_RECORDS
    )]
    Oversized(usize),

    #[error(
        "datagram of {0} bytes is not a multiple of {len} bytes",
        len = RECORD_LEN
    )]
    Misaligned(usize),
}

pub fn decode_record(
    record: &[u8; RECORD_LEN],
    time: DateTime<Local>,
) -> Record {
    let h0 = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    let h1 = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);

    let id = (h0 >> ID_SHIFT) as u16;
    let len = (h1 & LEN_MASK) as usize;
    // not masked to 4 bits; the device may use the upper bits
    let bus = h1 >> BUS_SHIFT;

    if id == 0 {
        return Record::Padding;
    }
    if bus == ACK_BUS && id == ACK_ID {
        return Record::Ack;
    }
    if len == 0 || len > MAX_DATA_LEN {
        return Record::BadLength { bus, id, len };
    }

    Record::Frame(Frame::new(
        time,
        bus,
        id,
        &record[DATA_OFFSET..DATA_OFFSET + len],
    ))
}

/// Decode every record of a datagram, in wire order. A datagram of the wrong
/// size is rejected as a whole.
pub fn decode_datagram(
    buf: &[u8],
    time: DateTime<Local>,
) -> Result<Vec<Record>, CodecError> {
    if buf.len() > MAX_DATAGRAM_LEN {
        return Err(CodecError::Oversized(buf.len()));
    }
    if buf.len() % RECORD_LEN != 0 {
        return Err(CodecError::Misaligned(buf.len()));
    }

    Ok(buf
        .chunks_exact(RECORD_LEN)
        .map(|chunk| {
            let mut record = [0u8; RECORD_LEN];
            record.copy_from_slice(chunk);
            decode_record(&record, time)
        })
        .collect())
}

/// Build a wire record. Payloads longer than 8 bytes are truncated.
pub fn encode_record(bus: u32, id: u16, bytes: &[u8]) -> [u8; RECORD_LEN] {
    let len = bytes.len().min(MAX_DATA_LEN);
    let h0 = (id as u32) << ID_SHIFT;
    let h1 = (bus << BUS_SHIFT) | (len as u32 & LEN_MASK);

    let mut record = [0u8; RECORD_LEN];
    record[0..4].copy_from_slice(&h0.to_le_bytes());
    record[4..8].copy_from_slice(&h1.to_le_bytes());
    record[DATA_OFFSET..DATA_OFFSET + len].copy_from_slice(&bytes[..len]);
    record
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw(h0: u32, h1: u32, bytes: [u8; 8]) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        record[0..4].copy_from_slice(&h0.to_le_bytes());
        record[4..8].copy_from_slice(&h1.to_le_bytes());
        record[8..].copy_from_slice(&bytes);
        record
    }

    #[test]
    fn decodes_frame() {
        let now = Local::now();
        let record = raw(0x152 << 21, 8, [1, 2, 3, 4, 5, 6, 7, 8]);
        match decode_record(&record, now) {
            Record::Frame(frame) => {
                assert_eq!(frame.id, 0x152);
                assert_eq!(frame.bus, 0);
                assert_eq!(frame.bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
                assert_eq!(frame.time, now);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn only_declared_bytes_are_kept() {
        let record = raw(0x3e9 << 21, (2 << 4) | 3, [9, 8, 7, 6, 5, 4, 3, 2]);
        match decode_record(&record, Local::now()) {
            Record::Frame(frame) => {
                assert_eq!(frame.bus, 2);
                assert_eq!(frame.bytes, vec![9, 8, 7]);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn low_bits_of_first_word_are_ignored() {
        let record = raw((0x123 << 21) | 0x1f_ffff, 1, [0xaa; 8]);
        match decode_record(&record, Local::now()) {
            Record::Frame(frame) => assert_eq!(frame.id, 0x123),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn wide_bus_is_not_masked() {
        let record = encode_record(0x41, 0x100, &[1]);
        match decode_record(&record, Local::now()) {
            Record::Frame(frame) => assert_eq!(frame.bus, 0x41),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn id_zero_is_padding() {
        let now = Local::now();
        assert_eq!(decode_record(&[0u8; RECORD_LEN], now), Record::Padding);
        let record = raw(0x1f_ffff, (3 << 4) | 8, [0xff; 8]);
        assert_eq!(decode_record(&record, now), Record::Padding);
    }

    #[test]
    fn challenge_is_ack() {
        let now = Local::now();
        for len in [0, 1, 8, 15] {
            let record = raw(6 << 21, (15 << 4) | len, [0; 8]);
            assert_eq!(decode_record(&record, now), Record::Ack);
        }
        // same id on another bus is an ordinary frame
        let record = encode_record(14, 6, &[1]);
        assert!(matches!(decode_record(&record, now), Record::Frame(_)));
    }

    #[test]
    fn invalid_lengths_are_rejected() {
        let now = Local::now();
        for len in [0u32, 9, 12, 15] {
            let record = raw(0x200 << 21, (1 << 4) | len, [0; 8]);
            assert_eq!(
                decode_record(&record, now),
                Record::BadLength {
                    bus: 1,
                    id: 0x200,
                    len: len as usize
                }
            );
        }
    }

    #[test]
    fn encode_is_inverse_of_decode() {
        let now = Local::now();
        for id in [1u16, 0x7f, 0x152, 0x400, 0x7ff] {
            for len in 1..=MAX_DATA_LEN {
                let bus = (id as u32 + len as u32) % 20;
                if bus == ACK_BUS && id == ACK_ID {
                    continue;
                }
                let bytes: Vec<u8> = (0..len)
                    .map(|i| (i as u8).wrapping_mul(37) ^ 0x5a)
                    .collect();
                let record = encode_record(bus, id, &bytes);
                assert_eq!(
                    decode_record(&record, now),
                    Record::Frame(Frame::new(now, bus, id, &bytes))
                );
            }
        }
    }

    #[test]
    fn datagram_keeps_wire_order() {
        let now = Local::now();
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_record(0, 0x101, &[1]));
        buf.extend_from_slice(&[0u8; RECORD_LEN]);
        buf.extend_from_slice(&encode_record(ACK_BUS, ACK_ID, &[0]));
        buf.extend_from_slice(&encode_record(1, 0x102, &[2, 3]));

        let records = decode_datagram(&buf, now).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], Record::Frame(Frame::new(now, 0, 0x101, &[1])));
        assert_eq!(records[1], Record::Padding);
        assert_eq!(records[2], Record::Ack);
        assert_eq!(
            records[3],
            Record::Frame(Frame::new(now, 1, 0x102, &[2, 3]))
        );
    }

    #[test]
    fn datagram_size_limits() {
        let now = Local::now();
        let record = encode_record(0, 0x101, &[1]);

        let full: Vec<u8> =
            record.iter().copied().cycle().take(MAX_DATAGRAM_LEN).collect();
        assert_eq!(decode_datagram(&full, now).unwrap().len(), MAX_RECORDS);

        let mut oversized = full.clone();
        oversized.extend_from_slice(&record);
        assert_eq!(
            decode_datagram(&oversized, now),
            Err(CodecError::Oversized(MAX_DATAGRAM_LEN + RECORD_LEN))
        );

        let misaligned = &full[..RECORD_LEN + 5];
        assert_eq!(
            decode_datagram(misaligned, now),
            Err(CodecError::Misaligned(RECORD_LEN + 5))
        );

        assert!(decode_datagram(&[], now).unwrap().is_empty());
    }
}
