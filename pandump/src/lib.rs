//! pandump library for capturing raw CAN traffic relayed by a panda device

pub mod codec;
pub mod dump;
pub mod stats;
pub mod subscription;

use chrono::{DateTime, Local};

/// Largest 11-bit standard CAN identifier
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// A captured CAN frame, as handed from the device link to the dump writers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub time: DateTime<Local>,
    pub bus: u32,
    pub id: u16,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn new(time: DateTime<Local>, bus: u32, id: u16, bytes: &[u8]) -> Self {
        Self {
            time,
            bus,
            id,
            bytes: bytes.to_vec(),
        }
    }

    pub fn id_string(&self) -> String {
        format!("{:03x}", self.id)
    }

    pub fn data_string(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Capture time in microseconds since the unix epoch
    pub fn timestamp_micros(&self) -> i64 {
        self.time.timestamp_micros()
    }

    /// Capture time as `<seconds>.<microseconds>` since the unix epoch
    pub fn unix_string(&self) -> String {
        format!(
            "{}.{:06}",
            self.time.timestamp(),
            self.time.timestamp_subsec_micros()
        )
    }
}
