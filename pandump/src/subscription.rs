//! Control packets asking the device to stream a set of CAN ids

use crate::MAX_STANDARD_ID;
use log::warn;
use std::collections::BTreeSet;

pub const SUBSCRIBE_COMMAND: u8 = 0x0F;
pub const MAX_IDS_PER_PACKET: usize = 42;
pub const MAX_PACKET_LEN: usize = 1 + ENTRY_LEN * MAX_IDS_PER_PACKET;

const ENTRY_LEN: usize = 3;
const ENTRY_MARKER: u8 = 0xFF;

/// Encode ids into as few subscription packets as capacity allows. Ids that
/// are not 11-bit standard identifiers are skipped.
pub fn encode_subscription<I>(ids: I) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = u32>,
{
    let mut packets = Vec::new();
    let mut packet = vec![SUBSCRIBE_COMMAND];

    for id in ids {
        if id > MAX_STANDARD_ID as u32 {
            warn!(
                "Invalid frame ID {id:#x}: \
                 must be between 0 and {MAX_STANDARD_ID:#x}"
            );
            continue;
        }
        if packet.len() == MAX_PACKET_LEN {
            packets.push(packet);
            packet = vec![SUBSCRIBE_COMMAND];
        }
        packet.extend_from_slice(&[ENTRY_MARKER, (id >> 8) as u8, id as u8]);
    }

    if packet.len() > 1 {
        packets.push(packet);
    }
    packets
}

/// Ids the device is asked to stream, kept sorted so packets are stable
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    ids: BTreeSet<u32>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I: IntoIterator<Item = u32>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, id: u32) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }

    pub fn packets(&self) -> Vec<Vec<u8>> {
        encode_subscription(self.iter())
    }
}
