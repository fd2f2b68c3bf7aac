use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{missing_packets, Apid, PacketRef};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApidSummary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    /// Smallest non-zero Time42 seen
    pub first_time42: Option<u64>,
    /// Largest Time42 seen
    pub last_time42: Option<u64>,
}

/// Tracks stats on packet iteration.
///
/// # Example
/// ```
/// use ccsds_telemetry::spacepacket::{read_packets, Packet, PacketBuilder, Summary};
///
/// let dat = PacketBuilder::new(5).time42(99).user_data(&[1]).build();
///
/// let mut summary = Summary::default();
/// let _packets: Vec<Packet> = read_packets(&dat[..])
///     .filter_map(Result::ok)
///     .inspect(|p| summary.add(&p.view()))
///     .collect();
///
/// assert_eq!(summary.count, 1);
/// assert_eq!(summary.apids[&5].last_time42, Some(99));
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub apids: HashMap<Apid, ApidSummary>,

    #[serde(skip)]
    last_sequence: HashMap<Apid, u16>,
}

impl Summary {
    pub fn add(&mut self, packet: &PacketRef<'_>) {
        let bytes = packet.data().len();
        let apid = packet.apid();
        let seq = packet.sequence_count();
        let time42 = packet.time42();

        self.count += 1;
        self.bytes += bytes;

        let summary = self.apids.entry(apid).or_default();
        summary.count += 1;
        summary.bytes += bytes;
        if time42 > 0 {
            summary.first_time42 = Some(summary.first_time42.map_or(time42, |t| t.min(time42)));
            summary.last_time42 = Some(summary.last_time42.map_or(time42, |t| t.max(time42)));
        }

        if let Some(last) = self.last_sequence.get(&apid) {
            let missing = missing_packets(seq, *last) as usize;
            summary.missing += missing;
            self.missing += missing;
        }
        self.last_sequence.insert(apid, seq);
    }
}
