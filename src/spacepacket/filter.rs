use std::collections::HashSet;

use typed_builder::TypedBuilder;

use super::{Apid, Packet, PacketRef};

/// Selects packets by APID and an inclusive Time42 range, optionally skipping the first
/// matches.
///
/// # Example
/// ```
/// use ccsds_telemetry::spacepacket::{PacketBuilder, PacketFilter, Packet};
///
/// let packets: Vec<Packet> = (0..4u16)
///     .map(|i| Packet::decode(&PacketBuilder::new(10 + i % 2).time42(u64::from(i)).build()).unwrap())
///     .collect();
///
/// let filter = PacketFilter::builder().apids([10].into()).start(1).build();
/// let kept: Vec<Packet> = filter.apply(packets.into_iter()).collect();
///
/// assert_eq!(kept.len(), 1);
/// assert_eq!(kept[0].time42(), 2);
/// ```
#[derive(TypedBuilder, Debug, Clone)]
pub struct PacketFilter {
    /// APIDs to keep. `None` keeps all.
    #[builder(default, setter(strip_option))]
    apids: Option<HashSet<Apid>>,
    /// Inclusive lower Time42 bound.
    #[builder(default = 0)]
    start: u64,
    /// Inclusive upper Time42 bound.
    #[builder(default = u64::MAX)]
    stop: u64,
    /// Number of matching packets to drop before any are produced.
    #[builder(default = 0)]
    skip: usize,
}

impl Default for PacketFilter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PacketFilter {
    /// True when `packet` satisfies the APID and time constraints. `skip` is not
    /// considered.
    #[must_use]
    pub fn matches(&self, packet: &PacketRef<'_>) -> bool {
        let t = packet.time42();
        if t < self.start || t > self.stop {
            return false;
        }
        match self.apids {
            Some(ref apids) => apids.contains(&packet.apid()),
            None => true,
        }
    }

    /// Filter owned packets.
    pub fn apply<I>(self, packets: I) -> impl Iterator<Item = Packet>
    where
        I: Iterator<Item = Packet>,
    {
        let skip = self.skip;
        packets.filter(move |p| self.matches(&p.view())).skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacepacket::PacketBuilder;

    fn packets() -> Vec<Packet> {
        (0..10u16)
            .map(|i| {
                let dat = PacketBuilder::new(i % 3)
                    .sequence_count(i)
                    .time42(u64::from(i) * 100)
                    .build();
                Packet::decode(&dat).unwrap()
            })
            .collect()
    }

    #[test]
    fn default_keeps_everything() {
        let got: Vec<Packet> = PacketFilter::default().apply(packets().into_iter()).collect();
        assert_eq!(got.len(), 10);
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let filter = PacketFilter::builder().start(200).stop(500).build();
        let got: Vec<u16> = filter
            .apply(packets().into_iter())
            .map(|p| p.header.sequence_id)
            .collect();
        assert_eq!(got, vec![2, 3, 4, 5]);
    }

    #[test]
    fn apids_and_skip() {
        let filter = PacketFilter::builder()
            .apids([1, 2].into_iter().collect())
            .skip(2)
            .build();
        let got: Vec<u16> = filter
            .apply(packets().into_iter())
            .map(|p| p.header.sequence_id)
            .collect();
        // matches are 1, 2, 4, 5, 7, 8
        assert_eq!(got, vec![4, 5, 7, 8]);
    }

    #[test]
    fn packets_without_timestamp_have_time_zero() {
        let dat = PacketBuilder::new(1).without_secondary_header().build();
        let p = PacketRef::new(&dat).unwrap();

        assert!(PacketFilter::builder().stop(0).build().matches(&p));
        assert!(!PacketFilter::builder().start(1).build().matches(&p));
    }
}
