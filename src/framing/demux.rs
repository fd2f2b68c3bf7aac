use std::collections::VecDeque;

use tracing::{debug, trace};

use super::{
    is_padding, virtual_channel, ChannelReassembler, DecodedPacket, FrameGeometry, FramedPacket,
    ReassemblyStats, Vcid, NUM_VCIDS,
};

/// Routes interleaved frames to one [ChannelReassembler] per virtual channel.
///
/// Reassemblers are created the first time their channel is seen. Channels never share
/// state, so a gap on one channel has no effect on the others.
///
/// The demux stops for good at the first all-zero (padding) frame or at a frame shorter
/// than the configured frame length; every later push is ignored.
#[derive(Debug)]
pub struct Demux {
    geometry: FrameGeometry,
    channels: Vec<Option<ChannelReassembler>>,
    done: bool,
}

impl Demux {
    #[must_use]
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            channels: (0..NUM_VCIDS).map(|_| None).collect(),
            done: false,
        }
    }

    /// True once a padding or short frame has ended the stream.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Process one frame, calling `sink` for each packet it completes.
    ///
    /// Returns false if the stream has ended and the frame was not processed.
    pub fn push<F>(&mut self, frame: &[u8], sink: F) -> bool
    where
        F: FnMut(FramedPacket<'_>),
    {
        if self.done {
            return false;
        }
        if frame.len() < self.geometry.frame_length {
            debug!(
                len = frame.len(),
                expected = self.geometry.frame_length,
                "short frame, ending stream"
            );
            self.done = true;
            return false;
        }
        if is_padding(frame) {
            debug!("zero filled frame, ending stream");
            self.done = true;
            return false;
        }

        let vcid = virtual_channel(frame);
        let geometry = self.geometry;
        let reassembler = self.channels[usize::from(vcid)].get_or_insert_with(|| {
            trace!(vcid, "new virtual channel");
            ChannelReassembler::new(vcid, geometry)
        });
        reassembler.push(frame, sink);
        true
    }

    /// Reassembler for `vcid`, if any frame for it has been seen.
    #[must_use]
    pub fn channel(&self, vcid: Vcid) -> Option<&ChannelReassembler> {
        self.channels.get(usize::from(vcid))?.as_ref()
    }

    /// Virtual channels seen so far, in ascending order.
    pub fn vcids(&self) -> impl Iterator<Item = Vcid> + '_ {
        self.channels.iter().flatten().map(ChannelReassembler::vcid)
    }

    /// Stats summed over all channels.
    #[must_use]
    pub fn stats(&self) -> ReassemblyStats {
        let mut total = ReassemblyStats::default();
        for r in self.channels.iter().flatten() {
            total += r.stats();
        }
        total
    }
}

struct FramedPacketIter<I> {
    frames: I,
    demux: Demux,
    // Packets that have already been decoded and are waiting to be provided.
    ready: VecDeque<DecodedPacket>,
}

impl<I, T> Iterator for FramedPacketIter<I>
where
    I: Iterator<Item = T>,
    T: AsRef<[u8]>,
{
    type Item = DecodedPacket;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Some(packet);
            }
            if self.demux.is_done() {
                return None;
            }
            let Some(frame) = self.frames.next() else {
                trace!("no more frames");
                return None;
            };
            let ready = &mut self.ready;
            self.demux
                .push(frame.as_ref(), |p| ready.push_back(p.to_decoded()));
        }
    }
}

/// Decodes the packets contained in an interleaved sequence of frames.
///
/// Each packet is copied out of its channel's working buffer. Packets of one virtual
/// channel are produced in stream order; there is no ordering between channels beyond
/// the order in which frames completed them.
///
/// # Example
/// ```
/// use ccsds_telemetry::framing::{decode_framed_packets, FrameGeometry};
///
/// let frames: Vec<Vec<u8>> = vec![vec![0u8; 1115]];
/// let packets: Vec<_> = decode_framed_packets(frames, FrameGeometry::default()).collect();
///
/// // zero filled frames end the stream
/// assert!(packets.is_empty());
/// ```
pub fn decode_framed_packets<I, T>(
    frames: I,
    geometry: FrameGeometry,
) -> impl Iterator<Item = DecodedPacket>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    FramedPacketIter {
        frames: frames.into_iter(),
        demux: Demux::new(geometry),
        ready: VecDeque::new(),
    }
}

/// Like [decode_framed_packets] but only reassembles virtual channel `vcid`; frames for
/// other channels are ignored.
pub fn reassemble_channel<I, T>(
    frames: I,
    geometry: FrameGeometry,
    vcid: Vcid,
) -> impl Iterator<Item = DecodedPacket>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let frames = frames.into_iter().filter(move |f| {
        let f = f.as_ref();
        // padding and short frames still need to reach the demux to end the stream
        f.len() < geometry.frame_length || is_padding(f) || virtual_channel(f) == vcid
    });
    decode_framed_packets(frames, geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacepacket::PacketBuilder;

    fn geom() -> FrameGeometry {
        FrameGeometry::new(32).unwrap()
    }

    fn frame(vcid: u8, counter: u8, zone: &[u8]) -> Vec<u8> {
        let geom = geom();
        let mut dat = vec![0u8; geom.frame_length];
        dat[1] = vcid;
        dat[4] = counter;
        dat[geom.data_zone_start..geom.data_zone_start + zone.len()].copy_from_slice(zone);
        dat
    }

    fn zone(apid: u16) -> Vec<u8> {
        // one packet filling the whole 18 byte zone
        PacketBuilder::new(apid)
            .without_secondary_header()
            .user_data(&[apid as u8; 12])
            .build()
    }

    #[test]
    fn routes_by_vcid() {
        let frames = vec![
            frame(1, 0, &zone(10)),
            frame(2, 0, &zone(20)),
            frame(1, 1, &zone(11)),
            frame(2, 1, &zone(21)),
        ];

        let packets: Vec<DecodedPacket> = decode_framed_packets(frames, geom()).collect();

        let apids: Vec<(Vcid, u16)> = packets
            .iter()
            .map(|p| (p.vcid, p.packet.header.apid))
            .collect();
        assert_eq!(apids, vec![(1, 10), (2, 20), (1, 11), (2, 21)]);
    }

    #[test]
    fn padding_frame_stops_everything() {
        let frames = vec![
            frame(1, 0, &zone(10)),
            vec![0u8; 32],
            frame(1, 1, &zone(11)),
        ];

        let packets: Vec<DecodedPacket> = decode_framed_packets(frames, geom()).collect();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn short_frame_ends_stream() {
        let mut demux = Demux::new(geom());
        assert!(demux.push(&frame(1, 0, &zone(10)), |_| {}));
        assert!(!demux.push(&[1u8; 10], |_| {}));
        assert!(demux.is_done());
        assert!(!demux.push(&frame(1, 1, &zone(10)), |_| {}));
    }

    #[test]
    fn channels_are_lazy() {
        let mut demux = Demux::new(geom());
        demux.push(&frame(5, 0, &zone(1)), |_| {});
        demux.push(&frame(63, 0, &zone(1)), |_| {});

        assert_eq!(demux.vcids().collect::<Vec<_>>(), vec![5, 63]);
        assert!(demux.channel(0).is_none());
        assert_eq!(demux.channel(63).unwrap().stats().packets, 1);
        assert_eq!(demux.stats().packets, 2);
        assert!(demux.channel(200).is_none());
    }

    #[test]
    fn single_channel() {
        let frames = vec![
            frame(1, 0, &zone(10)),
            frame(2, 0, &zone(20)),
            frame(1, 1, &zone(11)),
        ];

        let packets: Vec<DecodedPacket> = reassemble_channel(frames, geom(), 1).collect();

        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.vcid == 1));
    }
}
