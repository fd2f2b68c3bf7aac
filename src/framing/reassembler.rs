use std::fmt::Display;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{
    frame_counter, skipped_frames, spacecraft_id, FrameGeometry, Scid, Vcid, COUNTER_MODULUS,
};
use crate::spacepacket::{self, Packet, PacketRef, PrimaryHeader, MAX_PACKET_LEN};

/// Counters for the anomalies a reassembler recovers from.
///
/// Everything counted here is also logged; the counters exist so a caller can report
/// on a stream without installing a subscriber.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassemblyStats {
    /// Frames handed to the reassembler
    pub frames: u64,
    /// Frames discarded because their first header pointer marked them idle
    pub idle_frames: u64,
    /// Frames discarded while waiting for a packet header
    pub dropped_frames: u64,
    /// Frame counter discontinuities
    pub gaps: u64,
    /// Sum of the frames missing across all gaps
    pub frames_skipped: u64,
    /// Packets emitted, valid or not
    pub packets: u64,
    /// Packets whose length field disagreed with the bytes collected for them
    pub length_mismatches: u64,
    /// Partial packet bytes thrown away due to gaps or corrupt header pointers
    pub bytes_discarded: u64,
}

impl AddAssign for ReassemblyStats {
    fn add_assign(&mut self, rhs: Self) {
        self.frames += rhs.frames;
        self.idle_frames += rhs.idle_frames;
        self.dropped_frames += rhs.dropped_frames;
        self.gaps += rhs.gaps;
        self.frames_skipped += rhs.frames_skipped;
        self.packets += rhs.packets;
        self.length_mismatches += rhs.length_mismatches;
        self.bytes_discarded += rhs.bytes_discarded;
    }
}

/// A packet borrowed from a reassembler's working buffer.
///
/// The buffer is overwritten once the callback receiving this returns, so copy it with
/// [FramedPacket::to_decoded] to keep it.
#[derive(Debug, Clone, Copy)]
pub struct FramedPacket<'a> {
    pub scid: Scid,
    pub vcid: Vcid,
    pub packet: PacketRef<'a>,
    /// False when the packet length field disagrees with the number of bytes collected.
    pub valid: bool,
}

impl FramedPacket<'_> {
    #[must_use]
    pub fn to_decoded(&self) -> DecodedPacket {
        DecodedPacket {
            scid: self.scid,
            vcid: self.vcid,
            packet: self.packet.to_packet(),
            valid: self.valid,
        }
    }
}

/// A [Packet] with additional framing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub scid: Scid,
    pub vcid: Vcid,
    pub packet: Packet,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for a frame with a packet header
    Idle,
    /// Synced to the channel's packet stream
    Running,
}

/// Reassembles the packets of a single virtual channel.
///
/// Frames are pushed in the order received and completed packets are handed to a
/// callback. The packet handed to the callback borrows the reassembler's buffer, so
/// there is no copy unless the caller makes one.
///
/// # Example
/// ```
/// use ccsds_telemetry::framing::{ChannelReassembler, FrameGeometry};
///
/// let geom = FrameGeometry::default();
/// let mut reassembler = ChannelReassembler::new(0, geom);
///
/// // frame with an idle first header pointer
/// let mut frame = vec![0u8; geom.frame_length];
/// frame[6] = 0x07;
/// frame[7] = 0xfe;
///
/// let mut count = 0;
/// reassembler.push(&frame, |_| count += 1);
///
/// assert_eq!(count, 0);
/// assert_eq!(reassembler.stats().idle_frames, 1);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelReassembler {
    vcid: Vcid,
    geometry: FrameGeometry,
    state: State,
    /// Counter of the last frame accepted; the next frame must be one more
    last_counter: u32,
    /// Partial packet carried across frames
    packet: Vec<u8>,
    stats: ReassemblyStats,
}

impl Display for ChannelReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChannelReassembler{{vcid={}, state={:?}, last_counter={}, packet_len={}}}",
            self.vcid,
            self.state,
            self.last_counter,
            self.packet.len()
        )
    }
}

impl ChannelReassembler {
    #[must_use]
    pub fn new(vcid: Vcid, geometry: FrameGeometry) -> Self {
        Self {
            vcid,
            geometry,
            state: State::Idle,
            last_counter: 0,
            packet: Vec::with_capacity(MAX_PACKET_LEN),
            stats: ReassemblyStats::default(),
        }
    }

    #[must_use]
    pub fn vcid(&self) -> Vcid {
        self.vcid
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Number of bytes of a partial packet waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.packet.len()
    }

    /// Process the next frame of this channel, calling `sink` for each completed packet.
    ///
    /// `frame` must be at least `geometry.frame_length` bytes. Any partial packet left
    /// when the stream ends is never emitted.
    pub fn push<F>(&mut self, frame: &[u8], mut sink: F)
    where
        F: FnMut(FramedPacket<'_>),
    {
        let geom = self.geometry;
        let fhp = geom.first_header_pointer(frame);
        let counter = frame_counter(frame);
        let scid = spacecraft_id(frame);
        self.stats.frames += 1;

        match self.state {
            State::Idle => {
                if fhp == FrameGeometry::NO_HEADER {
                    trace!(vcid = self.vcid, counter, "no packet header while idle, dropping frame");
                    self.stats.dropped_frames += 1;
                    return;
                }
                if fhp == geom.idle_pointer {
                    trace!(vcid = self.vcid, counter, "idle frame");
                    self.stats.idle_frames += 1;
                    return;
                }
                if usize::from(fhp) >= geom.data_zone_length {
                    debug!(vcid = self.vcid, counter, fhp, "first header pointer outside data zone");
                    self.stats.dropped_frames += 1;
                    return;
                }
                self.last_counter = counter;
                self.packet.clear();
                self.state = State::Running;
                self.extract(frame, geom.data_zone_start + usize::from(fhp), scid, &mut sink);
            }
            State::Running => {
                let expected = (self.last_counter + 1) % COUNTER_MODULUS;
                if counter != expected {
                    let skipped = skipped_frames(expected, counter);
                    debug!(
                        vcid = self.vcid,
                        expected,
                        actual = counter,
                        skipped,
                        "frame counter gap, dropping partial packet"
                    );
                    self.stats.gaps += 1;
                    self.stats.frames_skipped += u64::from(skipped);
                    self.reset();
                    return;
                }
                self.last_counter = counter;

                if fhp == 0 {
                    if !self.packet.is_empty() {
                        self.emit(scid, &mut sink);
                    }
                    self.extract(frame, geom.data_zone_start, scid, &mut sink);
                } else if fhp == FrameGeometry::NO_HEADER {
                    self.append(&frame[geom.data_zone_start..geom.data_zone_end]);
                } else if fhp == geom.idle_pointer {
                    trace!(vcid = self.vcid, counter, "idle frame");
                    self.stats.idle_frames += 1;
                } else if usize::from(fhp) < geom.data_zone_length {
                    let start = geom.data_zone_start;
                    let hdr = start + usize::from(fhp);
                    if self.packet.is_empty() {
                        // nothing to complete, e.g., the previous packet ended exactly at
                        // the end of the previous frame's data zone
                        self.stats.bytes_discarded += (hdr - start) as u64;
                    } else if self.append(&frame[start..hdr]) {
                        self.emit(scid, &mut sink);
                    } else {
                        // oversized partial was dropped; resync on this frame's header
                        self.state = State::Running;
                    }
                    self.extract(frame, hdr, scid, &mut sink);
                } else {
                    debug!(vcid = self.vcid, counter, fhp, "first header pointer outside data zone");
                    self.reset();
                }
            }
        }
    }

    /// Discard any partial packet and go back to waiting for a packet header.
    pub fn reset(&mut self) {
        self.stats.bytes_discarded += self.packet.len() as u64;
        self.packet.clear();
        self.state = State::Idle;
    }

    /// Append `dat` to the partial packet. Returns false, and resets, if doing so would
    /// grow the packet beyond the largest possible packet.
    fn append(&mut self, dat: &[u8]) -> bool {
        if self.packet.len() + dat.len() > MAX_PACKET_LEN {
            debug!(
                vcid = self.vcid,
                len = self.packet.len() + dat.len(),
                "partial packet exceeds maximum packet length"
            );
            self.reset();
            return false;
        }
        self.packet.extend_from_slice(dat);
        true
    }

    /// Collect packets starting at `cursor` until the data zone is exhausted.
    fn extract<F>(&mut self, frame: &[u8], mut cursor: usize, scid: Scid, sink: &mut F)
    where
        F: FnMut(FramedPacket<'_>),
    {
        let end = self.geometry.data_zone_end;
        loop {
            let remaining = end - cursor;
            if remaining < PrimaryHeader::LEN {
                self.append(&frame[cursor..end]);
                return;
            }

            self.packet.clear();
            self.packet
                .extend_from_slice(&frame[cursor..cursor + PrimaryHeader::LEN]);
            cursor += PrimaryHeader::LEN;
            let need = spacepacket::length(&self.packet) + 1;
            let remaining = end - cursor;
            if remaining == 0 {
                return;
            }
            if remaining < need {
                self.append(&frame[cursor..end]);
                return;
            }

            self.packet.extend_from_slice(&frame[cursor..cursor + need]);
            cursor += need;
            self.emit(scid, sink);
            if remaining == need {
                return;
            }
        }
    }

    /// Validate the length of the collected packet and hand it to `sink`.
    fn emit<F>(&mut self, scid: Scid, sink: &mut F)
    where
        F: FnMut(FramedPacket<'_>),
    {
        let actual = self.packet.len();
        let Some(packet) = PacketRef::new(&self.packet) else {
            warn!(vcid = self.vcid, actual, "partial packet too short for a header, dropping");
            self.stats.length_mismatches += 1;
            self.stats.bytes_discarded += actual as u64;
            self.packet.clear();
            return;
        };

        let expected = packet.total_length();
        let valid = expected == actual;
        if !valid {
            warn!(
                vcid = self.vcid,
                apid = packet.apid(),
                time42 = packet.time42(),
                expected,
                actual,
                "packet length mismatch"
            );
            self.stats.length_mismatches += 1;
        }
        self.stats.packets += 1;

        sink(FramedPacket {
            scid,
            vcid: self.vcid,
            packet,
            valid,
        });
        self.packet.clear();
    }
}
