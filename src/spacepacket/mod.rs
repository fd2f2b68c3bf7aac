//! CCSDS space packets with the ITOS primary + Time42 secondary header profile.
//!
//! Packet layout:
//! ```text
//! byte 0..2   version(3) type(1) secondary-header-flag(1) apid(11)
//! byte 2..4   sequence-flags(2) sequence-count(14)
//! byte 4..6   data length minus 1 (total packet length is this value + 7)
//! byte 6..12  Time42 secondary header (32 bit seconds, 16 bit subseconds), if flagged
//! ```
mod builder;
mod filter;
mod summary;

pub use builder::*;
pub use filter::*;
pub use summary::*;

use std::fmt::Display;
use std::io::{ErrorKind, Read};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::prelude::*;

pub type Apid = u16;

/// Maximum number of bytes any packet can occupy: primary header plus 65536 data bytes.
pub const MAX_PACKET_LEN: usize = PrimaryHeader::LEN + 65536;

/// Packet APID from the low 3 bits of byte 0 and byte 1.
#[inline]
#[must_use]
pub fn apid(buf: &[u8]) -> Apid {
    codec::u12(buf, 0) & 0x7ff
}

/// Full 16-bit packet stream id, i.e., the first 2 bytes.
#[inline]
#[must_use]
pub fn stream_id(buf: &[u8]) -> u16 {
    codec::u12(buf, 0)
}

/// 14-bit sequence count with the sequence flags masked off.
#[inline]
#[must_use]
pub fn sequence_count(buf: &[u8]) -> u16 {
    codec::u12(buf, 2) & 0x3fff
}

/// Packet data length field, i.e., number of bytes after the primary header minus 1.
#[inline]
#[must_use]
pub fn length(buf: &[u8]) -> usize {
    codec::u12(buf, 4) as usize
}

/// Total number of bytes in the packet described by the header at the start of `buf`.
#[inline]
#[must_use]
pub fn total_length(buf: &[u8]) -> usize {
    length(buf) + PrimaryHeader::LEN + 1
}

#[inline]
#[must_use]
pub fn has_secondary_header(buf: &[u8]) -> bool {
    buf[0] & 0x08 != 0
}

/// Time42 from the secondary header, or 0 if the packet does not have one.
#[inline]
#[must_use]
pub fn time42(buf: &[u8]) -> u64 {
    if has_secondary_header(buf) {
        time42_force(buf)
    } else {
        0
    }
}

/// Time42 from bytes 6..12 regardless of the secondary header flag.
#[inline]
#[must_use]
pub fn time42_force(buf: &[u8]) -> u64 {
    codec::u123456(buf, PrimaryHeader::LEN)
}

/// Secondary header coarse seconds, with the top bit masked.
#[inline]
#[must_use]
pub fn seconds(buf: &[u8]) -> u32 {
    codec::u1234(buf, PrimaryHeader::LEN) & 0x7fff_ffff
}

/// Secondary header subseconds in units of 1/65536 s.
#[inline]
#[must_use]
pub fn subseconds(buf: &[u8]) -> u16 {
    codec::u12(buf, PrimaryHeader::LEN + 4)
}

/// True when the last `zero_count` bytes of the declared packet are all zero.
///
/// Truncated packets get zero filled by some ground systems, so a zero tail is a
/// decent hint the packet is padding rather than data. It is only a heuristic.
#[must_use]
pub fn is_short_packet(buf: &[u8], zero_count: usize) -> bool {
    let len = total_length(buf).min(buf.len());
    let low = len.saturating_sub(zero_count);
    buf[low..len].iter().all(|b| *b == 0)
}

/// Borrowed view of a packet within a (possibly larger, reused) byte buffer.
///
/// A `PacketRef` handed out by the reassembler borrows that reassembler's working
/// buffer, so it must be copied with [PacketRef::to_packet] to outlive the callback
/// it is given to.
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    buf: &'a [u8],
}

impl<'a> PacketRef<'a> {
    /// Construct a view, or `None` if there are not enough bytes for a primary header.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < PrimaryHeader::LEN {
            return None;
        }
        Some(Self { buf })
    }

    #[must_use]
    pub fn apid(&self) -> Apid {
        apid(self.buf)
    }

    #[must_use]
    pub fn stream_id(&self) -> u16 {
        stream_id(self.buf)
    }

    #[must_use]
    pub fn sequence_count(&self) -> u16 {
        sequence_count(self.buf)
    }

    #[must_use]
    pub fn length(&self) -> usize {
        length(self.buf)
    }

    #[must_use]
    pub fn total_length(&self) -> usize {
        total_length(self.buf)
    }

    #[must_use]
    pub fn has_secondary_header(&self) -> bool {
        has_secondary_header(self.buf)
    }

    /// Packet Time42, 0 if there is no secondary header or not enough bytes for one.
    #[must_use]
    pub fn time42(&self) -> u64 {
        if self.buf.len() < PrimaryHeader::LEN + SECONDARY_HEADER_LEN {
            return 0;
        }
        time42(self.buf)
    }

    #[must_use]
    pub fn header(&self) -> PrimaryHeader {
        // new guarantees there are enough bytes
        PrimaryHeader::decode(self.buf).unwrap_or_default()
    }

    /// Packet bytes, i.e., the buffer truncated to the length declared in the header.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        &self.buf[..self.total_length().min(self.buf.len())]
    }

    /// True when the buffer holds at least as many bytes as the header declares.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.buf.len() >= self.total_length()
    }

    /// Copy into an owned [Packet] of exactly the declared length (or less, if the
    /// buffer is short).
    #[must_use]
    pub fn to_packet(&self) -> Packet {
        Packet {
            header: self.header(),
            data: self.data().to_vec(),
            offset: 0,
        }
    }
}

/// Secondary header length for the Time42 profile.
pub const SECONDARY_HEADER_LEN: usize = 6;

/// Packet represents a single CCSDS space packet and its associated data.
///
/// # Example
/// ```
/// use ccsds_telemetry::spacepacket::Packet;
///
/// let dat: &[u8] = &[
///     // primary header bytes, apid 100 with secondary header
///     0x08, 0x64, 0xc0, 0x01, 0x0, 0x06,
///     // Time42 secondary header
///     0x00, 0x00, 0x01, 0x00, 0x80, 0x00,
///     // 1 byte of user data
///     0xff,
/// ];
/// let packet = Packet::decode(dat).unwrap();
/// assert_eq!(packet.header.apid, 100);
/// assert_eq!(packet.time42(), 0x0100_8000);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// All packets have a primary header
    pub header: PrimaryHeader,
    /// All packet bytes, including header and user data
    pub data: Vec<u8>,
    /// Byte offset of this packet in the stream it was read from
    pub offset: usize,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{header: {:?}, data:[len={}]}}",
            self.header,
            self.data.len()
        )
    }
}

impl Packet {
    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header or if there are not enough bytes to construct the [Packet] of the length
    /// indicated by the header. Any bytes beyond the declared length are ignored.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Packet> {
        let view = PacketRef::new(dat)?;
        if !view.is_complete() {
            return None;
        }
        Some(view.to_packet())
    }

    #[must_use]
    pub fn view(&self) -> PacketRef<'_> {
        PacketRef { buf: &self.data }
    }

    #[must_use]
    pub fn time42(&self) -> u64 {
        self.view().time42()
    }

    /// Read a single [Packet].
    ///
    /// # Errors
    /// Any ``std::io::Error`` reading
    pub fn read<R>(mut r: R) -> Result<Packet>
    where
        R: Read,
    {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        r.read_exact(&mut buf)?;
        let total = total_length(&buf);
        buf.resize(total, 0);
        r.read_exact(&mut buf[PrimaryHeader::LEN..])?;

        Ok(Packet {
            header: PrimaryHeader::decode(&buf).unwrap_or_default(),
            data: buf,
            offset: 0,
        })
    }
}

/// Copy each buffer in `buffers` into an owned packet of exactly its declared length.
///
/// Buffers too short to contain a length field are dropped. Use this to retain
/// packets from a source that reuses its buffers.
pub fn to_owned_packets<'a, I>(buffers: I) -> impl Iterator<Item = Packet> + 'a
where
    I: IntoIterator<Item = &'a [u8]> + 'a,
{
    buffers
        .into_iter()
        .filter_map(PacketRef::new)
        .map(|p| p.to_packet())
}

/// Packet is the first packet in a packet group
pub const SEQ_FIRST: u8 = 1;
/// Packet is a part of a packet group, but not first and not last
pub const SEQ_CONTINUATION: u8 = 0;
/// Packet is the last packet in a packet group
pub const SEQ_LAST: u8 = 2;
/// Packet is not part of a packet group, i.e., standalone.
pub const SEQ_UNSEGMENTED: u8 = 3;

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    /// Defines a packets grouping. See the `SEQ_*` values.
    pub sequence_flags: u8,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 6;
    pub const SEQ_MAX: u16 = 16383;

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let d1 = codec::u12(buf, 0);
        let d2 = codec::u12(buf, 2);
        let d3 = codec::u12(buf, 4);

        Some(PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_id: (d2 & 0x3fff),
            len_minus1: d3,
        })
    }
}

/// Calculate the number of missing sequence ids.
///
/// `cur` is the current sequence id. `last` is the sequence id seen before `cur`.
#[must_use]
pub fn missing_packets(cur: u16, last: u16) -> u16 {
    let expected = if last + 1 > PrimaryHeader::SEQ_MAX {
        0
    } else {
        last + 1
    };
    if cur != expected {
        if last + 1 > cur {
            return cur + PrimaryHeader::SEQ_MAX - last;
        }
        return cur - last - 1;
    }
    0
}

struct PacketReaderIter<R>
where
    R: Read,
{
    reader: R,
    offset: usize,
    done: bool,
}

impl<R> Iterator for PacketReaderIter<R>
where
    R: Read,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match Packet::read(&mut self.reader) {
            Ok(mut p) => {
                p.offset = self.offset;
                self.offset += p.data.len();
                Some(Ok(p))
            }
            Err(Error::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                // Downlinked files are routinely truncated mid-packet
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Return an iterator providing [Packet]s read from a byte stream of concatenated
/// packets.
///
/// The stream ends cleanly at end of input, even when the input ends partway through a
/// packet.
///
/// # Examples
/// ```
/// use ccsds_telemetry::spacepacket::read_packets;
///
/// let dat: &[u8] = &[
///     0x08, 0x64, 0xc0, 0x01, 0x0, 0x06,
///     0x00, 0x00, 0x01, 0x00, 0x80, 0x00,
///     0xff,
/// ];
///
/// read_packets(dat).for_each(|zult| {
///     let packet = zult.unwrap();
///     assert_eq!(packet.header.apid, 100);
/// });
/// ```
pub fn read_packets<R>(reader: R) -> impl Iterator<Item = Result<Packet>>
where
    R: Read,
{
    PacketReaderIter {
        reader,
        offset: 0,
        done: false,
    }
}
