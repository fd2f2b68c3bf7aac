//! CCSDS AOS transfer frame (VCDU) access and frame-to-packet reassembly.
//!
//! Frames handed to this module have already had any sync marker and wrapper bytes
//! stripped; offsets are relative to the first byte of the VCDU primary header.
//!
//! ```text
//! 0..6                        VCDU primary header
//! 6..8                        M_PDU header (11 bit first header pointer)
//! 8..frame_length-trailer     M_PDU packet zone
//! frame_length-trailer..      trailer (not interpreted)
//! ```
mod demux;
mod reader;
mod reassembler;
mod swap;

pub use demux::*;
pub use reader::*;
pub use reassembler::*;
pub use swap::*;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::codec;
use crate::prelude::*;

pub type Scid = u16;
pub type Vcid = u16;

/// Number of virtual channels addressable by the 6 bit VCID.
pub const NUM_VCIDS: usize = 64;

/// Frame counters are 24 bits and wrap to 0 after this many frames.
pub const COUNTER_MODULUS: u32 = 1 << 24;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct VcduHeader {
    pub version: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    pub counter: u32,
    pub replay: bool,
}

impl VcduHeader {
    /// VCDU header length in bytes
    pub const LEN: usize = 6;

    /// Construct from the provided bytes, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }

        Some(VcduHeader {
            version: (dat[0] >> 6) & 0x3,
            scid: spacecraft_id(dat),
            vcid: virtual_channel(dat),
            counter: frame_counter(dat),
            replay: (dat[5] >> 7) & 0x1 == 1,
        })
    }
}

/// 8 bit spacecraft id spanning bytes 0 and 1.
#[inline]
#[must_use]
pub fn spacecraft_id(frame: &[u8]) -> Scid {
    (codec::u12(frame, 0) >> 6) & 0xff
}

/// 6 bit virtual channel id from the low bits of byte 1.
#[inline]
#[must_use]
pub fn virtual_channel(frame: &[u8]) -> Vcid {
    Vcid::from(frame[1] & 0x3f)
}

/// 24 bit big-endian frame counter.
#[inline]
#[must_use]
pub fn frame_counter(frame: &[u8]) -> u32 {
    codec::u123(frame, 2)
}

/// True for the all zero frames some recorders pad the end of a file with.
#[must_use]
pub fn is_padding(frame: &[u8]) -> bool {
    frame.len() < 8 || frame[..8].iter().all(|b| *b == 0)
}

/// Number of frames missing between an `expected` and an `actual` frame counter.
#[inline]
#[must_use]
pub fn skipped_frames(expected: u32, actual: u32) -> u32 {
    (actual % COUNTER_MODULUS + COUNTER_MODULUS - expected % COUNTER_MODULUS) % COUNTER_MODULUS
}

/// Frame geometry configuration.
///
/// Deserializes with defaults for missing fields, so `{}` is the 1115 byte profile.
///
/// # Example
/// ```
/// use ccsds_telemetry::framing::FrameConfig;
///
/// let geom = FrameConfig::builder().frame_length(892).build().geometry().unwrap();
/// assert_eq!(geom.data_zone_start, 8);
/// assert_eq!(geom.data_zone_length, 892 - 6 - 6 - 2);
/// ```
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FrameConfig {
    /// Length of a frame, not counting any sync marker or wrapper.
    #[builder(default = FrameGeometry::DEFAULT_FRAME_LENGTH)]
    pub frame_length: usize,
    /// VCDU header length, including any insert zone.
    #[builder(default = VcduHeader::LEN)]
    pub header_length: usize,
    #[builder(default = 6)]
    pub trailer_length: usize,
    #[builder(default = 2)]
    pub mpdu_header_length: usize,
    /// First header pointer value marking an idle frame.
    #[builder(default = FrameGeometry::IDLE)]
    pub idle_pointer: u16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FrameConfig {
    /// Validate and compute the derived frame geometry.
    ///
    /// # Errors
    /// [Error::Config] if the header is shorter than a VCDU header or the header,
    /// M_PDU header, and trailer leave no room for a packet zone.
    pub fn geometry(&self) -> Result<FrameGeometry> {
        if self.header_length < VcduHeader::LEN {
            return Err(Error::Config(format!(
                "header length {} is shorter than a VCDU header",
                self.header_length
            )));
        }
        if self.mpdu_header_length < 2 {
            return Err(Error::Config(
                "M_PDU header must hold a first header pointer".to_string(),
            ));
        }
        let overhead = self.header_length + self.mpdu_header_length + self.trailer_length;
        if self.frame_length <= overhead {
            return Err(Error::Config(format!(
                "frame length {} leaves no packet zone after {overhead} bytes of overhead",
                self.frame_length
            )));
        }
        let data_zone_start = self.header_length + self.mpdu_header_length;
        let data_zone_length = self.frame_length - overhead;
        Ok(FrameGeometry {
            frame_length: self.frame_length,
            header_length: self.header_length,
            data_zone_start,
            data_zone_length,
            data_zone_end: data_zone_start + data_zone_length,
            idle_pointer: self.idle_pointer,
        })
    }
}

/// Fixed offsets derived once from a [FrameConfig].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub frame_length: usize,
    pub header_length: usize,
    /// Offset of the first packet zone byte, i.e., after the M_PDU header.
    pub data_zone_start: usize,
    pub data_zone_length: usize,
    pub data_zone_end: usize,
    pub idle_pointer: u16,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            frame_length: Self::DEFAULT_FRAME_LENGTH,
            header_length: VcduHeader::LEN,
            data_zone_start: 8,
            data_zone_length: Self::DEFAULT_FRAME_LENGTH - 14,
            data_zone_end: Self::DEFAULT_FRAME_LENGTH - 6,
            idle_pointer: Self::IDLE,
        }
    }
}

impl FrameGeometry {
    pub const DEFAULT_FRAME_LENGTH: usize = 1115;
    /// First header pointer value indicating no packet header starts in the frame.
    pub const NO_HEADER: u16 = 0x7ff;
    /// First header pointer value indicating the M_PDU holds only idle data.
    pub const IDLE: u16 = 0x7fe;

    /// Geometry for `frame_length` with default header and trailer lengths.
    ///
    /// # Errors
    /// See [FrameConfig::geometry].
    pub fn new(frame_length: usize) -> Result<Self> {
        FrameConfig::builder()
            .frame_length(frame_length)
            .build()
            .geometry()
    }

    /// 11 bit first header pointer from the M_PDU header.
    #[inline]
    #[must_use]
    pub fn first_header_pointer(&self, frame: &[u8]) -> u16 {
        codec::u12(frame, self.header_length) & 0x7ff
    }

    /// The packet zone bytes of `frame`.
    #[inline]
    #[must_use]
    pub fn data_zone<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        &frame[self.data_zone_start..self.data_zone_end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_vcduheader() {
        let dat: Vec<u8> = vec![
            0x55, 0x61, // version 1, scid 85, vcid 33
            0x01, 0xe2, 0x40, // counter 123456
            0x05, // replay:false
            0x00, 0x01,
        ];

        let header = VcduHeader::decode(&dat).unwrap();

        assert_eq!(header.version, 1);
        assert_eq!(header.scid, 85);
        assert_eq!(header.vcid, 33);
        assert_eq!(header.counter, 123_456);
        assert!(!header.replay);
        assert!(VcduHeader::decode(&dat[..5]).is_none());
    }

    #[test]
    fn first_header_pointer_masks_spare_bits() {
        let geom = FrameGeometry::default();
        let mut dat = vec![0u8; geom.frame_length];
        dat[6] = 0xfa;
        dat[7] = 0xaa;

        assert_eq!(geom.first_header_pointer(&dat), 0x2aa);
        dat[6] = 0xff;
        dat[7] = 0xff;
        assert_eq!(geom.first_header_pointer(&dat), FrameGeometry::NO_HEADER);
    }

    #[test]
    fn default_geometry_matches_config() {
        let geom = FrameConfig::default().geometry().unwrap();

        assert_eq!(geom, FrameGeometry::default());
        assert_eq!(geom.data_zone_start, 8);
        assert_eq!(geom.data_zone_length, 1101);
        assert_eq!(geom.data_zone_end, 1109);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: FrameConfig = serde_json::from_str(r#"{"frame_length": 2048}"#).unwrap();

        assert_eq!(config.frame_length, 2048);
        assert_eq!(config.trailer_length, 6);
        assert_eq!(config.idle_pointer, FrameGeometry::IDLE);
    }

    #[test]
    fn invalid_geometry() {
        assert!(matches!(FrameGeometry::new(14), Err(Error::Config(_))));
        assert!(FrameConfig::builder()
            .frame_length(100)
            .header_length(4)
            .build()
            .geometry()
            .is_err());
    }

    #[test]
    fn test_skipped_frames() {
        assert_eq!(skipped_frames(11, 15), 4);
        assert_eq!(skipped_frames(5, 5), 0);
        assert_eq!(skipped_frames(COUNTER_MODULUS - 1, 2), 3);
        assert_eq!(skipped_frames(COUNTER_MODULUS, 0), 0);
    }

    #[test]
    fn padding_frames() {
        assert!(is_padding(&[0u8; 20]));
        let mut dat = [0u8; 20];
        dat[7] = 1;
        assert!(!is_padding(&dat));
    }
}
