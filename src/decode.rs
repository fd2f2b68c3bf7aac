//! Point extraction and engineering unit conversion.
//!
//! A point's raw value is read from the packet according to its [FieldType], then its
//! conversion turns that into an [EngineeringValue]. Failures are per point; decoding
//! a packet never stops at the first bad point.
use std::fmt::Display;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, trace};

use crate::codec;
use crate::dictionary::{FieldType, PacketInfo, PointInfo, ReturnedKind, TelemetryDictionary};
use crate::prelude::*;
use crate::spacepacket::Packet;

/// Raw value of a point, before conversion.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl RawValue {
    /// Numeric value as `f64`, or `None` for strings and bytes.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        Some(match self {
            RawValue::I8(v) => f64::from(*v),
            RawValue::I16(v) => f64::from(*v),
            RawValue::I32(v) => f64::from(*v),
            RawValue::I64(v) => *v as f64,
            RawValue::U8(v) => f64::from(*v),
            RawValue::U16(v) => f64::from(*v),
            RawValue::U32(v) => f64::from(*v),
            RawValue::U64(v) => *v as f64,
            RawValue::F32(v) => f64::from(*v),
            RawValue::F64(v) => *v,
            RawValue::String(_) | RawValue::Bytes(_) => return None,
        })
    }

    /// Numeric value as `i64`, or `None` for strings and bytes. Floats are truncated
    /// and `u64` values above `i64::MAX` wrap.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        Some(match self {
            RawValue::I8(v) => i64::from(*v),
            RawValue::I16(v) => i64::from(*v),
            RawValue::I32(v) => i64::from(*v),
            RawValue::I64(v) => *v,
            RawValue::U8(v) => i64::from(*v),
            RawValue::U16(v) => i64::from(*v),
            RawValue::U32(v) => i64::from(*v),
            RawValue::U64(v) => *v as i64,
            RawValue::F32(v) => *v as i64,
            RawValue::F64(v) => *v as i64,
            RawValue::String(_) | RawValue::Bytes(_) => return None,
        })
    }
}

impl Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::I8(v) => write!(f, "{v}"),
            RawValue::I16(v) => write!(f, "{v}"),
            RawValue::I32(v) => write!(f, "{v}"),
            RawValue::I64(v) => write!(f, "{v}"),
            RawValue::U8(v) => write!(f, "{v}"),
            RawValue::U16(v) => write!(f, "{v}"),
            RawValue::U32(v) => write!(f, "{v}"),
            RawValue::U64(v) => write!(f, "{v}"),
            RawValue::F32(v) => write!(f, "{v}"),
            RawValue::F64(v) => write!(f, "{v}"),
            RawValue::String(v) => write!(f, "{v}"),
            RawValue::Bytes(v) => write!(f, "[{} bytes]", v.len()),
        }
    }
}

/// Converted value of a point.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EngineeringValue {
    Number(f64),
    Enum(String),
    String(String),
    Image(RawValue),
    Spectrum(RawValue),
    Raw(RawValue),
}

impl EngineeringValue {
    #[must_use]
    pub fn kind(&self) -> ReturnedKind {
        match self {
            EngineeringValue::Number(_) => ReturnedKind::Number,
            EngineeringValue::Enum(_) => ReturnedKind::Enum,
            EngineeringValue::String(_) => ReturnedKind::String,
            EngineeringValue::Image(_) => ReturnedKind::Image,
            EngineeringValue::Spectrum(_) => ReturnedKind::Spectrum,
            EngineeringValue::Raw(_) => ReturnedKind::Raw,
        }
    }
}

impl Display for EngineeringValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineeringValue::Number(v) => write!(f, "{v}"),
            EngineeringValue::Enum(v) | EngineeringValue::String(v) => write!(f, "{v}"),
            EngineeringValue::Image(v) | EngineeringValue::Spectrum(v) | EngineeringValue::Raw(v) => {
                write!(f, "{v}")
            }
        }
    }
}

fn check_len(packet: &[u8], offset: usize, width: usize) -> Result<()> {
    let minimum = offset + width;
    if packet.len() < minimum {
        return Err(Error::NotEnoughData {
            actual: packet.len(),
            minimum,
        });
    }
    Ok(())
}

/// Read the raw value of `point` from `packet`, the complete packet bytes including
/// its primary header.
///
/// `Pseudo` points read nothing and produce a constant 0; `FullPacketConversion`
/// points produce the whole packet.
///
/// # Errors
/// [Error::NotEnoughData] if the field extends past the end of the packet, or
/// [Error::InvalidBitRange] if a bit field's range does not fit its container.
pub fn get_raw_value(packet: &[u8], point: &PointInfo) -> Result<RawValue> {
    let off = point.byte_offset;
    let width = point.field_type.width(point.byte_size);
    // neither reads at an offset
    if !matches!(point.field_type, FieldType::Pseudo | FieldType::FullPacketConversion) {
        check_len(packet, off, width)?;
    }
    let (start, stop) = (point.bit_start, point.bit_stop);

    let raw = match point.field_type {
        FieldType::F1234 => RawValue::F32(codec::f1234(packet, off)),
        FieldType::F12345678 => RawValue::F64(codec::f12345678(packet, off)),
        FieldType::F87654321 => RawValue::F64(codec::f87654321(packet, off)),
        FieldType::I1 => RawValue::I8(codec::i1(packet, off)),
        FieldType::I12 => RawValue::I16(codec::i12(packet, off)),
        FieldType::I1234 => RawValue::I32(codec::i1234(packet, off)),
        FieldType::I12345678 => RawValue::I64(codec::i12345678(packet, off)),
        FieldType::S1 => {
            let field = &packet[off..off + width];
            let end = field.iter().position(|b| *b == 0).unwrap_or(width);
            RawValue::String(String::from_utf8_lossy(&field[..end]).into_owned())
        }
        FieldType::Time40 => RawValue::U32(codec::u1234(packet, off)),
        FieldType::Time42 => RawValue::U64(codec::u123456(packet, off)),
        FieldType::Time44 => RawValue::U64(codec::u12345678(packet, off)),
        FieldType::U1 => RawValue::U8(codec::u1(packet, off)),
        FieldType::U12 => RawValue::U16(codec::u12(packet, off)),
        FieldType::U1234 => RawValue::U32(codec::u1234(packet, off)),
        FieldType::U12345678 => RawValue::U64(codec::u12345678(packet, off)),
        FieldType::U21 => RawValue::U16(codec::u21(packet, off)),
        FieldType::U4321 => RawValue::U32(codec::u4321(packet, off)),
        FieldType::U1b => {
            RawValue::U8(codec::bits(u32::from(codec::u1(packet, off)), 8, start, stop)? as u8)
        }
        FieldType::U12b => {
            RawValue::U16(codec::bits(u32::from(codec::u12(packet, off)), 16, start, stop)? as u16)
        }
        FieldType::U1234b => RawValue::U32(codec::bits(codec::u1234(packet, off), 32, start, stop)?),
        FieldType::U4321b => RawValue::U32(codec::bits(codec::u4321(packet, off), 32, start, stop)?),
        FieldType::I12b => RawValue::I16(codec::signed_bits(
            u32::from(codec::u12(packet, off)),
            16,
            start,
            stop,
        )? as i16),
        FieldType::I1234b => {
            RawValue::I32(codec::signed_bits(codec::u1234(packet, off), 32, start, stop)?)
        }
        FieldType::Pseudo => RawValue::I32(0),
        FieldType::FullPacketConversion => RawValue::Bytes(packet.to_vec()),
    };
    Ok(raw)
}

/// Raw value of `point` in `packet`, converted by the point's conversion.
///
/// # Errors
/// Any error from [get_raw_value] or from applying the conversion.
pub fn get_value(packet: &[u8], point: &PointInfo) -> Result<EngineeringValue> {
    let raw = get_raw_value(packet, point)?;
    point.conversion().apply(&raw)
}

/// The decoded value of one point of a packet.
#[derive(Debug)]
pub struct DecodedPoint<'d> {
    pub point: &'d PointInfo,
    pub value: Result<EngineeringValue>,
}

/// Decode every point of `info` from `packet`.
///
/// Points are decoded independently, so one failed point leaves the rest intact.
#[must_use]
pub fn decode_packet<'d>(packet: &[u8], info: &'d PacketInfo) -> Vec<DecodedPoint<'d>> {
    info.points
        .iter()
        .map(|point| {
            let value = get_value(packet, point);
            if let Err(ref err) = value {
                trace!(point = %point.id, %err, "point decode failed");
            }
            DecodedPoint { point, value }
        })
        .collect()
}

/// Decode a single point, looked up by its dotted id.
///
/// `None` if `id` is not in the dictionary, else the result of [get_value].
#[must_use]
pub fn decode_point(
    dict: &TelemetryDictionary,
    packet: &[u8],
    id: &str,
) -> Option<Result<EngineeringValue>> {
    let point = dict.get_point(id)?;
    Some(get_value(packet, point))
}

/// Decode a batch of packets in parallel, returning the decoded points of each packet
/// in input order.
///
/// Packets with an APID that is not in the dictionary decode to no points.
#[must_use]
pub fn decode_packets<'d>(
    packets: &[Packet],
    dict: &'d TelemetryDictionary,
) -> Vec<Vec<DecodedPoint<'d>>> {
    packets
        .par_iter()
        .map(|packet| match dict.get_packet(packet.header.apid) {
            Some(info) => decode_packet(&packet.data, info),
            None => {
                debug!(apid = packet.header.apid, "no packet definition");
                Vec::new()
            }
        })
        .collect()
}
