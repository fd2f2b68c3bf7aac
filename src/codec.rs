//! Bit and byte level field access over raw telemetry buffers.
//!
//! Functions are named for the byte order they read, using the mission dictionary
//! convention where `12` / `1234` / `12345678` is big-endian (most significant byte
//! first) and `21` / `4321` / `87654321` is the reversed order.
//!
//! None of the readers or writers check bounds; the caller guarantees that
//! `offset + width` fits within the buffer, otherwise they panic on the slice index.
use crate::prelude::*;

/// Mask for the `n` least significant bits.
#[inline]
#[must_use]
pub const fn mask(n: u32) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1u32 << n) - 1
    }
}

#[inline]
#[must_use]
pub fn u1(buf: &[u8], offset: usize) -> u8 {
    buf[offset]
}

#[inline]
#[must_use]
pub fn i1(buf: &[u8], offset: usize) -> i8 {
    buf[offset] as i8
}

#[inline]
#[must_use]
pub fn u12(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
#[must_use]
pub fn u21(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
#[must_use]
pub fn i12(buf: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
#[must_use]
pub fn u1234(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[inline]
#[must_use]
pub fn u4321(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[inline]
#[must_use]
pub fn i1234(buf: &[u8], offset: usize) -> i32 {
    u1234(buf, offset) as i32
}

/// 24-bit big-endian unsigned, e.g., a VCDU frame counter.
#[inline]
#[must_use]
pub fn u123(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([0, buf[offset], buf[offset + 1], buf[offset + 2]])
}

/// 48-bit big-endian unsigned, e.g., a Time42 timestamp.
#[inline]
#[must_use]
pub fn u123456(buf: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes([
        0,
        0,
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
        buf[offset + 5],
    ])
}

#[inline]
#[must_use]
pub fn u12345678(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(b)
}

#[inline]
#[must_use]
pub fn u87654321(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

#[inline]
#[must_use]
pub fn i12345678(buf: &[u8], offset: usize) -> i64 {
    u12345678(buf, offset) as i64
}

/// IEEE-754 single stored most significant byte first.
///
/// The value is rebuilt from its bit pattern rather than by numeric cast, so NaN
/// payloads and signed zeros survive.
#[inline]
#[must_use]
pub fn f1234(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(u1234(buf, offset))
}

/// IEEE-754 double stored most significant byte first.
#[inline]
#[must_use]
pub fn f12345678(buf: &[u8], offset: usize) -> f64 {
    f64::from_bits(u12345678(buf, offset))
}

/// IEEE-754 double stored least significant byte first.
#[inline]
#[must_use]
pub fn f87654321(buf: &[u8], offset: usize) -> f64 {
    f64::from_bits(u87654321(buf, offset))
}

/// Extract bits `start..=stop` from a `width` bit container, where bit 0 is the most
/// significant bit of the container.
///
/// # Errors
/// [Error::InvalidBitRange] if `start > stop`, `stop >= width`, or `width > 32`.
pub fn bits(container: u32, width: u16, start: u16, stop: u16) -> Result<u32> {
    if width == 0 || width > 32 || start > stop || stop >= width {
        return Err(Error::InvalidBitRange { start, stop, width });
    }
    let len = u32::from(stop - start + 1);
    let shift = u32::from(width - 1 - stop);
    Ok((container >> shift) & mask(len))
}

/// Same as [bits], but treats the most significant bit of the extracted field as a
/// two's-complement sign bit.
///
/// # Errors
/// See [bits].
pub fn signed_bits(container: u32, width: u16, start: u16, stop: u16) -> Result<i32> {
    let value = bits(container, width, start, stop)?;
    Ok(sign_extend(value, u32::from(stop - start + 1)))
}

/// Sign extend the `len` least significant bits of `value`.
#[inline]
#[must_use]
pub fn sign_extend(value: u32, len: u32) -> i32 {
    if len == 0 || len >= 32 {
        return value as i32;
    }
    let shift = 32 - len;
    ((value << shift) as i32) >> shift
}

pub fn put_u12(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn put_u21(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u1234(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn put_u4321(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_i1234(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Write the low 48 bits of `value` most significant byte first.
pub fn put_u123456(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 6].copy_from_slice(&value.to_be_bytes()[2..]);
}

pub fn put_u12345678(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

pub fn put_f1234(buf: &mut [u8], offset: usize, value: f32) {
    put_u1234(buf, offset, value.to_bits());
}

pub fn put_f12345678(buf: &mut [u8], offset: usize, value: f64) {
    put_u12345678(buf, offset, value.to_bits());
}
