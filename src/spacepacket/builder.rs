use crate::codec;

use super::{Apid, PrimaryHeader, SECONDARY_HEADER_LEN, SEQ_UNSEGMENTED};

/// Write version 0, telemetry type, the secondary header flag, and `apid`.
pub fn write_apid(buf: &mut [u8], apid: Apid) {
    buf[0] = ((apid >> 8) & 0x7) as u8 | 0x08;
    buf[1] = (apid & 0xff) as u8;
}

/// Write `count` as the sequence count with the sequence flags set to unsegmented.
pub fn write_sequence_count(buf: &mut [u8], count: u16) {
    codec::put_u12(
        buf,
        2,
        (u16::from(SEQ_UNSEGMENTED) << 14) | (count & PrimaryHeader::SEQ_MAX),
    );
}

/// Most user data a packet with a Time42 secondary header can carry.
pub const MAX_USER_DATA_LEN: usize = 65536 - SECONDARY_HEADER_LEN;

/// Write the length field for a packet carrying a Time42 secondary header followed by
/// `user_len` bytes of user data.
///
/// # Panics
/// If `user_len` is greater than [MAX_USER_DATA_LEN].
pub fn write_data_length(buf: &mut [u8], user_len: usize) {
    write_length_field(buf, user_len + SECONDARY_HEADER_LEN);
}

fn write_length_field(buf: &mut [u8], data_len: usize) {
    // the field holds the length after the primary header, minus 1
    let Ok(field) = u16::try_from(data_len - 1) else {
        panic!("{data_len} bytes after the primary header do not fit the length field");
    };
    codec::put_u12(buf, 4, field);
}

pub fn write_timestamp(buf: &mut [u8], time42: u64) {
    codec::put_u123456(buf, PrimaryHeader::LEN, time42);
}

/// Builds packet bytes in the Time42 packet profile.
///
/// # Example
/// ```
/// use ccsds_telemetry::spacepacket::{PacketBuilder, apid, sequence_count, time42};
///
/// let dat = PacketBuilder::new(42)
///     .sequence_count(7)
///     .time42(0x1234_5678_0001)
///     .user_data(&[1, 2, 3])
///     .build();
///
/// assert_eq!(dat.len(), 15);
/// assert_eq!(apid(&dat), 42);
/// assert_eq!(sequence_count(&dat), 7);
/// assert_eq!(time42(&dat), 0x1234_5678_0001);
/// ```
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    apid: Apid,
    sequence_count: u16,
    time42: Option<u64>,
    user_data: Vec<u8>,
}

impl PacketBuilder {
    #[must_use]
    pub fn new(apid: Apid) -> Self {
        Self {
            apid,
            sequence_count: 0,
            time42: Some(0),
            user_data: Vec::default(),
        }
    }

    #[must_use]
    pub fn sequence_count(mut self, count: u16) -> Self {
        self.sequence_count = count;
        self
    }

    #[must_use]
    pub fn time42(mut self, time42: u64) -> Self {
        self.time42 = Some(time42);
        self
    }

    /// Build a packet with no secondary header.
    #[must_use]
    pub fn without_secondary_header(mut self) -> Self {
        self.time42 = None;
        self
    }

    #[must_use]
    pub fn user_data(mut self, dat: &[u8]) -> Self {
        self.user_data = dat.to_vec();
        self
    }

    /// Produce the packet bytes.
    ///
    /// A packet must have at least 1 data byte after the primary header, so a packet
    /// with neither a secondary header nor user data gets a single zero byte.
    ///
    /// # Panics
    /// If the user data is longer than the length field can describe, i.e., more than
    /// [MAX_USER_DATA_LEN] bytes, or 65536 without a secondary header.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        write_apid(&mut buf, self.apid);
        write_sequence_count(&mut buf, self.sequence_count);
        match self.time42 {
            Some(time42) => {
                buf.resize(PrimaryHeader::LEN + SECONDARY_HEADER_LEN, 0);
                write_data_length(&mut buf, self.user_data.len());
                write_timestamp(&mut buf, time42);
                buf.extend_from_slice(&self.user_data);
            }
            None => {
                buf[0] &= !0x08;
                let mut user_data = self.user_data;
                if user_data.is_empty() {
                    user_data.push(0);
                }
                write_length_field(&mut buf, user_data.len());
                buf.extend_from_slice(&user_data);
            }
        }
        buf
    }
}
