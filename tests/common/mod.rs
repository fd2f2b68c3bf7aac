#![allow(dead_code)]

use ccsds_telemetry::framing::{FrameGeometry, Vcid};
use ccsds_telemetry::spacepacket::PacketBuilder;

pub const SCID: u16 = 157;
pub const IDLE_APID: u16 = 0x7ff;

/// Packet with a Time42 secondary header and a total length of `total_len` bytes.
pub fn packet(apid: u16, seq: u16, total_len: usize) -> Vec<u8> {
    assert!(total_len > 12, "packet must have user data");
    let user: Vec<u8> = (0..total_len - 12).map(|i| (i % 251) as u8).collect();
    PacketBuilder::new(apid)
        .sequence_count(seq)
        .time42(u64::from(seq) << 16)
        .user_data(&user)
        .build()
}

/// Idle packet of `total_len` bytes, used to fill out the last data zone.
pub fn idle(total_len: usize) -> Vec<u8> {
    PacketBuilder::new(IDLE_APID)
        .without_secondary_header()
        .user_data(&vec![0x55; total_len - 6])
        .build()
}

pub fn frame(geom: &FrameGeometry, vcid: Vcid, counter: u32, fhp: u16, zone: &[u8]) -> Vec<u8> {
    assert_eq!(zone.len(), geom.data_zone_length);
    let mut dat = vec![0u8; geom.frame_length];
    let id = (SCID << 6) | (vcid & 0x3f) | 0x4000;
    dat[0..2].copy_from_slice(&id.to_be_bytes());
    dat[2..5].copy_from_slice(&counter.to_be_bytes()[1..]);
    dat[geom.header_length..geom.header_length + 2].copy_from_slice(&fhp.to_be_bytes());
    dat[geom.data_zone_start..geom.data_zone_end].copy_from_slice(zone);
    dat
}

/// Lay `packets` end to end into the frames of one virtual channel, with counters
/// starting at `first_counter`, and first header pointers set accordingly. The last
/// data zone is filled out with an idle packet.
pub fn frames(
    geom: &FrameGeometry,
    vcid: Vcid,
    first_counter: u32,
    packets: &[Vec<u8>],
) -> Vec<Vec<u8>> {
    let zone_len = geom.data_zone_length;
    let mut stream = Vec::new();
    let mut starts = Vec::new();
    for p in packets {
        starts.push(stream.len());
        stream.extend_from_slice(p);
    }
    let mut fill = (zone_len - stream.len() % zone_len) % zone_len;
    if fill != 0 && fill < 7 {
        fill += zone_len;
    }
    if fill != 0 {
        starts.push(stream.len());
        stream.extend_from_slice(&idle(fill));
    }

    stream
        .chunks(zone_len)
        .enumerate()
        .map(|(idx, zone)| {
            let zone_start = idx * zone_len;
            let fhp = starts
                .iter()
                .find(|s| **s >= zone_start && **s < zone_start + zone_len)
                .map_or(FrameGeometry::NO_HEADER, |s| (s - zone_start) as u16);
            let counter = (first_counter + idx as u32) % (1 << 24);
            frame(geom, vcid, counter, fhp, zone)
        })
        .collect()
}

/// Frame whose first header pointer marks it as idle.
pub fn idle_frame(geom: &FrameGeometry, vcid: Vcid, counter: u32) -> Vec<u8> {
    frame(
        geom,
        vcid,
        counter,
        geom.idle_pointer,
        &vec![0xaa; geom.data_zone_length],
    )
}

/// Wrap frames in 4 byte sync markers as they would be in a frame file.
pub fn with_sync_markers(frames: &[Vec<u8>]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|f| [0x1a, 0xcf, 0xfc, 0x1d].into_iter().chain(f.iter().copied()))
        .collect()
}

pub fn set_counter(frame: &mut [u8], counter: u32) {
    frame[2..5].copy_from_slice(&counter.to_be_bytes()[1..]);
}

/// Packets other than idle fill.
pub fn without_idle<I>(packets: I) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = ccsds_telemetry::framing::DecodedPacket>,
{
    packets
        .into_iter()
        .filter(|p| p.packet.header.apid != IDLE_APID)
        .map(|p| {
            assert!(p.valid, "invalid packet {}", p.packet);
            p.packet.data
        })
        .collect()
}
