// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{decode_error, Result};
use cantus_core::io::{BitReaderLtr, ReadBitsLtr};

use crate::common::{ChannelMode, FrameHeader};

use super::bands::BAND_PARTITIONS;
use super::{BlockType, FrameData, GranuleChannel, MAX_REGIONS};

/// MPEG1 scale factor lengths `(slen1, slen2)`, indexed by `scalefac_compress`.
const SLEN_MPEG1: [(u32, u32); 16] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (3, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 2),
    (4, 3),
];

/// MPEG1 long block scale factor groups. Each group may be shared by both granules of a frame.
const SCFSI_GROUPS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];

/// The number of MPEG2 scale factors in each of the four `slen` groups (ISO/IEC 13818-3 Table
/// B.8). Rows are selected by the `scalefac_compress` range, and the columns by long, short, and
/// mixed blocks. The last three rows apply to the intensity coded right channel.
#[rustfmt::skip]
const NSFB_MPEG2: [[[usize; 4]; 3]; 6] = [
    [[ 6,  5,  5, 5], [ 9,  9,  9, 9], [ 6,  9,  9, 9]],
    [[ 6,  5,  7, 3], [ 9,  9, 12, 6], [ 6,  9, 12, 6]],
    [[11, 10,  0, 0], [18, 18,  0, 0], [15, 18,  0, 0]],
    [[ 7,  7,  7, 0], [12, 12, 12, 0], [ 6, 15, 12, 0]],
    [[ 6,  6,  6, 3], [12,  9,  9, 6], [ 6, 12,  9, 6]],
    [[ 8,  8,  5, 0], [15, 12,  9, 0], [ 6, 18,  9, 0]],
];

fn read_channel_side_info(
    bs: &mut BitReaderLtr<'_>,
    header: &FrameHeader,
    channel: &mut GranuleChannel,
) -> Result<()> {
    let bands = &BAND_PARTITIONS[header.sample_rate_idx];

    channel.part2_3_length = bs.read_bits_leq32(12)?;
    channel.big_values = bs.read_bits_leq32(9)? as usize;

    // Two lines per big value.
    if channel.big_values > 288 {
        return decode_error("mp3: big_values exceeds the granule");
    }

    channel.global_gain = bs.read_bits_leq32(8)? as u8;
    channel.scalefac_compress = bs.read_bits_leq32(if header.is_mpeg1() { 4 } else { 9 })?;

    if bs.read_bit()? {
        let block_type = bs.read_bits_leq32(2)?;
        let is_mixed = bs.read_bit()?;

        channel.block_type = match block_type {
            0b01 => BlockType::Start,
            0b10 => BlockType::Short { is_mixed },
            0b11 => BlockType::End,
            _ => return decode_error("mp3: window switching with a normal block"),
        };

        for table in channel.table_select[..2].iter_mut() {
            *table = bs.read_bits_leq32(5)? as u8;
        }

        for gain in channel.subblock_gain.iter_mut() {
            *gain = bs.read_bits_leq32(3)? as u8;
        }

        // Region 0 implicitly spans 8 regions of the block's partition, or 9 short windows for a
        // short block. Region 1 covers the rest of the big values.
        let region0_count = match channel.block_type {
            BlockType::Short { is_mixed: false } => 9,
            _ => 8,
        };

        let (regions, _) = bands.regions(channel.block_type);

        channel.region1_start = regions[region0_count];
        channel.region2_start = 576;
    }
    else {
        channel.block_type = BlockType::Long;

        for table in channel.table_select.iter_mut() {
            *table = bs.read_bits_leq32(5)? as u8;
        }

        let region0_count = bs.read_bits_leq32(4)? as usize + 1;
        let region1_count = bs.read_bits_leq32(3)? as usize + 1;

        channel.region1_start = bands.long[region0_count];
        channel.region2_start = bands.long[(region0_count + region1_count).min(22)];
    }

    // MPEG2 derives preflag from scalefac_compress.
    if header.is_mpeg1() {
        channel.preflag = bs.read_bit()?;
    }

    channel.scalefac_scale = bs.read_bit()?;
    channel.count1table_b = bs.read_bit()?;

    Ok(())
}

/// Reads the side information of a frame.
pub(super) fn read_side_info(
    bs: &mut BitReaderLtr<'_>,
    header: &FrameHeader,
    frame: &mut FrameData,
) -> Result<()> {
    let n_channels = header.n_channels();

    if header.is_mpeg1() {
        frame.main_data_begin = bs.read_bits_leq32(9)? as usize;

        // Private bits.
        bs.ignore_bits(if header.channel_mode == ChannelMode::Mono { 5 } else { 3 })?;

        for scfsi in frame.scfsi[..n_channels].iter_mut() {
            for group in scfsi.iter_mut() {
                *group = bs.read_bit()?;
            }
        }
    }
    else {
        frame.main_data_begin = bs.read_bits_leq32(8)? as usize;

        bs.ignore_bits(if header.channel_mode == ChannelMode::Mono { 1 } else { 2 })?;
    }

    for granule in frame.granules[..header.n_granules()].iter_mut() {
        for channel in granule.channels[..n_channels].iter_mut() {
            read_channel_side_info(bs, header, channel)?;
        }
    }

    Ok(())
}

/// Reads `scalefacs.len()` scale factors of `slen` bits each. Zero length scale factors are not
/// transmitted and read as 0.
fn read_group(bs: &mut BitReaderLtr<'_>, scalefacs: &mut [u8], slen: u32) -> Result<()> {
    for sf in scalefacs.iter_mut() {
        *sf = if slen > 0 { bs.read_bits_leq32(slen)? as u8 } else { 0 };
    }
    Ok(())
}

/// Reads the scale factors of a channel of an MPEG1 granule. The groups flagged in `reused` keep
/// the values already present in the channel, copied from the first granule.
pub(super) fn read_scale_factors_mpeg1(
    bs: &mut BitReaderLtr<'_>,
    channel: &mut GranuleChannel,
    reused: [bool; 4],
) -> Result<()> {
    let (slen1, slen2) = SLEN_MPEG1[channel.scalefac_compress as usize];

    // Positions 0 to 6 are valid for every band.
    channel.is_limits = [7; MAX_REGIONS];

    match channel.block_type {
        BlockType::Short { is_mixed } => {
            // 8 long bands and short bands 3..6 of a mixed block, or short bands 0..6, are slen1
            // bits long. Short bands 6..12 are slen2 bits long. Band 12 is not transmitted.
            let split = if is_mixed { 8 + 3 * 3 } else { 6 * 3 };

            read_group(bs, &mut channel.scalefacs[..split], slen1)?;
            read_group(bs, &mut channel.scalefacs[split..split + 18], slen2)?;

            channel.scalefacs[split + 18..].fill(0);
        }
        _ => {
            for (&(start, end), (i, &reuse)) in SCFSI_GROUPS.iter().zip(reused.iter().enumerate()) {
                if !reuse {
                    let slen = if i < 2 { slen1 } else { slen2 };
                    read_group(bs, &mut channel.scalefacs[start..end], slen)?;
                }
            }

            channel.scalefacs[21..].fill(0);
        }
    }

    Ok(())
}

/// Reads the scale factors of a channel of an MPEG2 or MPEG2.5 granule. `intensity_channel` is
/// true for the right channel of an intensity stereo frame, where the scale factors are intensity
/// positions.
pub(super) fn read_scale_factors_mpeg2(
    bs: &mut BitReaderLtr<'_>,
    channel: &mut GranuleChannel,
    intensity_channel: bool,
) -> Result<()> {
    let column = match channel.block_type {
        BlockType::Short { is_mixed: false } => 1,
        BlockType::Short { is_mixed: true } => 2,
        _ => 0,
    };

    let (row, slen) = if intensity_channel {
        let sfc = channel.scalefac_compress >> 1;

        match sfc {
            0..=179 => (3, [sfc / 36, (sfc % 36) / 6, sfc % 6, 0]),
            180..=243 => {
                let sfc = sfc - 180;
                (4, [(sfc % 64) >> 4, (sfc % 16) >> 2, sfc % 4, 0])
            }
            _ => {
                let sfc = sfc - 244;
                (5, [sfc / 3, sfc % 3, 0, 0])
            }
        }
    }
    else {
        let sfc = channel.scalefac_compress;

        channel.preflag = sfc >= 500;

        match sfc {
            0..=399 => (0, [(sfc >> 4) / 5, (sfc >> 4) % 5, (sfc % 16) >> 2, sfc % 4]),
            400..=499 => {
                let sfc = sfc - 400;
                (1, [(sfc >> 2) / 5, (sfc >> 2) % 5, sfc % 4, 0])
            }
            _ => {
                let sfc = sfc - 500;
                (2, [sfc / 3, sfc % 3, 0, 0])
            }
        }
    };

    channel.scalefacs = [0; MAX_REGIONS];
    channel.is_limits = [0; MAX_REGIONS];

    let mut start = 0;

    for (&n_sfb, &slen) in NSFB_MPEG2[row][column].iter().zip(&slen) {
        let end = start + n_sfb;

        read_group(bs, &mut channel.scalefacs[start..end], slen)?;

        // The largest position a scale factor can hold is illegal.
        channel.is_limits[start..end].fill(((1u32 << slen) - 1) as u8);

        start = end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;

    /// Appends `value` to `bits` as `width` binary digits.
    fn push(bits: &mut String, value: u32, width: usize) {
        bits.push_str(&format!("{:0width$b}", value, width = width));
    }

    fn pack(bits: &str) -> Vec<u8> {
        let mut bytes = vec![0u8; (bits.len() + 7) / 8];

        for (i, c) in bits.chars().enumerate() {
            if c == '1' {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }

        bytes
    }

    #[test]
    fn verify_mpeg1_mono_side_info() {
        // MPEG1 layer 3, 128 kbit/s, 44.1 kHz, mono.
        let header = parse_frame_header(0xfffb_90c0).unwrap();

        let mut bits = String::new();

        push(&mut bits, 300, 9); // main_data_begin
        push(&mut bits, 0, 5); // private
        push(&mut bits, 0b0101, 4); // scfsi

        // Granule 0: long block.
        push(&mut bits, 1000, 12);
        push(&mut bits, 100, 9);
        push(&mut bits, 180, 8);
        push(&mut bits, 5, 4);
        push(&mut bits, 0, 1);
        push(&mut bits, 15, 5);
        push(&mut bits, 16, 5);
        push(&mut bits, 24, 5);
        push(&mut bits, 7, 4); // region0_count
        push(&mut bits, 2, 3); // region1_count
        push(&mut bits, 0b101, 3);

        // Granule 1: short block.
        push(&mut bits, 500, 12);
        push(&mut bits, 20, 9);
        push(&mut bits, 150, 8);
        push(&mut bits, 9, 4);
        push(&mut bits, 1, 1);
        push(&mut bits, 0b10, 2);
        push(&mut bits, 0, 1);
        push(&mut bits, 1, 5);
        push(&mut bits, 2, 5);
        push(&mut bits, 1, 3);
        push(&mut bits, 2, 3);
        push(&mut bits, 3, 3);
        push(&mut bits, 0b010, 3);

        assert_eq!(bits.len(), 8 * header.side_info_len());

        let buf = pack(&bits);
        let mut bs = BitReaderLtr::new(&buf);
        let mut frame = FrameData::default();

        read_side_info(&mut bs, &header, &mut frame).unwrap();

        assert_eq!(frame.main_data_begin, 300);
        assert_eq!(frame.scfsi[0], [false, true, false, true]);

        let ch = &frame.granules[0].channels[0];
        assert_eq!(ch.part2_3_length, 1000);
        assert_eq!(ch.big_values, 100);
        assert_eq!(ch.global_gain, 180);
        assert_eq!(ch.block_type, BlockType::Long);
        assert_eq!(ch.table_select, [15, 16, 24]);
        assert_eq!(ch.region1_start, 36);
        assert_eq!(ch.region2_start, 62);
        assert!(ch.preflag);
        assert!(!ch.scalefac_scale);
        assert!(ch.count1table_b);

        let ch = &frame.granules[1].channels[0];
        assert_eq!(ch.block_type, BlockType::Short { is_mixed: false });
        assert_eq!(ch.table_select[..2], [1, 2]);
        assert_eq!(ch.subblock_gain, [1, 2, 3]);
        assert_eq!(ch.region1_start, 36);
        assert_eq!(ch.region2_start, 576);
        assert!(!ch.preflag);
        assert!(ch.scalefac_scale);
    }

    #[test]
    fn verify_big_values_limit() {
        let header = parse_frame_header(0xfffb_90c0).unwrap();

        let mut bits = String::new();
        push(&mut bits, 0, 18);
        push(&mut bits, 0, 12);
        push(&mut bits, 289, 9);
        bits.push_str(&"0".repeat(8 * 17 - bits.len()));

        let buf = pack(&bits);
        let mut bs = BitReaderLtr::new(&buf);

        assert!(read_side_info(&mut bs, &header, &mut FrameData::default()).is_err());
    }

    #[test]
    fn verify_mpeg1_scale_factors() {
        // slen1 = 2, slen2 = 3.
        let mut channel = GranuleChannel { scalefac_compress: 10, ..Default::default() };

        channel.scalefacs[6..11].copy_from_slice(&[9, 9, 9, 9, 9]);

        let mut bits = String::new();
        for sf in 0..6 {
            push(&mut bits, sf % 4, 2);
        }
        for sf in 0..10 {
            push(&mut bits, sf % 8, 3);
        }

        let buf = pack(&bits);
        let mut bs = BitReaderLtr::new(&buf);

        read_scale_factors_mpeg1(&mut bs, &mut channel, [false, true, false, false]).unwrap();

        assert_eq!(&channel.scalefacs[..6], &[0, 1, 2, 3, 0, 1]);
        assert_eq!(&channel.scalefacs[6..11], &[9; 5]);
        assert_eq!(&channel.scalefacs[11..21], &[0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
        assert_eq!(channel.is_limits[0], 7);
    }

    #[test]
    fn verify_mpeg2_intensity_limits() {
        // scalefac_compress >> 1 = 37: slen = [1, 0, 1, 0] for a long block.
        let mut channel = GranuleChannel { scalefac_compress: 75, ..Default::default() };

        let mut bits = String::new();
        push(&mut bits, 0b1111111, 7);
        push(&mut bits, 0b0000000, 7);

        let buf = pack(&bits);
        let mut bs = BitReaderLtr::new(&buf);

        read_scale_factors_mpeg2(&mut bs, &mut channel, true).unwrap();

        assert_eq!(&channel.scalefacs[..7], &[1; 7]);
        assert_eq!(&channel.scalefacs[7..21], &[0; 14]);
        assert_eq!(channel.is_limits[0], 1);
        assert_eq!(channel.is_limits[7], 0);
        assert_eq!(channel.is_limits[14], 1);
        assert!(!channel.preflag);
    }
}
