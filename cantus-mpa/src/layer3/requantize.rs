// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{huffman_error, Result};
use cantus_core::io::{BitReaderLtr, FiniteBitStream, ReadBitsLtr};

use lazy_static::lazy_static;

use super::bands::BandPartition;
use super::codebooks::{CODEBOOK, CODEBOOK_INFO, COUNT1_TABLE_A, COUNT1_TABLE_B};
use super::GranuleChannel;

/// The largest magnitude a big value can have: 15 plus 13 linbits.
const MAX_MAGNITUDE: usize = 15 + (1 << 13) - 1;

/// Pre-emphasis added to the long block scale factors when `preflag` is set (ISO/IEC 11172-3
/// Table B.6).
const PRETAB: [u8; 22] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0];

lazy_static! {
    /// `POW43[n] = n^(4/3)`.
    static ref POW43: Vec<f32> =
        (0..=MAX_MAGNITUDE).map(|n| (n as f64).powf(4.0 / 3.0) as f32).collect();
}

/// Decodes one big value pair with the codebook rooted at `offset`.
#[inline]
fn read_pair(bs: &mut BitReaderLtr<'_>, offset: usize) -> Result<(usize, usize)> {
    let mut width = 5;
    let mut index = offset + bs.peek_bits_leq32(width) as usize;

    loop {
        let leaf = match CODEBOOK.get(index) {
            Some(&leaf) => leaf,
            None => return huffman_error("codebook lookup out-of-range"),
        };

        if leaf >= 0 {
            bs.ignore_bits(u32::from(leaf as u16 >> 8))?;
            return Ok((usize::from(leaf as u16 & 0xf), usize::from((leaf as u16 >> 4) & 0xf)));
        }

        bs.ignore_bits(width)?;

        width = (leaf & 7) as u32;
        index = offset + bs.peek_bits_leq32(width) as usize + (-(leaf >> 3)) as usize;
    }
}

/// Decodes one count1 quadruple. Returns flags for v, w, x, and y in bits 3, 2, 1, and 0.
#[inline]
fn read_quad(bs: &mut BitReaderLtr<'_>, table: &[u8]) -> Result<u8> {
    let mut leaf = table[bs.peek_bits_leq32(4) as usize];

    if leaf & 8 == 0 {
        let width = u32::from(leaf & 3);
        let sub = bs.peek_bits_leq32(4 + width) & ((1 << width) - 1);

        leaf = match table.get(usize::from(leaf >> 3) + sub as usize) {
            Some(&leaf) => leaf,
            None => return huffman_error("count1 lookup out-of-range"),
        };
    }

    bs.ignore_bits(u32::from(leaf & 7))?;

    Ok(leaf >> 4)
}

#[inline(always)]
fn signed(bs: &mut BitReaderLtr<'_>, magnitude: f32) -> Result<f32> {
    Ok(if bs.read_bit()? { -magnitude } else { magnitude })
}

/// Reads the Huffman coded part3 of a channel into `samples` as signed `|s|^(4/3)` values, and
/// sets the channel's `rzero`.
///
/// If part3 can't be decoded, the lines decoded before the error are kept and the remainder of
/// the channel is 0.
pub(super) fn read_huffman_samples(
    bs: &mut BitReaderLtr<'_>,
    channel: &mut GranuleChannel,
    part3_bits: u32,
    samples: &mut [f32; 576],
) -> Result<()> {
    samples.fill(0.0);

    let mut decoded = 0;
    let result = read_lines(bs, channel, part3_bits, samples, &mut decoded);

    if result.is_err() {
        samples[decoded..].fill(0.0);
    }

    channel.rzero = decoded;

    result
}

/// Decodes the big values and count1 partitions. `decoded` follows the end of the last whole
/// pair or quadruple decoded.
fn read_lines(
    bs: &mut BitReaderLtr<'_>,
    channel: &GranuleChannel,
    part3_bits: u32,
    samples: &mut [f32; 576],
    decoded: &mut usize,
) -> Result<()> {
    if part3_bits == 0 {
        return Ok(());
    }

    let pow43: &[f32] = &POW43;

    let start_bits = bs.bits_left();
    let bits_read = |bs: &BitReaderLtr<'_>| start_bits - bs.bits_left();
    let part3_bits = u64::from(part3_bits);

    let big_values_end = 2 * channel.big_values;

    let region_ends = [
        channel.region1_start.min(big_values_end),
        channel.region2_start.min(big_values_end),
        big_values_end,
    ];

    let mut i = 0;

    for (&end, &table) in region_ends.iter().zip(&channel.table_select) {
        if i >= end {
            continue;
        }

        let info = CODEBOOK_INFO[usize::from(table)];

        let offset = match info.offset {
            // Table 0 codes every pair as zero, using no bits.
            Some(_) if table == 0 => {
                i = end;
                *decoded = i;
                continue;
            }
            Some(offset) => offset,
            None => return huffman_error("invalid big values table"),
        };

        while i < end {
            let (x, y) = read_pair(bs, offset)?;

            for (j, mut value) in [(i, x), (i + 1, y)] {
                if value == 0 {
                    continue;
                }

                if value == 15 && info.linbits > 0 {
                    value += bs.read_bits_leq32(info.linbits)? as usize;
                }

                samples[j] = signed(bs, pow43[value])?;
            }

            i += 2;
            *decoded = i;
        }

        if bits_read(bs) > part3_bits {
            return huffman_error("big values overrun part3");
        }
    }

    let table: &[u8] = if channel.count1table_b { &COUNT1_TABLE_B } else { &COUNT1_TABLE_A };

    while i + 4 <= 576 && bits_read(bs) < part3_bits {
        let flags = read_quad(bs, table)?;

        for (j, bit) in (i..i + 4).zip([8, 4, 2, 1]) {
            if flags & bit != 0 {
                samples[j] = signed(bs, 1.0)?;
            }
        }

        i += 4;
        *decoded = i;
    }

    // Encoders that pad part3 poorly leave the last quadruple decoding stuffing bits. It is not
    // a real quadruple.
    if bits_read(bs) > part3_bits {
        i -= 4;
        samples[i..i + 4].fill(0.0);
        *decoded = i;
    }

    Ok(())
}

/// Scales the decoded samples of a channel by the global gain and the scale factors of each
/// region, as `s * 2^(0.25 * (global_gain - 210 - 8 * subblock_gain - 4 * B))` with `B` the
/// region's scale factor (plus pre-emphasis) multiplied by 0.5 or 1.0.
pub(super) fn requantize(
    bands: &BandPartition,
    channel: &GranuleChannel,
    samples: &mut [f32; 576],
) {
    let (regions, switch) = bands.regions(channel.block_type);

    let shift = if channel.scalefac_scale { 2 } else { 1 };
    let global = i32::from(channel.global_gain) - 210;

    for (k, region) in regions.windows(2).enumerate() {
        let (start, end) = (region[0], region[1]);

        if start >= channel.rzero {
            break;
        }

        let exponent = if k < switch {
            let pre = if channel.preflag { PRETAB[k] } else { 0 };
            global - (i32::from(channel.scalefacs[k] + pre) << shift)
        }
        else {
            let win = (k - switch) % 3;
            global
                - 8 * i32::from(channel.subblock_gain[win])
                - (i32::from(channel.scalefacs[k]) << shift)
        };

        let scale = (0.25 * exponent as f32).exp2();

        for sample in &mut samples[start..end.min(channel.rzero)] {
            *sample *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer3::bands::BAND_PARTITIONS;
    use cantus_core::errors::Error;
    use crate::layer3::BlockType;

    /// Packs a string of '0' and '1' characters into bytes.
    fn pack(bits: &str) -> Vec<u8> {
        let mut bytes = vec![0u8; (bits.len() + 7) / 8 + 4];

        for (i, c) in bits.chars().enumerate() {
            if c == '1' {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }

        bytes
    }

    #[test]
    fn verify_table1_codes() {
        // Table 1: (0,0) = 1, (1,0) = 01, (0,1) = 001, (1,1) = 000.
        let offset = CODEBOOK_INFO[1].offset.unwrap();
        let buf = pack("1");
        let mut bs = BitReaderLtr::new(&buf);
        assert_eq!(read_pair(&mut bs, offset).unwrap(), (0, 0));

        let buf = pack("01001000");
        let mut bs = BitReaderLtr::new(&buf);
        assert_eq!(read_pair(&mut bs, offset).unwrap(), (1, 0));
        assert_eq!(read_pair(&mut bs, offset).unwrap(), (0, 1));
        assert_eq!(read_pair(&mut bs, offset).unwrap(), (1, 1));
        assert_eq!(bs.bits_left(), 8 * 5 - 8);
    }

    #[test]
    fn verify_count1_codes() {
        let buf = pack("1");
        let mut bs = BitReaderLtr::new(&buf);
        assert_eq!(read_quad(&mut bs, &COUNT1_TABLE_A).unwrap(), 0b0000);

        // Table A: 0101 is y, 00101 is x and y.
        let buf = pack("010100101");
        let mut bs = BitReaderLtr::new(&buf);
        assert_eq!(read_quad(&mut bs, &COUNT1_TABLE_A).unwrap(), 0b0001);
        assert_eq!(read_quad(&mut bs, &COUNT1_TABLE_A).unwrap(), 0b0011);

        // Table B codes are the inverted flags.
        let buf = pack("00001111");
        let mut bs = BitReaderLtr::new(&buf);
        assert_eq!(read_quad(&mut bs, &COUNT1_TABLE_B).unwrap(), 0b1111);
        assert_eq!(read_quad(&mut bs, &COUNT1_TABLE_B).unwrap(), 0b0000);
    }

    #[test]
    fn verify_read_huffman_samples() {
        let mut channel = GranuleChannel {
            big_values: 2,
            table_select: [1, 1, 1],
            region1_start: 576,
            region2_start: 576,
            ..Default::default()
        };

        // Pair (1,0) with a negative sign, pair (1,1) both positive, then a count1 quad with only
        // y set and negative.
        let bits = ["01", "1", "000", "0", "0", "0101", "1"].concat();
        let buf = pack(&bits);
        let mut bs = BitReaderLtr::new(&buf);

        let mut samples = [9f32; 576];
        read_huffman_samples(&mut bs, &mut channel, bits.len() as u32, &mut samples).unwrap();

        assert_eq!(channel.rzero, 8);
        assert_eq!(&samples[..8], &[-1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        assert!(samples[8..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_invalid_table_is_rejected() {
        let mut channel = GranuleChannel {
            big_values: 4,
            table_select: [4, 0, 0],
            region1_start: 576,
            region2_start: 576,
            ..Default::default()
        };

        let buf = [0xffu8; 8];
        let mut bs = BitReaderLtr::new(&buf);
        let mut samples = [0f32; 576];

        assert!(read_huffman_samples(&mut bs, &mut channel, 32, &mut samples).is_err());
        assert_eq!(channel.rzero, 0);
    }

    #[test]
    fn verify_lines_before_error_are_kept() {
        // Region 0 uses table 1, region 1 the unused table 4.
        let mut channel = GranuleChannel {
            big_values: 4,
            table_select: [1, 4, 0],
            region1_start: 4,
            region2_start: 576,
            ..Default::default()
        };

        // Pair (1,0) with a negative sign, then pair (1,1) both positive.
        let bits = ["01", "1", "000", "0", "0"].concat();
        let buf = pack(&[bits.as_str(), "11111111"].concat());
        let mut bs = BitReaderLtr::new(&buf);

        let mut samples = [9f32; 576];
        let err = read_huffman_samples(&mut bs, &mut channel, 64, &mut samples).unwrap_err();

        assert!(matches!(err, Error::HuffmanTableError(_)));
        assert_eq!(channel.rzero, 4);
        assert_eq!(&samples[..4], &[-1.0, 0.0, 1.0, 1.0]);
        assert!(samples[4..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_requantize_gain() {
        let bands = &BAND_PARTITIONS[0];

        let mut channel = GranuleChannel {
            global_gain: 210,
            block_type: BlockType::Long,
            rzero: 576,
            ..Default::default()
        };

        let mut samples = [1f32; 576];
        requantize(bands, &channel, &mut samples);
        assert!(samples.iter().all(|&s| s == 1.0));

        // A scale factor of 2 with a 0.5 multiplier halves the first band.
        channel.scalefacs[0] = 2;
        let mut samples = [1f32; 576];
        requantize(bands, &channel, &mut samples);
        assert_eq!(samples[0], 0.5);
        assert_eq!(samples[4], 1.0);

        // Subblock gain scales a short window by 2^-2 per step.
        let channel = GranuleChannel {
            global_gain: 210,
            block_type: BlockType::Short { is_mixed: false },
            subblock_gain: [0, 1, 0],
            rzero: 576,
            ..Default::default()
        };

        let mut samples = [1f32; 576];
        requantize(bands, &channel, &mut samples);
        assert_eq!(&samples[..4], &[1.0; 4]);
        assert_eq!(&samples[4..8], &[0.25; 4]);
        assert_eq!(&samples[8..12], &[1.0; 4]);
    }
}
