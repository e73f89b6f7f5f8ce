// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scale factor band partitions of a granule.
//!
//! Widths are listed per sample rate, ordered as `FrameHeader::sample_rate_idx`: 44.1, 48 and
//! 32 kHz (ISO/IEC 11172-3 Table B.8), 22.05, 24 and 16 kHz (ISO/IEC 13818-3 Table B.2), then
//! 11.025, 12 and 8 kHz (MPEG 2.5).

use lazy_static::lazy_static;

use super::BlockType;

/// The number of long scale factor bands.
const LONG_BANDS: usize = 22;

/// The number of short scale factor bands.
const SHORT_BANDS: usize = 13;

#[rustfmt::skip]
const LONG_WIDTHS: [[u16; LONG_BANDS]; 9] = [
    [ 4,  4,  4,  4,  4,  4,  6,  6,  8,  8, 10, 12, 16, 20, 24, 28, 34, 42, 50, 54,  76, 158],
    [ 4,  4,  4,  4,  4,  4,  6,  6,  6,  8, 10, 12, 16, 18, 22, 28, 34, 40, 46, 54,  54, 192],
    [ 4,  4,  4,  4,  4,  4,  6,  6,  8, 10, 12, 16, 20, 24, 30, 38, 46, 56, 68, 84, 102,  26],
    [ 6,  6,  6,  6,  6,  6,  8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68,  58,  54],
    [ 6,  6,  6,  6,  6,  6,  8, 10, 12, 14, 16, 18, 22, 26, 32, 38, 46, 54, 62, 70,  76,  36],
    [ 6,  6,  6,  6,  6,  6,  8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68,  58,  54],
    [ 6,  6,  6,  6,  6,  6,  8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68,  58,  54],
    [ 6,  6,  6,  6,  6,  6,  8, 10, 12, 14, 16, 20, 24, 28, 32, 38, 46, 52, 60, 68,  58,  54],
    [12, 12, 12, 12, 12, 12, 16, 20, 24, 28, 32, 40, 48, 56, 64, 76, 90,  2,  2,  2,   2,   2],
];

/// Widths of one window of each short band. Every short band spans three windows.
#[rustfmt::skip]
const SHORT_WIDTHS: [[u16; SHORT_BANDS]; 9] = [
    [4, 4, 4, 4,  6,  8, 10, 12, 14, 18, 22, 30, 56],
    [4, 4, 4, 4,  6,  6, 10, 12, 14, 16, 20, 26, 66],
    [4, 4, 4, 4,  6,  8, 12, 16, 20, 26, 34, 42, 12],
    [4, 4, 4, 6,  6,  8, 10, 14, 18, 26, 32, 42, 18],
    [4, 4, 4, 6,  8, 10, 12, 14, 18, 24, 32, 44, 12],
    [4, 4, 4, 6,  8, 10, 12, 14, 18, 24, 30, 40, 18],
    [4, 4, 4, 6,  8, 10, 12, 14, 18, 24, 30, 40, 18],
    [4, 4, 4, 6,  8, 10, 12, 14, 18, 24, 30, 40, 18],
    [8, 8, 8, 12, 16, 20, 24, 28, 36,  2,  2,  2, 26],
];

/// The number of long bands preceding the short bands of a mixed block.
const MIXED_SWITCH_POINT: [usize; 9] = [8, 8, 8, 6, 6, 6, 6, 6, 3];

/// At 8 kHz the long bands of a mixed block do not end on a short band boundary. There is no
/// normative table, so the first 36 lines are split into three long bands followed by the three
/// windows of a 4-line short band, and the short partition resumes at line 56.
const MIXED_8K_HEAD: [usize; 7] = [0, 12, 24, 36, 40, 44, 48];

/// The partition of a granule into scale factor bands (long blocks) or scale factor band windows
/// (short and mixed blocks). Every entry is the index of the first line of a region, and the last
/// entry is always 576.
pub struct BandPartition {
    /// Long block partition: 22 regions.
    pub long: [usize; LONG_BANDS + 1],
    /// Short block partition: 13 bands of 3 consecutive windows each.
    pub short: [usize; 3 * SHORT_BANDS + 1],
    /// Mixed block partition: long regions up-to `switch`, then short band windows.
    pub mixed: Vec<usize>,
    /// The index of the first short window region in `mixed`.
    pub switch: usize,
}

impl BandPartition {
    fn new(sr_idx: usize) -> Self {
        let mut long = [0; LONG_BANDS + 1];

        for (i, &width) in LONG_WIDTHS[sr_idx].iter().enumerate() {
            long[i + 1] = long[i] + usize::from(width);
        }

        let mut short = [0; 3 * SHORT_BANDS + 1];

        for (band, &width) in SHORT_WIDTHS[sr_idx].iter().enumerate() {
            for win in 0..3 {
                let i = 3 * band + win;
                short[i + 1] = short[i] + usize::from(width);
            }
        }

        let switch = MIXED_SWITCH_POINT[sr_idx];

        // The long part of a mixed block always covers the first 36 lines, the first two
        // subbands, which is where short band 3 starts at every rate except 8 kHz.
        let mixed = if sr_idx == 8 {
            MIXED_8K_HEAD.iter().chain(&short[7..]).copied().collect()
        }
        else {
            long[..switch].iter().chain(&short[9..]).copied().collect()
        };

        BandPartition { long, short, mixed, switch }
    }

    /// Gets the regions and the switch point used by a block type. Regions at or after the
    /// switch point are short windows, where region `switch + 3 * n + w` is window `w` of the
    /// `n`th short band of the block.
    pub fn regions(&self, block_type: BlockType) -> (&[usize], usize) {
        match block_type {
            BlockType::Short { is_mixed: false } => (&self.short, 0),
            BlockType::Short { is_mixed: true } => (&self.mixed, self.switch),
            _ => (&self.long, LONG_BANDS),
        }
    }
}

lazy_static! {
    /// Band partitions, indexed by `FrameHeader::sample_rate_idx`.
    pub static ref BAND_PARTITIONS: Vec<BandPartition> = (0..9).map(BandPartition::new).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_partitions_cover_granule() {
        for bands in BAND_PARTITIONS.iter() {
            assert_eq!(bands.long[LONG_BANDS], 576);
            assert_eq!(bands.short[3 * SHORT_BANDS], 576);
            assert_eq!(bands.mixed.last(), Some(&576));

            for part in [&bands.long[..], &bands.short[..], &bands.mixed[..]] {
                assert!(part.windows(2).all(|w| w[0] < w[1]));
            }

            // Mixed blocks end with whole short bands.
            assert_eq!((bands.mixed.len() - 1 - bands.switch) % 3, 0);
        }
    }

    #[test]
    fn verify_known_boundaries() {
        let bands = &BAND_PARTITIONS[0];

        assert_eq!(&bands.long[..8], &[0, 4, 8, 12, 16, 20, 24, 30]);
        assert_eq!(bands.long[21], 418);
        assert_eq!(&bands.short[33..], &[318, 348, 378, 408, 464, 520, 576]);
        assert_eq!(&bands.mixed[6..10], &[24, 30, 36, 40]);

        let bands = &BAND_PARTITIONS[4];

        assert_eq!(bands.long[18], 332);
        assert_eq!(&bands.mixed[..7], &[0, 6, 12, 18, 24, 30, 36]);
    }
}
