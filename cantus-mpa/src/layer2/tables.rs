// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit allocation tables of layer 2, Tables B.2a-d of ISO/IEC 11172-3 and Table B.1 of
//! ISO/IEC 13818-3.

use crate::common::{FrameHeader, SUBBANDS};

/// A layer 2 quantizer.
#[derive(Debug)]
pub struct Quantizer {
    /// The number of quantization levels.
    pub levels: u32,
    /// If true, three consecutive samples are packed into one codeword.
    pub grouped: bool,
    /// The length of a codeword in bits.
    pub bits: u32,
}

/// Every quantizer, ordered by the number of levels.
#[rustfmt::skip]
const QUANTIZERS: [Quantizer; 17] = [
    Quantizer { levels:     3, grouped: true,  bits:  5 },
    Quantizer { levels:     5, grouped: true,  bits:  7 },
    Quantizer { levels:     7, grouped: false, bits:  3 },
    Quantizer { levels:     9, grouped: true,  bits: 10 },
    Quantizer { levels:    15, grouped: false, bits:  4 },
    Quantizer { levels:    31, grouped: false, bits:  5 },
    Quantizer { levels:    63, grouped: false, bits:  6 },
    Quantizer { levels:   127, grouped: false, bits:  7 },
    Quantizer { levels:   255, grouped: false, bits:  8 },
    Quantizer { levels:   511, grouped: false, bits:  9 },
    Quantizer { levels:  1023, grouped: false, bits: 10 },
    Quantizer { levels:  2047, grouped: false, bits: 11 },
    Quantizer { levels:  4095, grouped: false, bits: 12 },
    Quantizer { levels:  8191, grouped: false, bits: 13 },
    Quantizer { levels: 16383, grouped: false, bits: 14 },
    Quantizer { levels: 32767, grouped: false, bits: 15 },
    Quantizer { levels: 65535, grouped: false, bits: 16 },
];

/// Allocation classes. A class maps an allocation code to a 1-based index into `QUANTIZERS`, or 0
/// if the subband is not transmitted.
#[rustfmt::skip]
const CLASSES: [[u8; 16]; 8] = [
    // 0   1   2   3   4   5   6   7   8   9  10  11  12  13  14  15
    [  0,  1,  2, 17,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0 ],
    [  0,  1,  2,  3,  4,  5,  6, 17,  0,  0,  0,  0,  0,  0,  0,  0 ],
    [  0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 17 ],
    [  0,  1,  3,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15, 16, 17 ],
    [  0,  1,  2,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15, 17 ],
    // Low sampling frequencies.
    [  0,  1,  2,  3,  4,  5,  6,  7,  8,  9, 10, 11, 12, 13, 14, 15 ],
    [  0,  1,  2,  4,  5,  6,  7,  8,  0,  0,  0,  0,  0,  0,  0,  0 ],
    [  0,  1,  2,  4,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0 ],
];

/// An allocation table. Each subband below `sblimit` has an allocation field of `nbal` bits and
/// a class.
pub struct AllocationTable {
    sblimit: usize,
    /// Per subband: `(nbal, class)`.
    subbands: [(u8, u8); SUBBANDS],
}

/// Builds the per-subband entries from runs of `(count, nbal, class)`.
const fn runs(runs: &[(usize, u8, u8)]) -> [(u8, u8); SUBBANDS] {
    let mut subbands = [(0, 0); SUBBANDS];
    let mut sb = 0;
    let mut r = 0;

    while r < runs.len() {
        let (count, nbal, class) = runs[r];
        let mut i = 0;

        while i < count {
            subbands[sb] = (nbal, class);
            sb += 1;
            i += 1;
        }

        r += 1;
    }

    subbands
}

/// Table B.2a, high bitrates, 27 subbands.
static TABLE_A: AllocationTable =
    AllocationTable { sblimit: 27, subbands: runs(&[(3, 4, 3), (8, 4, 2), (12, 3, 1), (4, 2, 0)]) };

/// Table B.2b, high bitrates, 30 subbands.
static TABLE_B: AllocationTable =
    AllocationTable { sblimit: 30, subbands: runs(&[(3, 4, 3), (8, 4, 2), (12, 3, 1), (7, 2, 0)]) };

/// Table B.2c, low bitrates, 8 subbands.
static TABLE_C: AllocationTable =
    AllocationTable { sblimit: 8, subbands: runs(&[(2, 4, 4), (6, 3, 4)]) };

/// Table B.2d, low bitrates, 12 subbands.
static TABLE_D: AllocationTable =
    AllocationTable { sblimit: 12, subbands: runs(&[(2, 4, 4), (10, 3, 4)]) };

/// Table B.1 of ISO/IEC 13818-3, MPEG-2 and 2.5 low sampling frequencies.
static TABLE_LSF: AllocationTable =
    AllocationTable { sblimit: 30, subbands: runs(&[(4, 4, 5), (7, 3, 6), (19, 2, 7)]) };

impl AllocationTable {
    /// Selects the allocation table for a frame.
    pub fn select(header: &FrameHeader) -> &'static AllocationTable {
        if !header.is_mpeg1() {
            return &TABLE_LSF;
        }

        // The choice depends on the bitrate per channel, and the sample rate.
        let per_channel = header.bitrate / header.n_channels() as u32;

        match (per_channel, header.sample_rate) {
            (0..=48_000, 32_000) => &TABLE_D,
            (0..=48_000, _) => &TABLE_C,
            (56_000..=80_000, _) => &TABLE_A,
            (_, 48_000) => &TABLE_A,
            _ => &TABLE_B,
        }
    }

    /// Gets the number of subbands with an allocation.
    pub fn sblimit(&self) -> usize {
        self.sblimit
    }

    /// Gets the length of the allocation field of a subband in bits.
    pub fn nbal(&self, sb: usize) -> u32 {
        u32::from(self.subbands[sb].0)
    }

    /// Gets the quantizer an allocation code selects in a subband.
    pub fn quantizer(&self, sb: usize, code: usize) -> Option<&'static Quantizer> {
        match CLASSES[usize::from(self.subbands[sb].1)][code] {
            0 => None,
            idx => Some(&QUANTIZERS[usize::from(idx) - 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;

    #[test]
    fn verify_table_selection() {
        // MPEG1 layer 2, 44.1 kHz, stereo, 192 kbps: 96 kbps per channel.
        let header = parse_frame_header(0xfffda000).unwrap();
        assert_eq!(AllocationTable::select(&header).sblimit(), 30);

        // MPEG1 layer 2, 48 kHz, mono, 64 kbps.
        let header = parse_frame_header(0xfffd44c0).unwrap();
        assert_eq!(AllocationTable::select(&header).sblimit(), 27);

        // MPEG1 layer 2, 32 kHz, mono, 32 kbps.
        let header = parse_frame_header(0xfffd18c0).unwrap();
        assert_eq!(AllocationTable::select(&header).sblimit(), 12);

        // MPEG1 layer 2, 44.1 kHz, stereo, 64 kbps: 32 kbps per channel.
        let header = parse_frame_header(0xfffd4000).unwrap();
        assert_eq!(AllocationTable::select(&header).sblimit(), 8);
    }

    #[test]
    fn verify_table_layouts() {
        for table in [&TABLE_A, &TABLE_B, &TABLE_C, &TABLE_D, &TABLE_LSF] {
            // Subbands below the limit are allocated, and those above are not.
            assert!((0..table.sblimit()).all(|sb| table.nbal(sb) >= 2));
            assert!((table.sblimit()..SUBBANDS).all(|sb| table.nbal(sb) == 0));
        }

        // Code 0 never allocates, and the LSF table tops out at 16383 levels.
        assert!(TABLE_LSF.quantizer(0, 0).is_none());
        assert_eq!(TABLE_LSF.quantizer(0, 15).map(|q| q.levels), Some(16383));
        assert_eq!(TABLE_LSF.quantizer(29, 3).map(|q| q.levels), Some(9));
        assert_eq!(TABLE_B.quantizer(0, 15).map(|q| q.levels), Some(65535));
    }
}
