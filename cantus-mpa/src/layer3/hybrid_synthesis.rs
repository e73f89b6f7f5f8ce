// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reordering, alias reduction, and the IMDCT stage of the hybrid filterbank.

// Justification: The transform loops index several arrays with the same counter.
#![allow(clippy::needless_range_loop)]

use std::f64::consts::PI;

use lazy_static::lazy_static;

use super::bands::BandPartition;
use super::{BlockType, GranuleChannel};

/// The overlap carried between granules: 18 samples for each of the 32 subbands.
pub type Overlap = [[f32; 18]; 32];

lazy_static! {
    /// IMDCT windows indexed by `window_index`: normal, start, short, stop.
    ///
    /// ```text
    /// normal  sin(PI/36 * (i + 0.5))                            0 <= i < 36
    /// start   sin(PI/36 * (i + 0.5))                            0 <= i < 18
    ///         1                                                18 <= i < 24
    ///         sin(PI/12 * (i - 18 + 0.5))                      24 <= i < 30
    ///         0                                                30 <= i < 36
    /// short   sin(PI/12 * (i + 0.5))                            0 <= i < 12
    /// stop    0                                                 0 <= i < 6
    ///         sin(PI/12 * (i - 6 + 0.5))                        6 <= i < 12
    ///         1                                                12 <= i < 18
    ///         sin(PI/36 * (i + 0.5))                           18 <= i < 36
    /// ```
    static ref WINDOWS: [[f32; 36]; 4] = {
        let long = |i: usize| (PI / 36.0 * (i as f64 + 0.5)).sin() as f32;
        let short = |i: usize| (PI / 12.0 * (i as f64 + 0.5)).sin() as f32;

        let mut windows = [[0f32; 36]; 4];

        for i in 0..36 {
            windows[0][i] = long(i);

            windows[1][i] = match i {
                0..=17 => long(i),
                18..=23 => 1.0,
                24..=29 => short(i - 18),
                _ => 0.0,
            };

            windows[3][i] = match i {
                0..=5 => 0.0,
                6..=11 => short(i - 6),
                12..=17 => 1.0,
                _ => long(i),
            };
        }

        for i in 0..12 {
            windows[2][i] = short(i);
        }

        windows
    };

    /// The 36-point IMDCT matrix, `cos(PI/72 * (2i + 1 + 18) * (2k + 1))`.
    static ref IMDCT36: [[f32; 18]; 36] = {
        let mut cos = [[0f32; 18]; 36];

        for (i, row) in cos.iter_mut().enumerate() {
            for (k, c) in row.iter_mut().enumerate() {
                *c = (PI / 72.0 * ((2 * i + 19) * (2 * k + 1)) as f64).cos() as f32;
            }
        }

        cos
    };

    /// The 12-point IMDCT matrix, `cos(PI/24 * (2i + 1 + 6) * (2k + 1))`.
    static ref IMDCT12: [[f32; 6]; 12] = {
        let mut cos = [[0f32; 6]; 12];

        for (i, row) in cos.iter_mut().enumerate() {
            for (k, c) in row.iter_mut().enumerate() {
                *c = (PI / 24.0 * ((2 * i + 7) * (2 * k + 1)) as f64).cos() as f32;
            }
        }

        cos
    };

    /// Alias reduction butterfly coefficients `(cs, ca)` derived from the coefficients of ISO/IEC
    /// 11172-3 Table B.9.
    static ref ALIAS_BUTTERFLIES: [(f32, f32); 8] = {
        const C: [f64; 8] = [-0.6, -0.535, -0.33, -0.185, -0.095, -0.041, -0.0142, -0.0037];

        let mut butterflies = [(0f32, 0f32); 8];

        for (bf, &c) in butterflies.iter_mut().zip(&C) {
            let norm = (1.0 + c * c).sqrt();
            *bf = ((1.0 / norm) as f32, (c / norm) as f32);
        }

        butterflies
    };
}

fn window_index(block_type: BlockType) -> usize {
    match block_type {
        BlockType::Long => 0,
        BlockType::Start => 1,
        BlockType::Short { .. } => 2,
        BlockType::End => 3,
    }
}

/// The number of leading subbands transformed with a long block.
fn long_subbands(block_type: BlockType) -> usize {
    match block_type {
        BlockType::Short { is_mixed: false } => 0,
        BlockType::Short { is_mixed: true } => 2,
        _ => 32,
    }
}

/// Reorders the short windows of a short or mixed block from scale factor band order, where the
/// three windows of each band follow each other, to subband order, where the samples of the three
/// windows are interleaved.
pub(super) fn reorder(bands: &BandPartition, channel: &GranuleChannel, samples: &mut [f32; 576]) {
    if !matches!(channel.block_type, BlockType::Short { .. }) {
        return;
    }

    let (regions, switch) = bands.regions(channel.block_type);
    let regions = &regions[switch..];

    let start = regions[0];
    let mut reordered = [0f32; 576];
    let mut i = start;

    for band in regions.windows(4).step_by(3) {
        let win0 = &samples[band[0]..band[1]];
        let win1 = &samples[band[1]..band[2]];
        let win2 = &samples[band[2]..band[3]];

        for ((&s0, &s1), &s2) in win0.iter().zip(win1).zip(win2) {
            reordered[i] = s0;
            reordered[i + 1] = s1;
            reordered[i + 2] = s2;
            i += 3;
        }
    }

    samples[start..i].copy_from_slice(&reordered[start..i]);
}

/// Applies the alias reduction butterflies between adjacent long block subbands.
pub(super) fn antialias(channel: &GranuleChannel, samples: &mut [f32; 576]) {
    let end = 18 * long_subbands(channel.block_type);

    let butterflies: &[(f32, f32); 8] = &ALIAS_BUTTERFLIES;

    for boundary in (18..end).step_by(18) {
        for (i, &(cs, ca)) in butterflies.iter().enumerate() {
            let lo = samples[boundary - 1 - i];
            let hi = samples[boundary + i];

            samples[boundary - 1 - i] = lo * cs - hi * ca;
            samples[boundary + i] = hi * cs + lo * ca;
        }
    }
}

/// Transforms each subband with the IMDCT, windows it, and overlap-adds it with the previous
/// granule. On return `samples` holds 18 time samples per subband.
pub(super) fn imdct(channel: &GranuleChannel, overlap: &mut Overlap, samples: &mut [f32; 576]) {
    let n_long = long_subbands(channel.block_type);

    // The long subbands of a mixed block use the normal window.
    let long_window = match channel.block_type {
        BlockType::Short { .. } => &WINDOWS[0],
        block_type => &WINDOWS[window_index(block_type)],
    };

    for (sb, subband) in samples.chunks_exact_mut(18).enumerate() {
        let mut out = [0f32; 36];

        if sb < n_long {
            imdct36(subband, long_window, &mut out);
        }
        else {
            imdct12x3(subband, &WINDOWS[2], &mut out);
        }

        for i in 0..18 {
            subband[i] = out[i] + overlap[sb][i];
            overlap[sb][i] = out[18 + i];
        }
    }
}

fn imdct36(x: &[f32], window: &[f32; 36], out: &mut [f32; 36]) {
    let cos: &[[f32; 18]; 36] = &IMDCT36;

    for i in 0..36 {
        let y: f32 = x.iter().zip(&cos[i]).map(|(&x, &c)| x * c).sum();
        out[i] = y * window[i];
    }
}

/// Transforms the three interleaved short windows of a subband. The windows overlap each other
/// by half, starting at sample 6.
fn imdct12x3(x: &[f32], window: &[f32; 36], out: &mut [f32; 36]) {
    let cos: &[[f32; 6]; 12] = &IMDCT12;

    for w in 0..3 {
        for i in 0..12 {
            let y: f32 = (0..6).map(|k| x[3 * k + w] * cos[i][k]).sum();
            out[6 + 6 * w + i] += y * window[i];
        }
    }
}

/// Negates every odd sample of every odd subband to compensate for the frequency inversion of the
/// polyphase filterbank.
pub(super) fn frequency_inversion(samples: &mut [f32; 576]) {
    for subband in samples.chunks_exact_mut(18).skip(1).step_by(2) {
        for sample in subband.iter_mut().skip(1).step_by(2) {
            *sample = -*sample;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer3::bands::BAND_PARTITIONS;

    fn channel(block_type: BlockType) -> GranuleChannel {
        GranuleChannel { block_type, ..Default::default() }
    }

    #[test]
    fn verify_imdct36_symmetry() {
        let x: Vec<f32> = (0..18).map(|k| ((k * 7 % 11) as f32 - 5.0) / 3.0).collect();
        let ones = [1f32; 36];
        let mut y = [0f32; 36];

        imdct36(&x, &ones, &mut y);

        for i in 0..9 {
            assert!((y[i] + y[17 - i]).abs() < 1e-4);
            assert!((y[18 + i] - y[35 - i]).abs() < 1e-4);
        }
    }

    #[test]
    fn verify_imdct12x3_window_placement() {
        // Only the middle window is non-zero.
        let mut x = [0f32; 18];
        x[1] = 1.0;

        let mut out = [0f32; 36];
        imdct12x3(&x, &WINDOWS[2], &mut out);

        assert!(out[..12].iter().all(|&s| s == 0.0));
        assert!(out[12..24].iter().any(|&s| s != 0.0));
        assert!(out[24..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_windows() {
        let windows: &[[f32; 36]; 4] = &WINDOWS;

        // Start and stop windows mirror each other.
        for i in 0..36 {
            assert!((windows[1][i] - windows[3][35 - i]).abs() < 1e-6);
        }

        // Time domain alias cancellation requires w[i]^2 + w[i + 18]^2 == 1.
        for i in 0..18 {
            let sum = windows[0][i].powi(2) + windows[0][i + 18].powi(2);
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn verify_overlap_is_carried() {
        let ch = channel(BlockType::Long);
        let mut overlap = [[0f32; 18]; 32];
        let mut samples = [0f32; 576];

        samples[0] = 1.0;
        imdct(&ch, &mut overlap, &mut samples);

        let tail = overlap[0];
        assert!(tail.iter().any(|&s| s != 0.0));
        assert!(overlap[1].iter().all(|&s| s == 0.0));

        // A silent granule flushes the tail.
        let mut samples = [0f32; 576];
        imdct(&ch, &mut overlap, &mut samples);

        assert_eq!(&samples[..18], &tail);
        assert!(overlap[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_reorder_short_block() {
        let bands = &BAND_PARTITIONS[0];
        let ch = channel(BlockType::Short { is_mixed: false });

        let mut samples = [0f32; 576];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = i as f32;
        }

        reorder(bands, &ch, &mut samples);

        // The first band has 4 lines per window.
        assert_eq!(&samples[..6], &[0.0, 4.0, 8.0, 1.0, 5.0, 9.0]);
        assert_eq!(&samples[9..12], &[3.0, 7.0, 11.0]);
        assert_eq!(samples[12], 12.0);
    }

    #[test]
    fn verify_antialias_and_inversion() {
        let mut samples = [0f32; 576];

        // Short blocks are not antialiased.
        samples[17] = 1.0;
        antialias(&channel(BlockType::Short { is_mixed: false }), &mut samples);
        assert_eq!(samples[18], 0.0);

        antialias(&channel(BlockType::Long), &mut samples);
        assert!(samples[17] > 0.0 && samples[17] < 1.0);
        assert!(samples[18] < 0.0);

        let mut samples = [1f32; 576];
        frequency_inversion(&mut samples);

        assert_eq!(samples[18], 1.0);
        assert_eq!(samples[19], -1.0);
        assert_eq!(samples[20], 1.0);
        assert_eq!(samples[1], 1.0);
        assert_eq!(samples[36 + 1], 1.0);
    }
}
