// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Joint stereo decoding.
//!
//! A joint stereo granule is split into the same regions used for requantization. Regions of the
//! right channel above its last non-zero line may be intensity coded: the left channel carries
//! the sum signal and the scale factor of the right channel carries the position. All other
//! regions are mid-side coded if mid-side stereo is enabled, and left-right coded otherwise.

use std::f64::consts::{FRAC_1_SQRT_2, PI, SQRT_2};

use lazy_static::lazy_static;

use crate::common::{ChannelMode, FrameHeader, Mode};

use super::bands::BandPartition;
use super::{Granule, MAX_REGIONS};

lazy_static! {
    /// MPEG1 intensity (left, right) gains, indexed by a position below 7.
    ///
    /// ```text
    /// ratio = tan(is_pos * PI/12)
    /// k_l   = ratio / (1 + ratio)
    /// k_r   = 1 / (1 + ratio)
    /// ```
    static ref INTENSITY_MPEG1: [(f32, f32); 7] = {
        let mut gains = [(0f32, 0f32); 7];

        for (is_pos, gain) in gains.iter_mut().enumerate() {
            let ratio = (PI / 12.0 * is_pos as f64).tan();
            *gain = ((ratio / (1.0 + ratio)) as f32, (1.0 / (1.0 + ratio)) as f32);
        }

        // tan(PI/2) is infinite.
        gains[6] = (1.0, 0.0);
        gains
    };

    /// MPEG2 intensity (left, right) gains, indexed by the intensity scale (`scalefac_compress`
    /// bit 0) and a position below 31.
    ///
    /// ```text
    /// i0 = 2^-0.25 (scale 0), or 2^-0.5 (scale 1)
    ///
    /// is_pos odd:  k_l = i0^((is_pos + 1) / 2), k_r = 1
    /// is_pos even: k_l = 1,                     k_r = i0^(is_pos / 2)
    /// ```
    static ref INTENSITY_MPEG2: [[(f32, f32); 32]; 2] = {
        let i0 = [1.0 / SQRT_2.sqrt(), FRAC_1_SQRT_2];

        let mut gains = [[(0f32, 0f32); 32]; 2];

        for (scale, gains) in gains.iter_mut().enumerate() {
            for (is_pos, gain) in gains.iter_mut().enumerate() {
                *gain = if is_pos & 1 == 1 {
                    (i0[scale].powi((is_pos as i32 + 1) / 2) as f32, 1.0)
                }
                else {
                    (1.0, i0[scale].powi(is_pos as i32 / 2) as f32)
                };
            }
        }

        gains
    };
}

/// How a region of a joint stereo granule is coded.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Coding {
    LeftRight,
    MidSide,
    Intensity { left: f32, right: f32 },
}

/// Finds the regions of the right channel that are past its last non-zero line. Short windows
/// are tracked separately, and long regions only qualify if every window above them is zero.
fn zero_regions(
    regions: &[usize],
    switch: usize,
    right: &[f32; 576],
    rzero: usize,
) -> [bool; MAX_REGIONS] {
    let mut zero = [false; MAX_REGIONS];

    let mut window_zero = [true; 3];
    let mut long_zero = true;

    for k in (0..regions.len() - 1).rev() {
        let (start, end) = (regions[k], regions[k + 1]);

        let is_zero = start >= rzero || right[start..end].iter().all(|&s| s == 0.0);

        if k >= switch {
            let win = (k - switch) % 3;
            window_zero[win] &= is_zero;
            zero[k] = window_zero[win];
        }
        else {
            long_zero &= is_zero;
            zero[k] = long_zero && window_zero.iter().all(|&z| z);
        }
    }

    zero
}

/// Gets the region whose scale factor holds the intensity position of region `k`. The last band
/// has no scale factor of its own and reuses the position of the band below it.
fn position_region(k: usize, n_regions: usize, switch: usize) -> usize {
    if switch == n_regions {
        // Long block.
        k.min(n_regions - 2)
    }
    else if k + 3 >= n_regions {
        k - 3
    }
    else {
        k
    }
}

/// Performs joint stereo decoding of a granule, in place.
pub(super) fn stereo(
    header: &FrameHeader,
    bands: &BandPartition,
    granule: &mut Granule,
    samples: &mut [[f32; 576]; 2],
) {
    let (mid_side, intensity) = match header.channel_mode {
        ChannelMode::JointStereo(Mode::Layer3 { mid_side, intensity }) => (mid_side, intensity),
        _ => return,
    };

    if !mid_side && !intensity {
        return;
    }

    let right_channel = &granule.channels[1];

    let (regions, switch) = bands.regions(right_channel.block_type);
    let n_regions = regions.len() - 1;

    let zero = if intensity {
        zero_regions(regions, switch, &samples[1], right_channel.rzero)
    }
    else {
        [false; MAX_REGIONS]
    };

    let scale = (right_channel.scalefac_compress & 1) as usize;

    let end = granule.channels[0].rzero.max(right_channel.rzero);

    for k in 0..n_regions {
        let (start, region_end) = (regions[k], regions[k + 1]);

        if start >= end {
            break;
        }

        let mut coding = if mid_side { Coding::MidSide } else { Coding::LeftRight };

        if zero[k] {
            let pos_k = position_region(k, n_regions, switch);
            let is_pos = right_channel.scalefacs[pos_k];

            if is_pos < right_channel.is_limits[pos_k] {
                let (left, right) = if header.is_mpeg1() {
                    INTENSITY_MPEG1[usize::from(is_pos)]
                }
                else {
                    INTENSITY_MPEG2[scale][usize::from(is_pos)]
                };

                coding = Coding::Intensity { left, right };
            }
        }

        let (l, r) = samples.split_at_mut(1);
        let l = &mut l[0][start..region_end.min(end)];
        let r = &mut r[0][start..region_end.min(end)];

        match coding {
            Coding::LeftRight => (),
            Coding::MidSide => {
                for (l, r) in l.iter_mut().zip(r.iter_mut()) {
                    let (m, s) = (*l, *r);
                    *l = (m + s) * FRAC_1_SQRT_2 as f32;
                    *r = (m - s) * FRAC_1_SQRT_2 as f32;
                }
            }
            Coding::Intensity { left, right } => {
                for (l, r) in l.iter_mut().zip(r.iter_mut()) {
                    let m = *l;
                    *l = m * left;
                    *r = m * right;
                }
            }
        }
    }

    // Both channels are now non-zero up-to the end of the longer one.
    for channel in granule.channels.iter_mut() {
        channel.rzero = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;
    use crate::layer3::bands::BAND_PARTITIONS;
    use crate::layer3::GranuleChannel;

    fn joint_stereo_header(mode_extension: u32) -> FrameHeader {
        // MPEG1 layer 3, 128 kbit/s, 44.1 kHz, joint stereo.
        parse_frame_header(0xfffb_9040 | (mode_extension << 4)).unwrap()
    }

    fn granule(rzero: usize) -> Granule {
        let channel = GranuleChannel { rzero, is_limits: [7; MAX_REGIONS], ..Default::default() };
        Granule { channels: [channel.clone(), channel] }
    }

    #[test]
    fn verify_mid_side() {
        let header = joint_stereo_header(0b10);
        let mut granule = granule(576);

        let mut samples = [[0f32; 576]; 2];
        samples[0][0] = 1.0;
        samples[1][0] = 1.0;
        samples[0][575] = 2.0;

        stereo(&header, &BAND_PARTITIONS[0], &mut granule, &mut samples);

        let norm = FRAC_1_SQRT_2 as f32;

        assert!((samples[0][0] - 2.0 * norm).abs() < 1e-6);
        assert_eq!(samples[1][0], 0.0);
        assert!((samples[0][575] - 2.0 * norm).abs() < 1e-6);
        assert!((samples[1][575] - 2.0 * norm).abs() < 1e-6);
    }

    #[test]
    fn verify_intensity_above_right_channel() {
        let header = joint_stereo_header(0b01);
        let bands = &BAND_PARTITIONS[0];

        let mut granule = granule(576);
        granule.channels[1].rzero = 4;

        // Position 0 moves all of the sum signal into the right channel. Position 7 is illegal
        // and leaves the band left-right coded.
        granule.channels[1].scalefacs[1] = 0;
        granule.channels[1].scalefacs[2] = 7;

        let mut samples = [[0f32; 576]; 2];
        samples[0].fill(1.0);
        samples[1][0] = 0.5;

        stereo(&header, bands, &mut granule, &mut samples);

        // Band 0 is non-zero in the right channel, and left-right coded.
        assert_eq!(samples[0][0], 1.0);
        assert_eq!(samples[1][0], 0.5);

        // Band 1: lines 4..8.
        assert_eq!(samples[0][4], 0.0);
        assert_eq!(samples[1][4], 1.0);

        // Band 2: lines 8..12.
        assert_eq!(samples[0][8], 1.0);
        assert_eq!(samples[1][8], 0.0);

        assert_eq!(granule.channels[0].rzero, 576);
        assert_eq!(granule.channels[1].rzero, 576);
    }

    #[test]
    fn verify_last_band_reuses_position() {
        assert_eq!(position_region(21, 22, 22), 20);
        assert_eq!(position_region(5, 22, 22), 5);
        assert_eq!(position_region(38, 39, 0), 35);
        assert_eq!(position_region(35, 39, 0), 35);
        assert_eq!(position_region(37, 38, 8), 34);
    }

    #[test]
    fn verify_mpeg2_gains() {
        let gains: &[[(f32, f32); 32]; 2] = &INTENSITY_MPEG2;

        assert_eq!(gains[0][0], (1.0, 1.0));
        assert!((gains[1][1].0 - FRAC_1_SQRT_2 as f32).abs() < 1e-6);
        assert!((gains[1][2].1 - FRAC_1_SQRT_2 as f32).abs() < 1e-6);
        assert_eq!(gains[1][2].0, 1.0);
    }
}
