// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The 32-band polyphase synthesis filterbank shared by all three layers.

use cantus_core::audio::OutputSink;

use lazy_static::lazy_static;

use crate::common::SUBBANDS;

/// The factor that scales the unit-range filterbank output into the 16-bit signed range.
pub const OUTPUT_SCALE: f32 = 32700.0;

/// The 512-tap prototype window, D[i] of Table B.3 in ISO/IEC 11172-3.
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
const SYNTHESIS_D: [f32; 512] = [
     0.000000000, -0.000015259, -0.000015259, -0.000015259,
    -0.000015259, -0.000015259, -0.000015259, -0.000030518,
    -0.000030518, -0.000030518, -0.000030518, -0.000045776,
    -0.000045776, -0.000061035, -0.000061035, -0.000076294,
    -0.000076294, -0.000091553, -0.000106812, -0.000106812,
    -0.000122070, -0.000137329, -0.000152588, -0.000167847,
    -0.000198364, -0.000213623, -0.000244141, -0.000259399,
    -0.000289917, -0.000320435, -0.000366211, -0.000396729,
    -0.000442505, -0.000473022, -0.000534058, -0.000579834,
    -0.000625610, -0.000686646, -0.000747681, -0.000808716,
    -0.000885010, -0.000961304, -0.001037598, -0.001113892,
    -0.001205444, -0.001296997, -0.001388550, -0.001480103,
    -0.001586914, -0.001693726, -0.001785278, -0.001907349,
    -0.002014160, -0.002120972, -0.002243042, -0.002349854,
    -0.002456665, -0.002578735, -0.002685547, -0.002792358,
    -0.002899170, -0.002990723, -0.003082275, -0.003173828,
     0.003250122,  0.003326416,  0.003387451,  0.003433228,
     0.003463745,  0.003479004,  0.003479004,  0.003463745,
     0.003417969,  0.003372192,  0.003280640,  0.003173828,
     0.003051758,  0.002883911,  0.002700806,  0.002487183,
     0.002227783,  0.001937866,  0.001617432,  0.001266479,
     0.000869751,  0.000442505, -0.000030518, -0.000549316,
    -0.001098633, -0.001693726, -0.002334595, -0.003005981,
    -0.003723145, -0.004486084, -0.005294800, -0.006118774,
    -0.007003784, -0.007919312, -0.008865356, -0.009841919,
    -0.010848999, -0.011886597, -0.012939453, -0.014022827,
    -0.015121460, -0.016235352, -0.017349243, -0.018463135,
    -0.019577026, -0.020690918, -0.021789551, -0.022857666,
    -0.023910522, -0.024932861, -0.025909424, -0.026840210,
    -0.027725220, -0.028533936, -0.029281616, -0.029937744,
    -0.030532837, -0.031005859, -0.031387329, -0.031661987,
    -0.031814575, -0.031845093, -0.031738281, -0.031478882,
     0.031082153,  0.030517578,  0.029785156,  0.028884888,
     0.027801514,  0.026535034,  0.025085449,  0.023422241,
     0.021575928,  0.019531250,  0.017257690,  0.014801025,
     0.012115479,  0.009231567,  0.006134033,  0.002822876,
    -0.000686646, -0.004394531, -0.008316040, -0.012420654,
    -0.016708374, -0.021179199, -0.025817871, -0.030609131,
    -0.035552979, -0.040634155, -0.045837402, -0.051132202,
    -0.056533813, -0.061996460, -0.067520142, -0.073059082,
    -0.078628540, -0.084182739, -0.089706421, -0.095169067,
    -0.100540161, -0.105819702, -0.110946655, -0.115921021,
    -0.120697021, -0.125259399, -0.129562378, -0.133590698,
    -0.137298584, -0.140670776, -0.143676758, -0.146255493,
    -0.148422241, -0.150115967, -0.151306152, -0.151962280,
    -0.152069092, -0.151596069, -0.150497437, -0.148773193,
    -0.146362305, -0.143264771, -0.139450073, -0.134887695,
    -0.129577637, -0.123474121, -0.116577148, -0.108856201,
     0.100311279,  0.090927124,  0.080688477,  0.069595337,
     0.057617187,  0.044784546,  0.031082153,  0.016510010,
     0.001068115, -0.015228271, -0.032379150, -0.050354004,
    -0.069168091, -0.088775635, -0.109161377, -0.130310059,
    -0.152206421, -0.174789429, -0.198059082, -0.221984863,
    -0.246505737, -0.271591187, -0.297210693, -0.323318481,
    -0.349868774, -0.376800537, -0.404083252, -0.431655884,
    -0.459472656, -0.487472534, -0.515609741, -0.543823242,
    -0.572036743, -0.600219727, -0.628295898, -0.656219482,
    -0.683914185, -0.711318970, -0.738372803, -0.765029907,
    -0.791213989, -0.816864014, -0.841949463, -0.866363525,
    -0.890090942, -0.913055420, -0.935195923, -0.956481934,
    -0.976852417, -0.996246338, -1.014617920, -1.031936646,
    -1.048156738, -1.063217163, -1.077117920, -1.089782715,
    -1.101211548, -1.111373901, -1.120223999, -1.127746582,
    -1.133926392, -1.138763428, -1.142211914, -1.144287109,
     1.144989014,  1.144287109,  1.142211914,  1.138763428,
     1.133926392,  1.127746582,  1.120223999,  1.111373901,
     1.101211548,  1.089782715,  1.077117920,  1.063217163,
     1.048156738,  1.031936646,  1.014617920,  0.996246338,
     0.976852417,  0.956481934,  0.935195923,  0.913055420,
     0.890090942,  0.866363525,  0.841949463,  0.816864014,
     0.791213989,  0.765029907,  0.738372803,  0.711318970,
     0.683914185,  0.656219482,  0.628295898,  0.600219727,
     0.572036743,  0.543823242,  0.515609741,  0.487472534,
     0.459472656,  0.431655884,  0.404083252,  0.376800537,
     0.349868774,  0.323318481,  0.297210693,  0.271591187,
     0.246505737,  0.221984863,  0.198059082,  0.174789429,
     0.152206421,  0.130310059,  0.109161377,  0.088775635,
     0.069168091,  0.050354004,  0.032379150,  0.015228271,
    -0.001068115, -0.016510010, -0.031082153, -0.044784546,
    -0.057617187, -0.069595337, -0.080688477, -0.090927124,
     0.100311279,  0.108856201,  0.116577148,  0.123474121,
     0.129577637,  0.134887695,  0.139450073,  0.143264771,
     0.146362305,  0.148773193,  0.150497437,  0.151596069,
     0.152069092,  0.151962280,  0.151306152,  0.150115967,
     0.148422241,  0.146255493,  0.143676758,  0.140670776,
     0.137298584,  0.133590698,  0.129562378,  0.125259399,
     0.120697021,  0.115921021,  0.110946655,  0.105819702,
     0.100540161,  0.095169067,  0.089706421,  0.084182739,
     0.078628540,  0.073059082,  0.067520142,  0.061996460,
     0.056533813,  0.051132202,  0.045837402,  0.040634155,
     0.035552979,  0.030609131,  0.025817871,  0.021179199,
     0.016708374,  0.012420654,  0.008316040,  0.004394531,
     0.000686646, -0.002822876, -0.006134033, -0.009231567,
    -0.012115479, -0.014801025, -0.017257690, -0.019531250,
    -0.021575928, -0.023422241, -0.025085449, -0.026535034,
    -0.027801514, -0.028884888, -0.029785156, -0.030517578,
     0.031082153,  0.031478882,  0.031738281,  0.031845093,
     0.031814575,  0.031661987,  0.031387329,  0.031005859,
     0.030532837,  0.029937744,  0.029281616,  0.028533936,
     0.027725220,  0.026840210,  0.025909424,  0.024932861,
     0.023910522,  0.022857666,  0.021789551,  0.020690918,
     0.019577026,  0.018463135,  0.017349243,  0.016235352,
     0.015121460,  0.014022827,  0.012939453,  0.011886597,
     0.010848999,  0.009841919,  0.008865356,  0.007919312,
     0.007003784,  0.006118774,  0.005294800,  0.004486084,
     0.003723145,  0.003005981,  0.002334595,  0.001693726,
     0.001098633,  0.000549316,  0.000030518, -0.000442505,
    -0.000869751, -0.001266479, -0.001617432, -0.001937866,
    -0.002227783, -0.002487183, -0.002700806, -0.002883911,
    -0.003051758, -0.003173828, -0.003280640, -0.003372192,
    -0.003417969, -0.003463745, -0.003479004, -0.003479004,
    -0.003463745, -0.003433228, -0.003387451, -0.003326416,
     0.003250122,  0.003173828,  0.003082275,  0.002990723,
     0.002899170,  0.002792358,  0.002685547,  0.002578735,
     0.002456665,  0.002349854,  0.002243042,  0.002120972,
     0.002014160,  0.001907349,  0.001785278,  0.001693726,
     0.001586914,  0.001480103,  0.001388550,  0.001296997,
     0.001205444,  0.001113892,  0.001037598,  0.000961304,
     0.000885010,  0.000808716,  0.000747681,  0.000686646,
     0.000625610,  0.000579834,  0.000534058,  0.000473022,
     0.000442505,  0.000396729,  0.000366211,  0.000320435,
     0.000289917,  0.000259399,  0.000244141,  0.000213623,
     0.000198364,  0.000167847,  0.000152588,  0.000137329,
     0.000122070,  0.000106812,  0.000106812,  0.000091553,
     0.000076294,  0.000076294,  0.000061035,  0.000061035,
     0.000045776,  0.000045776,  0.000030518,  0.000030518,
     0.000030518,  0.000030518,  0.000015259,  0.000015259,
     0.000015259,  0.000015259,  0.000015259,  0.000015259,
];

lazy_static! {
    /// Butterfly factors of the recursive DCT, `1 / (2 cos(PI (2i + 1) / 2N))` for `i = 0..N/2`.
    /// The factors of the N-point stage begin at index `N/2 - 1`.
    static ref DCT_FACTORS: [f32; SUBBANDS - 1] = {
        let mut factors = [0f32; SUBBANDS - 1];

        let mut n = 2;
        while n <= SUBBANDS {
            let half = n >> 1;

            for i in 0..half {
                let theta = std::f64::consts::PI * (2 * i + 1) as f64 / (2 * n) as f64;
                factors[half - 1 + i] = (0.5 / theta.cos()) as f32;
            }

            n <<= 1;
        }

        factors
    };
}

/// An unscaled N-point DCT-II using Byeong Gi Lee's decomposition, computed in-place in `x`.
/// `scratch` must be at least as long as `x`, and `x.len()` a power of two no greater than 32.
///
/// B.G. Lee, "A new algorithm to compute the discrete cosine transform", IEEE Transactions on
/// Acoustics, Speech, and Signal Processing, vol. 32, no. 6, pp. 1243-1245, 1984.
fn dct_lee(x: &mut [f32], scratch: &mut [f32]) {
    let n = x.len();

    if n == 1 {
        return;
    }

    let half = n >> 1;
    let factors = &DCT_FACTORS[half - 1..n - 1];

    let (even, odd) = scratch[..n].split_at_mut(half);

    for i in 0..half {
        let (a, b) = (x[i], x[n - 1 - i]);
        even[i] = a + b;
        odd[i] = (a - b) * factors[i];
    }

    // The halves of x are free to be used as scratch space by the half-length transforms.
    {
        let (lo, hi) = x.split_at_mut(half);
        dct_lee(even, lo);
        dct_lee(odd, hi);
    }

    for i in 0..half - 1 {
        x[2 * i] = even[i];
        x[2 * i + 1] = odd[i] + odd[i + 1];
    }

    x[n - 2] = even[half - 1];
    x[n - 1] = odd[half - 1];
}

/// Performs the 32-point DCT that replaces the synthesis matrixing step.
fn dct32(x: &[f32; SUBBANDS], y: &mut [f32; SUBBANDS]) {
    let mut scratch = [0f32; SUBBANDS];
    y.copy_from_slice(x);
    dct_lee(y, &mut scratch);
}

/// A `SynthesisFilter` converts vectors of 32 subband samples of one channel into 32 PCM samples
/// each. Every channel requires its own filter since the filter keeps a history of the last 16
/// matrixed vectors.
#[derive(Clone)]
pub struct SynthesisFilter {
    /// The V vector FIFO, 16 slots of 64 samples.
    v_vec: [[f32; 64]; 16],
    /// The slot of `v_vec` that is written next.
    v_front: usize,
    /// Per-subband gains derived from the equalizer.
    eq_factors: [f32; SUBBANDS],
    /// The channel the filter writes to in the output sink.
    channel: usize,
}

impl SynthesisFilter {
    /// Instantiate a new filter writing into `channel` of an output sink.
    pub fn new(channel: usize) -> Self {
        SynthesisFilter {
            v_vec: [[0f32; 64]; 16],
            v_front: 0,
            eq_factors: [1.0; SUBBANDS],
            channel,
        }
    }

    /// Sets the per-subband gains. They take effect on the next call to `input_samples`.
    pub fn set_eq_factors(&mut self, factors: &[f32; SUBBANDS]) {
        self.eq_factors = *factors;
    }

    /// Clears the filter history.
    pub fn reset(&mut self) {
        self.v_vec = [[0f32; 64]; 16];
        self.v_front = 0;
    }

    /// Synthesizes 32 PCM samples from one vector of 32 subband samples and returns them scaled to
    /// the 16-bit signed range, but not yet clamped.
    pub fn synthesize(&mut self, subbands: &[f32; SUBBANDS]) -> [f32; 32] {
        let mut s_vec = [0f32; SUBBANDS];

        for ((s, &x), &gain) in s_vec.iter_mut().zip(subbands).zip(&self.eq_factors) {
            *s = x * gain;
        }

        // Matrixing, per Konstantinides, "Fast subband filtering in MPEG audio coding" (1994).
        //
        // The 64-point matrixing output is made of four mirrored or negated quadrants of a 32-point
        // DCT of the input. Only the boundary samples need special handling.
        let mut d_vec = [0f32; SUBBANDS];
        dct32(&s_vec, &mut d_vec);

        let v_vec = &mut self.v_vec[self.v_front];

        for (v, d) in v_vec[1..16].iter_mut().zip(&d_vec[17..32]) {
            *v = *d;
        }
        for (v, d) in v_vec[17..32].iter_mut().rev().zip(&d_vec[17..32]) {
            *v = -d;
        }
        for (v, d) in v_vec[33..48].iter_mut().rev().zip(&d_vec[1..16]) {
            *v = -d;
        }
        for (v, d) in v_vec[49..64].iter_mut().zip(&d_vec[1..16]) {
            *v = -d;
        }

        v_vec[0] = d_vec[16];
        v_vec[16] = 0.0;
        v_vec[32] = -d_vec[16];
        v_vec[48] = -d_vec[0];

        // Windowing. The U vector is the first half of the even slots and the second half of the
        // odd slots, counting from the front of the FIFO. Rather than building it, accumulate
        // straight from the slots.
        let mut out = [0f32; 32];

        for j in 0..8 {
            let slot = self.v_front + 2 * j;

            let v0 = &self.v_vec[slot & 0xf][0..32];
            let v1 = &self.v_vec[(slot + 1) & 0xf][32..64];

            let window = &SYNTHESIS_D[64 * j..64 * (j + 1)];

            for i in 0..32 {
                out[i] += v0[i] * window[i] + v1[i] * window[32 + i];
            }
        }

        for sample in out.iter_mut() {
            *sample *= OUTPUT_SCALE;
        }

        // Move the front of the FIFO back one slot so the oldest slot is overwritten next.
        self.v_front = (self.v_front + 15) & 0xf;

        out
    }

    /// Synthesizes 32 PCM samples from one vector of 32 subband samples and appends them to the
    /// filter's channel of `sink`.
    pub fn input_samples<S: OutputSink + ?Sized>(
        &mut self,
        subbands: &[f32; SUBBANDS],
        sink: &mut S,
    ) {
        let pcm = self.synthesize(subbands);
        sink.append_samples(self.channel, &pcm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_core::audio::{SampleBuffer, SignalSpec};

    fn dct32_direct(x: &[f32; 32]) -> [f32; 32] {
        let mut y = [0f32; 32];

        for (k, out) in y.iter_mut().enumerate() {
            *out = x
                .iter()
                .enumerate()
                .map(|(n, &v)| {
                    let phase = std::f64::consts::PI / 32.0 * k as f64 * (n as f64 + 0.5);
                    v * phase.cos() as f32
                })
                .sum();
        }

        y
    }

    fn test_vector() -> [f32; 32] {
        let mut x = [0f32; 32];
        for (i, v) in x.iter_mut().enumerate() {
            *v = ((i * 7919) % 97) as f32 / 97.0 - 0.5;
        }
        x
    }

    #[test]
    fn verify_dct32() {
        let x = test_vector();

        let mut y = [0f32; 32];
        dct32(&x, &mut y);

        let expected = dct32_direct(&x);

        for (a, b) in y.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-4, "{} != {}", a, b);
        }
    }

    #[test]
    fn verify_silence_in_silence_out() {
        let mut filter = SynthesisFilter::new(0);

        for _ in 0..32 {
            assert_eq!(filter.synthesize(&[0.0; 32]), [0.0; 32]);
        }
    }

    #[test]
    fn verify_unity_eq_is_pass_through() {
        let mut plain = SynthesisFilter::new(0);
        let mut eq = SynthesisFilter::new(0);
        eq.set_eq_factors(&[1.0; 32]);

        let x = test_vector();

        for _ in 0..20 {
            assert_eq!(plain.synthesize(&x), eq.synthesize(&x));
        }
    }

    #[test]
    fn verify_muted_subband_has_no_contribution() {
        let mut factors = [1.0; 32];
        factors[5] = 0.0;

        let mut muted_a = SynthesisFilter::new(0);
        let mut muted_b = SynthesisFilter::new(0);
        let mut plain = SynthesisFilter::new(0);

        muted_a.set_eq_factors(&factors);
        muted_b.set_eq_factors(&factors);

        let mut only_band5 = [0f32; 32];
        only_band5[5] = 0.8;

        let mut without_band5 = test_vector();
        without_band5[5] = 0.0;

        let mut with_band5 = without_band5;
        with_band5[5] = 0.8;

        for _ in 0..20 {
            assert_eq!(muted_a.synthesize(&only_band5), [0.0; 32]);
            assert_eq!(muted_b.synthesize(&with_band5), plain.synthesize(&without_band5));
        }
    }

    #[test]
    fn verify_history_reset() {
        let mut filter = SynthesisFilter::new(1);
        let x = test_vector();

        let first = filter.synthesize(&x);
        filter.synthesize(&x);
        filter.reset();

        assert_eq!(filter.synthesize(&x), first);

        let mut buf = SampleBuffer::new(SignalSpec::new(44100, 2));
        filter.input_samples(&x, &mut buf);
        filter.input_samples(&x, &mut buf);

        // Only the right channel was written.
        assert_eq!(buf.frames(), 0);
    }
}
