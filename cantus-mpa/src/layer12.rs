// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Support shared by the layer 1 and layer 2 decoders.

use lazy_static::lazy_static;

lazy_static! {
    /// Scale factors of layers 1 and 2, `2^(1 - i/3)` for `i = 0..63` (Table B.1 of
    /// ISO/IEC 11172-3).
    pub static ref LAYER12_SCALEFACTORS: [f32; 64] = {
        let mut scalefactors = [0f32; 64];

        for (i, sf) in scalefactors.iter_mut().enumerate().take(63) {
            *sf = 2f64.powf(1.0 - i as f64 / 3.0) as f32;
        }

        // Index 63 is not a valid scale factor. Treat it as silence.
        scalefactors
    };
}

/// Sign extends the `bits`-bit two's complement value in the low bits of `value`.
#[inline(always)]
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_scalefactors() {
        assert_eq!(LAYER12_SCALEFACTORS[0], 2.0);
        assert_eq!(LAYER12_SCALEFACTORS[3], 1.0);
        assert!((LAYER12_SCALEFACTORS[1] - 1.587_401_1).abs() < 1e-6);
        assert!((LAYER12_SCALEFACTORS[62] - 1.201_554e-6).abs() < 1e-10);
        assert_eq!(LAYER12_SCALEFACTORS[63], 0.0);
    }

    #[test]
    fn verify_sign_extend() {
        assert_eq!(sign_extend(0b011, 3), 3);
        assert_eq!(sign_extend(0b100, 3), -4);
        assert_eq!(sign_extend(0xffff, 16), -1);
        assert_eq!(sign_extend(0x7fff, 16), 32767);
    }
}
