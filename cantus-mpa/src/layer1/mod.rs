// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{decode_error, Result};
use cantus_core::io::{BitReaderLtr, BufReader, ReadBitsLtr, ReadBytes};

use log::warn;

use crate::common::*;
use crate::layer12::{sign_extend, LAYER12_SCALEFACTORS};
use crate::output::{FrameOutput, SubbandSlot};

use lazy_static::lazy_static;

/// The number of time slots in a layer 1 frame.
const SLOTS: usize = 12;

lazy_static! {
    /// Dequantization factors for samples of 2 to 15 bits.
    ///
    /// An nb-bit sample, with its most significant bit inverted, is a two's complement fraction
    /// `s`. Dequantization is `2^nb / (2^nb - 1) * (s + 2^(1 - nb))`, which reduces to
    /// `factor[nb] * (val + 1)` for the sign-extended integer `val`.
    static ref FACTOR: [f32; 16] = {
        let mut factor = [0f32; 16];

        for (nb, factor) in factor.iter_mut().enumerate().skip(2) {
            let steps = (1u32 << nb) as f32;
            let half = (1u32 << (nb - 1)) as f32;

            *factor = steps / (steps - 1.0) / half;
        }

        factor
    };
}

#[inline(always)]
fn dequantize(bits: u32, raw: u32) -> f32 {
    let val = sign_extend(raw ^ (1 << (bits - 1)), bits);
    FACTOR[bits as usize] * (val + 1) as f32
}

/// Reads one allocation code. Returns the sample length in bits, or 0 if the subband is not
/// transmitted.
#[inline]
fn read_allocation(bs: &mut BitReaderLtr<'_>) -> Result<u8> {
    match bs.read_bits_leq32(4)? as u8 {
        0 => Ok(0),
        0xf => decode_error("mp1: invalid bit allocation"),
        code => Ok(code + 1),
    }
}

#[derive(Default)]
pub struct Layer1;

impl Layer1 {
    pub fn new() -> Self {
        Layer1
    }

    /// Reads the allocation, scale factors, and samples of a frame into time slots.
    fn read_slots(
        &self,
        bs: &mut BitReaderLtr<'_>,
        header: &FrameHeader,
    ) -> Result<[SubbandSlot; SLOTS]> {
        let n_channels = header.n_channels();

        let bound = match header.channel_mode {
            ChannelMode::JointStereo(Mode::Intensity { bound }) => bound as usize,
            ChannelMode::JointStereo(Mode::Layer3 { .. }) => {
                return decode_error("mp1: invalid mode extension");
            }
            _ => SUBBANDS,
        };

        let mut alloc = [[0u8; SUBBANDS]; 2];
        let mut scale = [[0f32; SUBBANDS]; 2];

        // Below the bound each channel has its own allocation. Above it, one allocation is shared.
        for sb in 0..bound {
            for ch in 0..n_channels {
                alloc[ch][sb] = read_allocation(bs)?;
            }
        }

        for sb in bound..SUBBANDS {
            let bits = read_allocation(bs)?;
            alloc[0][sb] = bits;
            alloc[1][sb] = bits;
        }

        for sb in 0..SUBBANDS {
            for ch in 0..n_channels {
                if alloc[ch][sb] != 0 {
                    scale[ch][sb] = LAYER12_SCALEFACTORS[bs.read_bits_leq32(6)? as usize];
                }
            }
        }

        let mut slots = [[[0f32; SUBBANDS]; 2]; SLOTS];

        for slot in slots.iter_mut() {
            for sb in 0..bound {
                for ch in 0..n_channels {
                    let bits = u32::from(alloc[ch][sb]);

                    if bits != 0 {
                        let raw = bs.read_bits_leq32(bits)?;
                        slot[ch][sb] = scale[ch][sb] * dequantize(bits, raw);
                    }
                }
            }

            // Intensity coded subbands carry one sample scaled separately for each channel.
            for sb in bound..SUBBANDS {
                let bits = u32::from(alloc[0][sb]);

                if bits != 0 {
                    let sample = dequantize(bits, bs.read_bits_leq32(bits)?);

                    for ch in 0..n_channels {
                        slot[ch][sb] = scale[ch][sb] * sample;
                    }
                }
            }
        }

        Ok(slots)
    }
}

impl Layer for Layer1 {
    fn decode(
        &mut self,
        reader: &mut BufReader<'_>,
        header: &FrameHeader,
        out: &mut FrameOutput<'_>,
    ) -> Result<()> {
        let n_channels = header.n_channels();

        // The CRC is not verified.
        if header.has_crc() {
            reader.read_be_u16().map_err(|err| frame_data_error(err.into()))?;
        }

        let mut bs = BitReaderLtr::new(reader.read_buf_bytes_available_ref());

        match self.read_slots(&mut bs, header) {
            Ok(slots) => {
                for slot in &slots {
                    out.write_slot(slot, n_channels);
                }
                Ok(())
            }
            Err(err) => {
                let err = frame_data_error(err);
                warn!("mp1: frame concealed: {}", err);
                out.conceal(1);
                out.write_silence(SLOTS, n_channels);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_dequantize() {
        // 2-bit samples have the levels -2/3, 0, and 2/3.
        assert!((dequantize(2, 0b00) + 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(dequantize(2, 0b01), 0.0);
        assert!((dequantize(2, 0b10) - 2.0 / 3.0).abs() < 1e-6);

        // The midpoint of any length is zero.
        for bits in 2..16 {
            assert_eq!(dequantize(bits, (1 << (bits - 1)) - 1), 0.0);
        }

        // The extremes approach, but never reach, full scale.
        let max = dequantize(15, 0x7ffe);
        assert!(max < 1.0 && max > 0.999);
    }
}
