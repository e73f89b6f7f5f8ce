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
use crate::layer12::LAYER12_SCALEFACTORS;
use crate::output::{FrameOutput, SubbandSlot};

mod tables;

use tables::{AllocationTable, Quantizer};

/// The number of time slots in a layer 2 frame: 3 parts of 4 granules of 3 samples.
const SLOTS: usize = 36;

/// Reads the allocation of one subband, and returns its quantizer.
#[inline]
fn read_allocation(
    bs: &mut BitReaderLtr<'_>,
    table: &AllocationTable,
    sb: usize,
) -> Result<Option<&'static Quantizer>> {
    let code = bs.read_bits_leq32(table.nbal(sb))? as usize;
    Ok(table.quantizer(sb, code))
}

/// Reads the three samples of one subband in one granule, and dequantizes them.
///
/// A code `c` of an `n`-level quantizer is dequantized to `(2c - (n - 1)) / n`.
fn read_samples(bs: &mut BitReaderLtr<'_>, q: &Quantizer, out: &mut [f32; 3]) -> Result<()> {
    let mut codes = [0u32; 3];

    if q.grouped {
        let mut code = bs.read_bits_leq32(q.bits)?;

        for c in codes.iter_mut() {
            *c = code % q.levels;
            code /= q.levels;
        }
    } else {
        for c in codes.iter_mut() {
            *c = bs.read_bits_leq32(q.bits)?;
        }
    }

    let offset = (q.levels - 1) as f32;
    let scale = (q.levels as f32).recip();

    for (o, &c) in out.iter_mut().zip(&codes) {
        if c >= q.levels {
            return decode_error("mp2: invalid sample code");
        }
        *o = (2.0 * c as f32 - offset) * scale;
    }

    Ok(())
}

#[derive(Default)]
pub struct Layer2;

impl Layer2 {
    pub fn new() -> Self {
        Layer2
    }

    fn read_slots(
        &self,
        bs: &mut BitReaderLtr<'_>,
        header: &FrameHeader,
    ) -> Result<Box<[SubbandSlot; SLOTS]>> {
        let n_channels = header.n_channels();

        let table = AllocationTable::select(header);
        let sblimit = table.sblimit();

        let bound = match header.channel_mode {
            ChannelMode::JointStereo(Mode::Intensity { bound }) => (bound as usize).min(sblimit),
            ChannelMode::JointStereo(Mode::Layer3 { .. }) => {
                return decode_error("mp2: invalid mode extension");
            }
            _ => sblimit,
        };

        let mut alloc: [[Option<&'static Quantizer>; SUBBANDS]; 2] = [[None; SUBBANDS]; 2];

        for sb in 0..bound {
            for ch in 0..n_channels {
                alloc[ch][sb] = read_allocation(bs, table, sb)?;
            }
        }

        for sb in bound..sblimit {
            let q = read_allocation(bs, table, sb)?;
            alloc[0][sb] = q;
            alloc[1][sb] = q;
        }

        // Scale factor selection information.
        let mut scfsi = [[0u32; SUBBANDS]; 2];

        for sb in 0..sblimit {
            for ch in 0..n_channels {
                if alloc[ch][sb].is_some() {
                    scfsi[ch][sb] = bs.read_bits_leq32(2)?;
                }
            }
        }

        // Scale factors, one per part. The selection information says which parts share one.
        let mut scale = [[[0f32; 3]; SUBBANDS]; 2];

        for sb in 0..sblimit {
            for ch in 0..n_channels {
                if alloc[ch][sb].is_none() {
                    continue;
                }

                let mut idx = [0usize; 3];

                match scfsi[ch][sb] {
                    0 => {
                        for i in idx.iter_mut() {
                            *i = bs.read_bits_leq32(6)? as usize;
                        }
                    }
                    1 => {
                        idx[0] = bs.read_bits_leq32(6)? as usize;
                        idx[1] = idx[0];
                        idx[2] = bs.read_bits_leq32(6)? as usize;
                    }
                    2 => {
                        idx[0] = bs.read_bits_leq32(6)? as usize;
                        idx[1] = idx[0];
                        idx[2] = idx[0];
                    }
                    _ => {
                        idx[0] = bs.read_bits_leq32(6)? as usize;
                        idx[1] = bs.read_bits_leq32(6)? as usize;
                        idx[2] = idx[1];
                    }
                }

                for (s, &i) in scale[ch][sb].iter_mut().zip(&idx) {
                    *s = LAYER12_SCALEFACTORS[i];
                }
            }
        }

        let mut slots = Box::new([[[0f32; SUBBANDS]; 2]; SLOTS]);
        let mut samples = [0f32; 3];

        for (gr, triple) in slots.chunks_exact_mut(3).enumerate() {
            // Each part spans 4 granules.
            let part = gr / 4;

            for sb in 0..bound {
                for ch in 0..n_channels {
                    if let Some(q) = alloc[ch][sb] {
                        read_samples(bs, q, &mut samples)?;

                        for (slot, &s) in triple.iter_mut().zip(&samples) {
                            slot[ch][sb] = scale[ch][sb][part] * s;
                        }
                    }
                }
            }

            for sb in bound..sblimit {
                if let Some(q) = alloc[0][sb] {
                    read_samples(bs, q, &mut samples)?;

                    for (slot, &s) in triple.iter_mut().zip(&samples) {
                        for ch in 0..n_channels {
                            slot[ch][sb] = scale[ch][sb][part] * s;
                        }
                    }
                }
            }
        }

        Ok(slots)
    }
}

impl Layer for Layer2 {
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
                for slot in slots.iter() {
                    out.write_slot(slot, n_channels);
                }
                Ok(())
            }
            Err(err) => {
                let err = frame_data_error(err);
                warn!("mp2: frame concealed: {}", err);
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
    fn verify_dequantize_grouped() {
        // 3 levels, grouped into a 5-bit code. Code 2 + 3 * (0 + 3 * 1) = 11 holds the samples 2,
        // 0, and 1.
        let q = Quantizer { levels: 3, grouped: true, bits: 5 };
        let buf = [0b0101_1000];

        let mut bs = BitReaderLtr::new(&buf);
        let mut samples = [0f32; 3];
        read_samples(&mut bs, &q, &mut samples).unwrap();

        assert!((samples[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((samples[1] + 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn verify_dequantize_ungrouped() {
        // 7 levels, 3 bits per sample: codes 0, 3, and 6.
        let q = Quantizer { levels: 7, grouped: false, bits: 3 };
        let buf = [0b0000_1111, 0b0000_0000];

        let mut bs = BitReaderLtr::new(&buf);
        let mut samples = [0f32; 3];
        read_samples(&mut bs, &q, &mut samples).unwrap();

        assert!((samples[0] + 6.0 / 7.0).abs() < 1e-6);
        assert_eq!(samples[1], 0.0);
        assert!((samples[2] - 6.0 / 7.0).abs() < 1e-6);

        // Code 7 is not a level of a 7-level quantizer.
        let buf = [0b1110_0000, 0];
        let mut bs = BitReaderLtr::new(&buf);
        assert!(read_samples(&mut bs, &q, &mut samples).is_err());
    }
}
