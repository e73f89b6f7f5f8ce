// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use cantus_core::errors::{decode_error, Error, Result};
use cantus_core::io::{BitReaderLtr, BufReader, FiniteBitStream, ReadBitsLtr, ReadBytes};

use log::warn;

use crate::common::*;
use crate::output::{FrameOutput, SubbandSlot};

mod bands;
mod bitstream;
mod codebooks;
mod hybrid_synthesis;
mod requantize;
mod reservoir;
mod stereo;

use bands::BAND_PARTITIONS;
use hybrid_synthesis::Overlap;
use reservoir::BitReservoir;

/// The number of scale factor regions of the finest partition, a short block.
pub(crate) const MAX_REGIONS: usize = 39;

/// The block type, or window, of a granule channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockType {
    /// One long block. The only block type without window switching.
    Long,
    Start,
    Short { is_mixed: bool },
    End,
}

/// `FrameData` contains the side information of a frame, and the scale factors read from its
/// main data.
#[derive(Default, Debug)]
struct FrameData {
    /// The number of bytes of main data, preceding this frame's, where its main data begins.
    main_data_begin: usize,
    /// Scale factor selector information, per channel. Groups of long bands flagged true reuse
    /// the scale factors of the first granule in the second granule.
    ///
    /// Mapping of array indicies to bands [0..6, 6..11, 11..16, 16..21].
    scfsi: [[bool; 4]; 2],
    /// The granules. MPEG2 and MPEG2.5 frames only use the first.
    granules: [Granule; 2],
}

#[derive(Clone, Default, Debug)]
struct Granule {
    channels: [GranuleChannel; 2],
}

#[derive(Clone)]
struct GranuleChannel {
    /// Total number of bits used for scale factors (part2) and Huffman encoded data (part3).
    part2_3_length: u32,
    /// Half the number of lines in the big values partition.
    big_values: usize,
    /// Logarithmic quantization step size.
    global_gain: u8,
    /// Selects the number of bits per scale factor. 4 bits for MPEG1, and 9 bits for MPEG2 and
    /// MPEG2.5 where it also selects the scale factor groups.
    scalefac_compress: u32,
    block_type: BlockType,
    /// Gain factors for the three windows of a short block.
    subblock_gain: [u8; 3],
    /// The Huffman table for each of the three regions of the big values partition.
    table_select: [u8; 3],
    /// The index of the first line of region1.
    region1_start: usize,
    /// The index of the first line of region2.
    region2_start: usize,
    /// Add the pre-emphasis table to the long block scale factors.
    preflag: bool,
    /// A 0.5x (false) or 1x (true) multiplier for scale factors.
    scalefac_scale: bool,
    /// Use count1 table B instead of table A.
    count1table_b: bool,
    /// The scale factor of each region of the partition selected by `block_type`. Regions past
    /// the last transmitted scale factor are 0.
    scalefacs: [u8; MAX_REGIONS],
    /// The intensity positions below which a scale factor of the intensity coded channel is
    /// legal, per region.
    is_limits: [u8; MAX_REGIONS],
    /// The index of the first line of the rzero partition, where every line is 0.
    rzero: usize,
}

impl Default for GranuleChannel {
    fn default() -> Self {
        GranuleChannel {
            part2_3_length: 0,
            big_values: 0,
            global_gain: 0,
            scalefac_compress: 0,
            block_type: BlockType::Long,
            subblock_gain: [0; 3],
            table_select: [0; 3],
            region1_start: 0,
            region2_start: 0,
            preflag: false,
            scalefac_scale: false,
            count1table_b: false,
            scalefacs: [0; MAX_REGIONS],
            is_limits: [0; MAX_REGIONS],
            rzero: 0,
        }
    }
}

impl fmt::Debug for GranuleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GranuleChannel")
            .field("part2_3_length", &self.part2_3_length)
            .field("big_values", &self.big_values)
            .field("global_gain", &self.global_gain)
            .field("scalefac_compress", &self.scalefac_compress)
            .field("block_type", &self.block_type)
            .field("subblock_gain", &self.subblock_gain)
            .field("table_select", &self.table_select)
            .field("region1_start", &self.region1_start)
            .field("region2_start", &self.region2_start)
            .field("preflag", &self.preflag)
            .field("scalefac_scale", &self.scalefac_scale)
            .field("count1table_b", &self.count1table_b)
            .field("rzero", &self.rzero)
            .finish()
    }
}

/// How a granule of a frame was damaged.
#[derive(Debug)]
enum Damage {
    /// The part3 of a channel could not be decoded past some line. The lines before it are kept.
    Truncated(Error),
    /// The granule is replaced by silence.
    Lost(Error),
}

/// Reads the scale factors (part2) and Huffman coded samples (part3) of one granule channel,
/// starting `begin` bits into `main_data`.
///
/// A channel whose part3 fails to decode is truncated rather than lost, and the error is
/// returned as `Ok(Some(err))`.
fn read_granule_channel(
    header: &FrameHeader,
    main_data: &[u8],
    begin: usize,
    granule: &mut Granule,
    ch: usize,
    reused: [bool; 4],
    samples: &mut [f32; 576],
) -> Result<Option<Error>> {
    if begin >> 3 > main_data.len() {
        return decode_error("mp3: main data offset out-of-range");
    }

    let mut bs = BitReaderLtr::new(&main_data[begin >> 3..]);
    bs.ignore_bits((begin & 7) as u32)?;

    let start_bits = bs.bits_left();

    let is_intensity_channel = ch > 0 && header.is_intensity_stereo();

    let channel = &mut granule.channels[ch];

    if header.is_mpeg1() {
        bitstream::read_scale_factors_mpeg1(&mut bs, channel, reused)?;
    }
    else {
        bitstream::read_scale_factors_mpeg2(&mut bs, channel, is_intensity_channel)?;
    }

    let part2_len = (start_bits - bs.bits_left()) as u32;

    if part2_len > channel.part2_3_length {
        return decode_error("mp3: scale factors overrun part2_3_length");
    }

    let part3_bits = channel.part2_3_length - part2_len;

    Ok(requantize::read_huffman_samples(&mut bs, channel, part3_bits, samples).err())
}

/// Reads the scale factors and Huffman coded samples of every granule of a frame.
///
/// `main_data` holds the main data available in the reservoir. If the reservoir held only
/// `available` bytes and underran, the first `missing_bits` bits are missing. The granules are
/// located from their declared lengths, so a granule that can't be read does not affect the
/// others. The damage to each granule is returned in `damage`.
///
/// Returns the number of bytes of main data used by the frame.
fn read_main_data(
    header: &FrameHeader,
    main_data: &[u8],
    missing_bits: usize,
    available: usize,
    frame: &mut FrameData,
    samples: &mut [[[f32; 576]; 2]; 2],
    damage: &mut [Option<Damage>; 2],
) -> usize {
    let mut begin = 0;

    for gr in 0..header.n_granules() {
        if gr == 1 {
            for ch in 0..header.n_channels() {
                let scalefacs = frame.granules[0].channels[ch].scalefacs;
                frame.granules[1].channels[ch].scalefacs = scalefacs;
            }
        }

        for ch in 0..header.n_channels() {
            let part2_3_length = frame.granules[gr].channels[ch].part2_3_length as usize;

            if !matches!(damage[gr], Some(Damage::Lost(_))) {
                let reused = if gr == 1 { frame.scfsi[ch] } else { [false; 4] };

                // Main data lost to a reservoir underrun.
                let result = if part2_3_length > 0 && begin < missing_bits {
                    Err(Error::ReservoirUnderrun { needed: frame.main_data_begin, available })
                }
                else {
                    read_granule_channel(
                        header,
                        main_data,
                        begin.saturating_sub(missing_bits),
                        &mut frame.granules[gr],
                        ch,
                        reused,
                        &mut samples[gr][ch],
                    )
                };

                match result {
                    Ok(None) => (),
                    Ok(Some(err)) => {
                        if damage[gr].is_none() {
                            damage[gr] = Some(Damage::Truncated(frame_data_error(err)));
                        }
                    }
                    Err(err) => damage[gr] = Some(Damage::Lost(frame_data_error(err))),
                }
            }

            begin += part2_3_length;
        }
    }

    ((begin + 7) >> 3).saturating_sub(missing_bits >> 3)
}

/// `Layer3` decodes Layer III frames. It carries the bit reservoir and the IMDCT overlap of both
/// channels between frames.
pub struct Layer3 {
    reservoir: BitReservoir,
    samples: Box<[[[f32; 576]; 2]; 2]>,
    overlap: Box<[Overlap; 2]>,
}

impl Default for Layer3 {
    fn default() -> Self {
        Layer3 {
            reservoir: BitReservoir::new(),
            samples: Box::new([[[0f32; 576]; 2]; 2]),
            overlap: Box::new([[[0f32; 18]; 32]; 2]),
        }
    }
}

impl Layer3 {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reads the side information and main data of a frame, leaving the Huffman decoded samples
    /// of each granule in `self.samples`. Returns the damage to each granule.
    fn read_frame(
        &mut self,
        reader: &mut BufReader<'_>,
        header: &FrameHeader,
        frame: &mut FrameData,
    ) -> Result<[Option<Damage>; 2]> {
        // The CRC is not verified.
        if header.has_crc() {
            reader.read_be_u16()?;
        }

        let side_info = reader.read_buf_bytes_ref(header.side_info_len())?;

        bitstream::read_side_info(&mut BitReaderLtr::new(side_info), header, frame)?;

        let main_data = reader.read_buf_bytes_available_ref();
        let available = self.reservoir.available();
        let missing = self.reservoir.fill(main_data, frame.main_data_begin)?;

        let mut damage = [None, None];

        let used = read_main_data(
            header,
            self.reservoir.bytes_ref(),
            8 * missing,
            available,
            frame,
            &mut self.samples,
            &mut damage,
        );

        self.reservoir.consume(used);

        Ok(damage)
    }

    /// Runs the granule through requantization, stereo processing and the hybrid filterbank,
    /// and writes its 18 time slots to the output.
    fn synthesize_granule(
        &mut self,
        header: &FrameHeader,
        granule: &mut Granule,
        gr: usize,
        out: &mut FrameOutput<'_>,
    ) {
        let n_channels = header.n_channels();
        let bands = &BAND_PARTITIONS[header.sample_rate_idx];
        let samples = &mut self.samples[gr];

        for ch in 0..n_channels {
            requantize::requantize(bands, &granule.channels[ch], &mut samples[ch]);
        }

        if n_channels == 2 {
            stereo::stereo(header, bands, granule, samples);
        }

        for ch in 0..n_channels {
            let channel = &granule.channels[ch];

            hybrid_synthesis::reorder(bands, channel, &mut samples[ch]);
            hybrid_synthesis::antialias(channel, &mut samples[ch]);
            hybrid_synthesis::imdct(channel, &mut self.overlap[ch], &mut samples[ch]);
            hybrid_synthesis::frequency_inversion(&mut samples[ch]);
        }

        // The hybrid filterbank leaves the samples in subband order, 18 per subband. The
        // synthesis filter takes one sample of every subband at a time.
        for t in 0..18 {
            let mut slot: SubbandSlot = [[0f32; SUBBANDS]; 2];

            for ch in 0..n_channels {
                for sb in 0..SUBBANDS {
                    slot[ch][sb] = samples[ch][18 * sb + t];
                }
            }

            out.write_slot(&slot, n_channels);
        }
    }
}

impl Layer for Layer3 {
    fn decode(
        &mut self,
        reader: &mut BufReader<'_>,
        header: &FrameHeader,
        out: &mut FrameOutput<'_>,
    ) -> Result<()> {
        let n_granules = header.n_granules();

        let mut frame = FrameData::default();

        let mut lost = [false; 2];
        let mut truncated = [false; 2];
        let mut first_err = None;

        match self.read_frame(reader, header, &mut frame) {
            Ok(damage) => {
                for (gr, damage) in damage.into_iter().enumerate() {
                    let err = match damage {
                        Some(Damage::Truncated(err)) => {
                            warn!("mp3: granule {} truncated: {}", gr, err);
                            truncated[gr] = true;
                            err
                        }
                        Some(Damage::Lost(err)) => {
                            warn!("mp3: granule {} concealed: {}", gr, err);
                            lost[gr] = true;
                            err
                        }
                        None => continue,
                    };

                    first_err.get_or_insert(err);
                }
            }
            Err(err) => {
                // Without side information the main data of this frame can't be located, and the
                // reservoir no longer lines up with the stream.
                let err = frame_data_error(err);
                warn!("mp3: frame concealed: {}", err);

                self.reservoir.clear();
                frame = FrameData::default();
                lost = [true; 2];
                first_err = Some(err);
            }
        }

        for gr in 0..n_granules {
            // The overlap of the previous granule still fades out through a lost granule. A
            // truncated granule is synthesized from the lines decoded before the error.
            if lost[gr] {
                self.samples[gr] = [[0f32; 576]; 2];
                frame.granules[gr] = Granule::default();
            }

            if lost[gr] || truncated[gr] {
                out.conceal(1);
            }

            self.synthesize_granule(header, &mut frame.granules[gr], gr, out);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.reservoir.clear();

        for overlap in self.overlap.iter_mut() {
            *overlap = [[0f32; 18]; 32];
        }
    }
}
