// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{reserved_value_error, Error, Result};
use cantus_core::io::ReadBytes;

use crate::common::*;

/// The length in bytes of a MPEG frame header word.
pub const MPEG_HEADER_LEN: usize = 4;

/// Bit-rate lookup table for MPEG version 1 layer 1.
const BIT_RATES_MPEG1_L1: [u32; 15] = [
    0, 32_000, 64_000, 96_000, 128_000, 160_000, 192_000, 224_000, 256_000, 288_000, 320_000,
    352_000, 384_000, 416_000, 448_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 2.
const BIT_RATES_MPEG1_L2: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000, 224_000,
    256_000, 320_000, 384_000,
];

/// Bit-rate lookup table for MPEG version 1 layer 3.
const BIT_RATES_MPEG1_L3: [u32; 15] = [
    0, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 160_000, 192_000,
    224_000, 256_000, 320_000,
];

/// Bit-rate lookup table for MPEG version 2 & 2.5 audio layer 1.
const BIT_RATES_MPEG2_L1: [u32; 15] = [
    0, 32_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000, 128_000, 144_000, 160_000, 176_000,
    192_000, 224_000, 256_000,
];

/// Bit-rate lookup table for MPEG version 2 & 2.5 audio layers 2 & 3.
const BIT_RATES_MPEG2_L23: [u32; 15] = [
    0, 8_000, 16_000, 24_000, 32_000, 40_000, 48_000, 56_000, 64_000, 80_000, 96_000, 112_000,
    128_000, 144_000, 160_000,
];

/// Sample rates indexed by `sample_rate_idx`.
const SAMPLE_RATES: [u32; 9] =
    [44_100, 48_000, 32_000, 22_050, 24_000, 16_000, 11_025, 12_000, 8_000];

/// Quickly check if a header sync word may be valid.
#[inline]
pub fn check_header(header: u32) -> bool {
    // Version (0x1 is not allowed).
    if (header >> 19) & 0x3 == 0x1 {
        return false;
    }
    // Layer (0x0 is not allowed).
    if (header >> 17) & 0x3 == 0x0 {
        return false;
    }
    // Bitrate (0xf is not allowed).
    if (header >> 12) & 0xf == 0xf {
        return false;
    }
    // Sample rate (0x3 is not allowed).
    if (header >> 10) & 0x3 == 0x3 {
        return false;
    }
    true
}

/// Returns true if the provided frame header word is synced.
#[inline(always)]
pub fn is_frame_header_word_synced(sync: u32) -> bool {
    (sync & 0xffe0_0000) == 0xffe0_0000
}

/// Synchronize the provided reader to the end of the next plausible frame header, and return the
/// frame header as a `u32`.
///
/// `sync` holds up-to four bytes already read from the stream, most recent byte last. Scanning
/// gives up with `Error::InvalidSync` after `max_scan` bytes have been read without finding a
/// header.
pub fn sync_frame<B: ReadBytes>(reader: &mut B, mut sync: u32, max_scan: u64) -> Result<u32> {
    let mut n_scanned = 0u64;

    loop {
        // The MPEG audio frame header always starts at a byte boundary with 0xffe (11 consecutive
        // 1 bits) if supporting up-to MPEG version 2.5.
        while !is_frame_header_word_synced(sync) {
            if n_scanned >= max_scan {
                return Err(Error::InvalidSync);
            }

            sync = (sync << 8) | u32::from(reader.read_byte()?);
            n_scanned += 1;
        }

        // Random data can look like a sync word. Do a quick check to increase confidence that
        // this is may be the start of a frame.
        if check_header(sync) {
            break;
        }

        sync = (sync << 8) | u32::from(reader.read_byte()?);
        n_scanned += 1;
    }

    Ok(sync)
}

/// Parses a 32-bit frame header word.
pub fn parse_frame_header(header: u32) -> Result<FrameHeader> {
    // The MPEG audio header is structured as follows:
    //
    // 0b1111_1111 0b111v_vlly 0brrrr_hhpx 0bmmmm_coee
    // where:
    //     vv   = version, ll = layer      , y = crc
    //     rrrr = bitrate, hh = sample rate, p = padding , x  = private bit
    //     mmmm = mode   , c  = copyright  , o = original, ee = emphasis

    if !is_frame_header_word_synced(header) {
        return Err(Error::InvalidSync);
    }

    let version = match (header & 0x18_0000) >> 19 {
        0b00 => MpegVersion::Mpeg2p5,
        0b10 => MpegVersion::Mpeg2,
        0b11 => MpegVersion::Mpeg1,
        _ => return reserved_value_error("version"),
    };

    let layer = match (header & 0x6_0000) >> 17 {
        0b01 => MpegLayer::Layer3,
        0b10 => MpegLayer::Layer2,
        0b11 => MpegLayer::Layer1,
        _ => return reserved_value_error("layer"),
    };

    let bitrate_idx = (header & 0xf000) >> 12;

    let bitrate = match (bitrate_idx, version, layer) {
        // "Free" bit-rate. Note, this is NOT variable bit-rate and is not a mandatory feature of
        // MP3 decoders.
        (0b0000, _, _) => return Err(Error::FreeFormatUnsupported),
        (0b1111, _, _) => return reserved_value_error("bitrate"),
        // MPEG 1 bit-rates.
        (i, MpegVersion::Mpeg1, MpegLayer::Layer1) => BIT_RATES_MPEG1_L1[i as usize],
        (i, MpegVersion::Mpeg1, MpegLayer::Layer2) => BIT_RATES_MPEG1_L2[i as usize],
        (i, MpegVersion::Mpeg1, MpegLayer::Layer3) => BIT_RATES_MPEG1_L3[i as usize],
        // MPEG 2 bit-rates.
        (i, _, MpegLayer::Layer1) => BIT_RATES_MPEG2_L1[i as usize],
        (i, _, _) => BIT_RATES_MPEG2_L23[i as usize],
    };

    let sample_rate_idx = match ((header & 0xc00) >> 10, version) {
        (0b11, _) => return reserved_value_error("sample rate"),
        (i, MpegVersion::Mpeg1) => i as usize,
        (i, MpegVersion::Mpeg2) => 3 + i as usize,
        (i, MpegVersion::Mpeg2p5) => 6 + i as usize,
    };

    let sample_rate = SAMPLE_RATES[sample_rate_idx];

    let mode_extension = (header & 0x30) >> 4;

    let channel_mode = match ((header & 0xc0) >> 6, layer) {
        // Stereo, for layers 1, 2, and 3.
        (0b00, _) => ChannelMode::Stereo,
        // Dual mono, for layers 1, 2, and 3.
        (0b10, _) => ChannelMode::DualMono,
        // Mono, for layers 1, 2, and 3.
        (0b11, _) => ChannelMode::Mono,
        // Joint stereo mode for layer 3 supports a combination of Mid-Side and Intensity Stereo
        // depending on the mode extension bits.
        (_, MpegLayer::Layer3) => ChannelMode::JointStereo(Mode::Layer3 {
            mid_side: mode_extension & 0x2 != 0x0,
            intensity: mode_extension & 0x1 != 0x0,
        }),
        // Joint stereo mode for layers 1 and 2 only supports Intensity Stereo. The mode extension
        // bits indicate for which sub-bands intensity stereo coding is applied.
        (_, _) => ChannelMode::JointStereo(Mode::Intensity { bound: (1 + mode_extension) << 2 }),
    };

    // Some MPEG1 layer 2 channel and bit-rate combinations are not allowed.
    if layer == MpegLayer::Layer2 && version == MpegVersion::Mpeg1 {
        let is_allowed = match channel_mode {
            ChannelMode::Mono => bitrate <= 192_000,
            _ => !matches!(bitrate, 32_000 | 48_000 | 56_000 | 80_000),
        };

        if !is_allowed {
            return reserved_value_error("layer 2 bitrate for the channel mode");
        }
    }

    let emphasis = match header & 0x3 {
        0b01 => Emphasis::Fifty15,
        0b11 => Emphasis::CcitJ17,
        _ => Emphasis::None,
    };

    let mut flags = FrameFlags::empty();

    flags.set(FrameFlags::PROTECTED, header & 0x1_0000 == 0);
    flags.set(FrameFlags::PADDING, header & 0x200 != 0);
    flags.set(FrameFlags::PRIVATE, header & 0x100 != 0);
    flags.set(FrameFlags::COPYRIGHTED, header & 0x8 != 0);
    flags.set(FrameFlags::ORIGINAL, header & 0x4 != 0);

    // Constants provided for size calculation in section ISO-11172 section 2.4.3.1. The MPEG2 and
    // MPEG2.5 layer 3 frames only carry one granule, so their constant is halved.
    let factor = match layer {
        MpegLayer::Layer1 => 12,
        MpegLayer::Layer2 => 144,
        MpegLayer::Layer3 if version == MpegVersion::Mpeg1 => 144,
        MpegLayer::Layer3 => 72,
    };

    // The header specifies the total frame size in "slots". For layers 2 & 3 a slot is 1 byte,
    // however for layer 1 a slot is 4 bytes.
    let slot_size = match layer {
        MpegLayer::Layer1 => 4,
        _ => 1,
    };

    let has_padding = flags.contains(FrameFlags::PADDING);

    // Calculate the total frame size in number of slots.
    let frame_size_slots = (factor * bitrate / sample_rate) as usize + usize::from(has_padding);

    // Calculate the frame size in bytes, excluding the header.
    let frame_size = (frame_size_slots * slot_size) - MPEG_HEADER_LEN;

    Ok(FrameHeader {
        version,
        layer,
        bitrate_idx,
        bitrate,
        sample_rate,
        sample_rate_idx,
        channel_mode,
        mode_extension,
        emphasis,
        flags,
        frame_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_core::io::BufReader;

    #[test]
    fn verify_frame_lengths() {
        // MPEG1 layer 3, 128 kbit/s, 44.1 kHz, joint stereo.
        let header = parse_frame_header(0xfffb_9064).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.layer, MpegLayer::Layer3);
        assert_eq!(header.bitrate, 128_000);
        assert_eq!(header.sample_rate, 44_100);
        assert_eq!(header.frame_len(), 417);
        assert_eq!(header.samples_per_frame(), 1152);
        assert!(!header.has_crc());
        assert!(header.is_original());
        assert_eq!(
            header.channel_mode,
            ChannelMode::JointStereo(Mode::Layer3 { mid_side: true, intensity: false })
        );

        // Same, with padding.
        let header = parse_frame_header(0xfffb_9264).unwrap();
        assert_eq!(header.frame_len(), 418);

        // MPEG1 layer 1, 384 kbit/s, 48 kHz, mono: (12 * 384000 / 48000 + 0) * 4.
        let header = parse_frame_header(0xffff_c4c0).unwrap();
        assert_eq!(header.layer, MpegLayer::Layer1);
        assert_eq!(header.frame_len(), 384);
        assert_eq!(header.samples_per_frame(), 384);
        assert_eq!(header.duration_ms(), 8.0);

        // MPEG1 layer 2, 192 kbit/s, 44.1 kHz, stereo.
        let header = parse_frame_header(0xfffd_a000).unwrap();
        assert_eq!(header.layer, MpegLayer::Layer2);
        assert_eq!(header.frame_len(), 626);

        // MPEG2 layer 3, 64 kbit/s, 22.05 kHz, mono: 72 * 64000 / 22050.
        let header = parse_frame_header(0xfff3_80c0).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg2);
        assert_eq!(header.sample_rate, 22_050);
        assert_eq!(header.frame_len(), 208);
        assert_eq!(header.samples_per_frame(), 576);

        // MPEG2.5 layer 3, 64 kbit/s, 8 kHz, mono.
        let header = parse_frame_header(0xffe3_88c0).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg2p5);
        assert_eq!(header.sample_rate, 8_000);
        assert_eq!(header.sample_rate_idx, 8);
        assert_eq!(header.frame_len(), 576);
        assert_eq!(header.duration_ms(), 72.0);
    }

    #[test]
    fn verify_invalid_headers() {
        // Reserved sample rate index.
        assert!(matches!(parse_frame_header(0xfffb_9c00), Err(Error::ReservedValue(_))));
        // Free format.
        assert!(matches!(parse_frame_header(0xfffb_0000), Err(Error::FreeFormatUnsupported)));
        // Reserved bitrate index.
        assert!(matches!(parse_frame_header(0xfffb_f000), Err(Error::ReservedValue(_))));
        // Reserved layer.
        assert!(matches!(parse_frame_header(0xfff9_9000), Err(Error::ReservedValue(_))));
        // Reserved version.
        assert!(matches!(parse_frame_header(0xffeb_9000), Err(Error::ReservedValue(_))));
        // Broken sync.
        assert!(matches!(parse_frame_header(0xfe7b_9000), Err(Error::InvalidSync)));
        // MPEG1 layer 2 at 384 kbit/s is not allowed for mono.
        assert!(matches!(parse_frame_header(0xfffd_e0c0), Err(Error::ReservedValue(_))));
    }

    #[test]
    fn verify_sync_frame_skips_garbage() {
        // Garbage, including a false sync with a reserved layer, then a valid header.
        let buf = [0x00, 0x12, 0xff, 0xf9, 0x90, 0x00, 0xff, 0xfb, 0x90, 0x64, 0xaa];

        let mut reader = BufReader::new(&buf);
        let sync = sync_frame(&mut reader, 0, 64).unwrap();

        assert_eq!(sync, 0xfffb_9064);
        assert_eq!(reader.pos(), 10);

        // Give up when the scan limit is reached.
        let mut reader = BufReader::new(&buf);
        assert!(matches!(sync_frame(&mut reader, 0, 4), Err(Error::InvalidSync)));

        // End of stream.
        let mut reader = BufReader::new(&buf[..8]);
        assert!(matches!(sync_frame(&mut reader, 0, 64), Err(Error::StreamExhausted)));
    }
}
