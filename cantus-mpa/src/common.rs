// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitflags::bitflags;

use cantus_core::audio::SignalSpec;
use cantus_core::errors::{Error, Result};
use cantus_core::io::BufReader;

use crate::output::FrameOutput;

/// The number of audio samples per granule.
pub const SAMPLES_PER_GRANULE: usize = 576;

/// The number of subbands of the polyphase filterbank.
pub const SUBBANDS: usize = 32;

/// The MPEG audio version.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    /// Version 2.5
    Mpeg2p5,
    /// Version 2
    Mpeg2,
    /// Version 1
    Mpeg1,
}

impl MpegVersion {
    /// Gets the version as it is usually written, ex. "2.5".
    pub fn as_str(&self) -> &'static str {
        match self {
            MpegVersion::Mpeg2p5 => "2.5",
            MpegVersion::Mpeg2 => "2",
            MpegVersion::Mpeg1 => "1",
        }
    }
}

/// The MPEG audio layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpegLayer {
    /// Layer 1
    Layer1,
    /// Layer 2
    Layer2,
    /// Layer 3
    Layer3,
}

impl MpegLayer {
    /// Gets the layer number, 1 to 3.
    pub fn number(&self) -> u32 {
        match self {
            MpegLayer::Layer1 => 1,
            MpegLayer::Layer2 => 2,
            MpegLayer::Layer3 => 3,
        }
    }
}

/// For Joint Stereo channel mode, the mode extension describes the features and parameters of the
/// stereo encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Joint Stereo in layer 3 may use both Mid-Side and Intensity encoding.
    Layer3 { mid_side: bool, intensity: bool },
    /// Joint Stereo in layers 1 and 2 may only use Intensity encoding on a set of bands. The range
    /// of bands using intensity encoding is bound..32.
    Intensity { bound: u32 },
}

/// The channel mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// Single mono audio channel.
    Mono,
    /// Dual mono audio channels.
    DualMono,
    /// Stereo channels.
    Stereo,
    /// Joint Stereo encoded channels (decodes to Stereo).
    JointStereo(Mode),
}

impl ChannelMode {
    /// Gets the number of channels.
    #[inline(always)]
    pub fn count(&self) -> usize {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// Gets the raw 2-bit mode field value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            ChannelMode::Stereo => 0,
            ChannelMode::JointStereo(_) => 1,
            ChannelMode::DualMono => 2,
            ChannelMode::Mono => 3,
        }
    }
}

/// The emphasis applied during encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Emphasis {
    /// No emphasis
    None,
    /// 50/15us
    Fifty15,
    /// CCIT J.17
    CcitJ17,
}

bitflags! {
    /// Single-bit fields of the frame header.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        /// A 16-bit CRC follows the header.
        const PROTECTED   = 1 << 0;
        /// The frame carries one extra slot.
        const PADDING     = 1 << 1;
        /// The private bit.
        const PRIVATE     = 1 << 2;
        const COPYRIGHTED = 1 << 3;
        const ORIGINAL    = 1 << 4;
    }
}

/// A MPEG 1, 2, or 2.5 audio frame header.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    /// The bitrate index, 1 to 14.
    pub bitrate_idx: u32,
    /// The bitrate in bits per second.
    pub bitrate: u32,
    pub sample_rate: u32,
    /// Index of the sample rate across all versions, 0 to 8 (44.1 kHz MPEG1 to 8 kHz MPEG2.5).
    pub sample_rate_idx: usize,
    pub channel_mode: ChannelMode,
    /// The raw 2-bit mode extension field.
    pub mode_extension: u32,
    pub emphasis: Emphasis,
    pub flags: FrameFlags,
    /// The size of the frame in bytes, excluding the 4-byte header word.
    pub frame_size: usize,
}

impl FrameHeader {
    /// Returns true if this a MPEG1 frame, false otherwise.
    #[inline(always)]
    pub fn is_mpeg1(&self) -> bool {
        self.version == MpegVersion::Mpeg1
    }

    /// Returns true if this a MPEG2.5 frame, false otherwise.
    #[inline(always)]
    pub fn is_mpeg2p5(&self) -> bool {
        self.version == MpegVersion::Mpeg2p5
    }

    #[inline(always)]
    pub fn has_crc(&self) -> bool {
        self.flags.contains(FrameFlags::PROTECTED)
    }

    #[inline(always)]
    pub fn has_padding(&self) -> bool {
        self.flags.contains(FrameFlags::PADDING)
    }

    #[inline(always)]
    pub fn is_copyrighted(&self) -> bool {
        self.flags.contains(FrameFlags::COPYRIGHTED)
    }

    #[inline(always)]
    pub fn is_original(&self) -> bool {
        self.flags.contains(FrameFlags::ORIGINAL)
    }

    /// Returns a signal specification for the frame.
    pub fn spec(&self) -> SignalSpec {
        SignalSpec::new(self.sample_rate, self.n_channels())
    }

    /// Returns the number of granules in the frame.
    #[inline(always)]
    pub fn n_granules(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 2,
            _ => 1,
        }
    }

    /// Returns the number of channels per granule.
    #[inline(always)]
    pub fn n_channels(&self) -> usize {
        self.channel_mode.count()
    }

    /// Returns the number of PCM samples per channel the frame decodes to.
    pub fn samples_per_frame(&self) -> usize {
        match self.layer {
            MpegLayer::Layer1 => 384,
            MpegLayer::Layer2 => 1152,
            MpegLayer::Layer3 => SAMPLES_PER_GRANULE * self.n_granules(),
        }
    }

    /// Returns the total length of the frame in bytes, including the header word.
    #[inline(always)]
    pub fn frame_len(&self) -> usize {
        self.frame_size + 4
    }

    /// Returns the playback duration of the frame in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        1000.0 * self.samples_per_frame() as f64 / f64::from(self.sample_rate)
    }

    /// Returns true if Intensity Stereo encoding is used, false otherwise.
    #[inline(always)]
    pub fn is_intensity_stereo(&self) -> bool {
        match self.channel_mode {
            ChannelMode::JointStereo(Mode::Intensity { .. }) => true,
            ChannelMode::JointStereo(Mode::Layer3 { intensity, .. }) => intensity,
            _ => false,
        }
    }

    /// Get the side information length.
    #[inline(always)]
    pub fn side_info_len(&self) -> usize {
        match (self.version, self.channel_mode) {
            (MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            (_, _) => 17,
        }
    }
}

/// A `Layer` decodes the body of one frame of a particular layer into subband samples, and drives
/// them through the synthesis filters into the output.
///
/// On success, and on any error other than the loss of the stream, a layer writes exactly
/// `header.samples_per_frame()` samples per output channel.
pub trait Layer {
    fn decode(
        &mut self,
        reader: &mut BufReader<'_>,
        header: &FrameHeader,
        out: &mut FrameOutput<'_>,
    ) -> Result<()>;

    /// Clears any state carried between frames.
    fn reset(&mut self) {}
}

/// Reading past the end of a frame body means the frame is malformed, not that the stream ended.
pub(crate) fn frame_data_error(err: Error) -> Error {
    match err {
        Error::StreamExhausted => Error::DecodeError("frame data exhausted"),
        err => err,
    }
}
