// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Cantus crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! MPEG-1, MPEG-2, and MPEG-2.5 Layer I, II, and III audio decoding.
//!
//! A [`FrameReader`] splits a byte stream into frames, and a [`Decoder`] decodes each frame into
//! 16-bit PCM written to an [`OutputSink`](cantus_core::audio::OutputSink).

// Shared modules.
mod common;
mod equalizer;
mod header;
mod output;
mod reader;
mod synthesis;
mod vbr;

mod decoder;

// Shared layer 1 & 2 decoder support module.
#[cfg(any(feature = "mp1", feature = "mp2"))]
mod layer12;

// Layer-specific decoder modules.
#[cfg(feature = "mp1")]
mod layer1;
#[cfg(feature = "mp2")]
mod layer2;
#[cfg(feature = "mp3")]
mod layer3;

pub use common::{
    ChannelMode, Emphasis, FrameFlags, FrameHeader, Mode, MpegLayer, MpegVersion,
    SAMPLES_PER_GRANULE, SUBBANDS,
};
pub use decoder::{Decoder, DecoderParams, DecoderStats};
pub use equalizer::{Equalizer, EQ_BANDS};
pub use header::{check_header, parse_frame_header, sync_frame};
pub use output::OutputChannels;
pub use reader::{Frame, FrameReader, FrameReaderOptions, StreamInfo};
pub use vbr::{read_vbr_info, VbrInfo, VbrTagKind};
