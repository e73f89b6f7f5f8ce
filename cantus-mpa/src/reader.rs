// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{Error, Result};
use cantus_core::io::ReadBytes;

use log::{debug, trace, warn};

use crate::common::*;
use crate::header::{parse_frame_header, sync_frame};
use crate::vbr::{read_vbr_info, VbrInfo};

/// `FrameReaderOptions` controls how a `FrameReader` locates frames.
#[derive(Copy, Clone, Debug)]
pub struct FrameReaderOptions {
    /// Skip an ID3v2 tag at the start of the stream.
    pub skip_id3v2: bool,
    /// The number of bytes scanned for a frame header before giving up with
    /// `Error::InvalidSync`.
    pub max_resync_bytes: u64,
    /// The total length of the stream in bytes, if known. Used to estimate the number of frames
    /// of a stream without a VBR tag.
    pub byte_len: Option<u64>,
}

impl Default for FrameReaderOptions {
    fn default() -> Self {
        FrameReaderOptions { skip_id3v2: true, max_resync_bytes: 64 * 1024, byte_len: None }
    }
}

/// A complete MPEG audio frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub header: FrameHeader,
    /// The frame body following the 4-byte header word.
    pub data: Box<[u8]>,
    /// The position of the header word in the stream.
    pub pos: u64,
}

/// `StreamInfo` describes a stream by its first audio frame and VBR tag.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub version: MpegVersion,
    pub layer: MpegLayer,
    pub channel_mode: ChannelMode,
    pub channels: usize,
    pub sample_rate: u32,
    /// The bitrate of the first frame in bits per second.
    pub bitrate: u32,
    /// The length of the first frame in bytes, including the header word.
    pub frame_len: usize,
    /// The number of frames per second.
    pub frame_rate: f64,
    pub ms_per_frame: f64,
    pub emphasis: Emphasis,
    pub is_copyrighted: bool,
    pub is_original: bool,
    pub has_crc: bool,
    pub has_padding: bool,
    /// The VBR tag of the stream, if there is one.
    pub vbr: Option<VbrInfo>,
    /// The number of audio frames in the stream, if known or estimable.
    pub total_frames: Option<u64>,
    /// The duration of the stream in milliseconds, if the number of frames is known.
    pub duration_ms: Option<f64>,
}

impl StreamInfo {
    fn new(frame: &Frame, vbr: Option<VbrInfo>, byte_len: Option<u64>) -> Self {
        let header = &frame.header;

        let total_frames = match vbr.as_ref().and_then(|vbr| vbr.frames) {
            Some(frames) => Some(u64::from(frames)),
            None => byte_len.map(|len| len.saturating_sub(frame.pos) / header.frame_len() as u64),
        };

        let ms_per_frame = header.duration_ms();

        StreamInfo {
            version: header.version,
            layer: header.layer,
            channel_mode: header.channel_mode,
            channels: header.n_channels(),
            sample_rate: header.sample_rate,
            bitrate: header.bitrate,
            frame_len: header.frame_len(),
            frame_rate: 1000.0 / ms_per_frame,
            ms_per_frame,
            emphasis: header.emphasis,
            is_copyrighted: header.is_copyrighted(),
            is_original: header.is_original(),
            has_crc: header.has_crc(),
            has_padding: header.has_padding(),
            vbr,
            total_frames,
            duration_ms: total_frames.map(|frames| frames as f64 * ms_per_frame),
        }
    }

    /// Returns true if the stream has a variable bitrate.
    pub fn is_vbr(&self) -> bool {
        self.vbr.as_ref().is_some_and(|vbr| vbr.is_vbr())
    }
}

/// `FrameReader` reads MPEG audio frames from a byte stream.
///
/// A leading ID3v2 tag is skipped, and the first frame is checked for a VBR tag. Any bytes
/// between frames that do not form a valid frame header are skipped.
pub struct FrameReader<R: ReadBytes> {
    reader: R,
    options: FrameReaderOptions,
    /// Bytes already read from the stream that may start a frame header.
    sync: u32,
    /// The position after the last frame read.
    next_pos: u64,
    frames_read: u64,
    info: Option<StreamInfo>,
}

impl<R: ReadBytes> FrameReader<R> {
    pub fn new(reader: R, options: FrameReaderOptions) -> Self {
        let next_pos = reader.pos();
        FrameReader { reader, options, sync: 0, next_pos, frames_read: 0, info: None }
    }

    /// Gets the stream information. Available once the first frame was read.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    /// Gets the number of audio frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Gets the position in the stream after the last frame read.
    pub fn pos(&self) -> u64 {
        self.next_pos
    }

    /// Unwraps the `FrameReader`, returning the underlying byte stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Skips an ID3v2 tag if the stream starts with one.
    fn skip_id3v2(&mut self) -> Result<()> {
        let mut marker = [0u8; 3];
        self.reader.read_buf_exact(&mut marker)?;

        if &marker != b"ID3" {
            // The bytes may be the start of a frame header.
            self.sync = u32::from_be_bytes([0, marker[0], marker[1], marker[2]]);
            self.next_pos = self.reader.pos() - 3;
            return Ok(());
        }

        let mut tag_header = [0u8; 7];
        self.reader.read_buf_exact(&mut tag_header)?;

        // The size is a 28-bit syncsafe integer that excludes the 10-byte header, and the 10-byte
        // footer if flagged.
        let size = tag_header[3..].iter().fold(0u64, |size, &b| (size << 7) | u64::from(b & 0x7f));
        let footer = if tag_header[2] & 0x10 != 0 { 10 } else { 0 };

        debug!("skipping id3v2 tag of {} bytes", 10 + size + footer);

        self.reader.ignore_bytes(size + footer)?;
        self.next_pos = self.reader.pos();

        Ok(())
    }

    /// Reads the next frame, whatever it holds.
    fn read_raw_frame(&mut self) -> Result<Frame> {
        loop {
            let sync = sync_frame(&mut self.reader, self.sync, self.options.max_resync_bytes)?;
            self.sync = 0;

            let pos = self.reader.pos() - 4;

            let header = match parse_frame_header(sync) {
                Ok(header) => header,
                Err(err) if err.is_recoverable() => {
                    // Keep scanning from the byte following the start of the rejected header.
                    warn!("skipping frame at {}: {}", pos, err);
                    self.sync = sync & 0x00ff_ffff;
                    continue;
                }
                Err(err) => return Err(err),
            };

            if pos > self.next_pos {
                warn!("skipped {} bytes of junk before frame at {}", pos - self.next_pos, pos);
            }

            trace!("frame at {}: {:?}", pos, header);

            let data = self.reader.read_boxed_slice_exact(header.frame_size)?;

            self.next_pos = pos + header.frame_len() as u64;

            return Ok(Frame { header, data, pos });
        }
    }

    /// Reads the first frame of the stream, and builds the stream information. A VBR tag frame is
    /// consumed, and the first audio frame is returned.
    fn read_first_frame(&mut self) -> Result<Frame> {
        if self.options.skip_id3v2 {
            self.skip_id3v2()?;
        }

        let first = self.read_raw_frame()?;

        let (frame, vbr) = match read_vbr_info(&first.header, &first.data) {
            Some(vbr) => (self.read_raw_frame()?, Some(vbr)),
            None => (first, None),
        };

        let info = StreamInfo::new(&frame, vbr, self.options.byte_len);

        debug!(
            "stream: mpeg{} layer {}, {} Hz, {} channel(s), {} kbit/s",
            info.version.as_str(),
            info.layer.number(),
            info.sample_rate,
            info.channels,
            info.bitrate / 1000,
        );

        self.info = Some(info);

        Ok(frame)
    }

    /// Reads the next audio frame.
    ///
    /// Returns `Error::StreamExhausted` at the end of the stream, and `Error::InvalidSync` if no
    /// frame header was found within the resync limit.
    pub fn next_frame(&mut self) -> Result<Frame> {
        let frame = match self.info {
            Some(_) => self.read_raw_frame()?,
            None => self.read_first_frame()?,
        };

        self.frames_read += 1;

        Ok(frame)
    }

    /// Skips up-to `count` audio frames. Returns the number of frames skipped, which is less than
    /// `count` only if the stream ended.
    pub fn skip_frames(&mut self, count: u64) -> Result<u64> {
        for skipped in 0..count {
            match self.next_frame() {
                Ok(_) => (),
                Err(Error::StreamExhausted) => return Ok(skipped),
                Err(err) => return Err(err),
            }
        }

        Ok(count)
    }
}
