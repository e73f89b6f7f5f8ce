// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Xing, Info, and VBRI tags.
//!
//! Encoders write a tag into the first frame of a stream in place of audio. The tag gives the
//! number of frames and bytes in the stream, and optionally a seek table. A Xing tag is written
//! for VBR streams, an Info tag for CBR streams, and a VBRI tag by the Fraunhofer encoder.

use std::io;

use cantus_core::io::{BufReader, ReadBytes};

use log::debug;

use crate::common::{FrameHeader, MpegLayer};

/// The offset of a VBRI tag from the end of the frame header.
const VBRI_OFFSET: usize = 32;

/// The kind of tag found in the first frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VbrTagKind {
    Xing,
    Info,
    Vbri,
}

/// The contents of a Xing, Info, or VBRI tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VbrInfo {
    pub kind: VbrTagKind,
    /// The number of audio frames in the stream, excluding the tag frame.
    pub frames: Option<u32>,
    /// The number of bytes in the stream.
    pub bytes: Option<u32>,
    /// The Xing seek table. Entry `i` is the position, in 1/256ths of the stream, where `i`
    /// percent of the duration has elapsed.
    pub toc: Option<Box<[u8; 100]>>,
    /// Encoding quality, 0 (best) to 100 (worst).
    pub scale: Option<u32>,
}

impl VbrInfo {
    /// Returns true if the tag describes a variable bitrate stream. Info tags are only written
    /// for constant bitrate streams.
    pub fn is_vbr(&self) -> bool {
        self.kind != VbrTagKind::Info
    }
}

fn read_xing<B: ReadBytes>(reader: &mut B, kind: VbrTagKind) -> io::Result<VbrInfo> {
    let flags = reader.read_be_u32()?;

    let frames = if flags & 0x1 != 0 { Some(reader.read_be_u32()?) } else { None };
    let bytes = if flags & 0x2 != 0 { Some(reader.read_be_u32()?) } else { None };

    let toc = if flags & 0x4 != 0 {
        let mut toc = Box::new([0u8; 100]);
        reader.read_buf_exact(&mut toc[..])?;
        Some(toc)
    }
    else {
        None
    };

    let scale = if flags & 0x8 != 0 { Some(reader.read_be_u32()?) } else { None };

    Ok(VbrInfo { kind, frames, bytes, toc, scale })
}

fn read_vbri<B: ReadBytes>(reader: &mut B) -> io::Result<VbrInfo> {
    let _version = reader.read_be_u16()?;
    let _delay = reader.read_be_u16()?;
    let quality = reader.read_be_u16()?;
    let bytes = reader.read_be_u32()?;
    let frames = reader.read_be_u32()?;

    Ok(VbrInfo {
        kind: VbrTagKind::Vbri,
        frames: Some(frames),
        bytes: Some(bytes),
        toc: None,
        scale: Some(u32::from(quality)),
    })
}

/// Tries to read a Xing, Info, or VBRI tag from the body of the first frame of a stream. Returns
/// `None` if the frame does not carry a tag.
pub fn read_vbr_info(header: &FrameHeader, body: &[u8]) -> Option<VbrInfo> {
    // Tags are only written into Layer III frames.
    if header.layer != MpegLayer::Layer3 {
        return None;
    }

    // The Xing tag follows the CRC and the side information, which is zeroed.
    let xing_offset = header.side_info_len() + if header.has_crc() { 2 } else { 0 };

    let xing = |kind| read_xing(&mut BufReader::new(&body[xing_offset + 4..]), kind);

    let result = match body.get(xing_offset..xing_offset + 4) {
        Some(b"Xing") => xing(VbrTagKind::Xing),
        Some(b"Info") => xing(VbrTagKind::Info),
        _ => match body.get(VBRI_OFFSET..VBRI_OFFSET + 4) {
            Some(b"VBRI") => read_vbri(&mut BufReader::new(&body[VBRI_OFFSET + 4..])),
            _ => return None,
        },
    };

    match result {
        Ok(info) => {
            debug!("found {:?} tag: frames={:?}, bytes={:?}", info.kind, info.frames, info.bytes);
            Some(info)
        }
        Err(err) => {
            debug!("ignoring truncated vbr tag: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;

    fn first_frame(header: &FrameHeader) -> Vec<u8> {
        vec![0; header.frame_size]
    }

    #[test]
    fn verify_xing_tag() {
        // MPEG1 layer 3, 128 kbit/s, 44.1 kHz, joint stereo.
        let header = parse_frame_header(0xfffb_9064).unwrap();
        let mut body = first_frame(&header);

        let tag = [
            &b"Xing"[..],
            &0x0000_000bu32.to_be_bytes(),
            &1234u32.to_be_bytes(),
            &567_890u32.to_be_bytes(),
            &78u32.to_be_bytes(),
        ]
        .concat();

        body[32..32 + tag.len()].copy_from_slice(&tag);

        let info = read_vbr_info(&header, &body).unwrap();

        assert_eq!(info.kind, VbrTagKind::Xing);
        assert!(info.is_vbr());
        assert_eq!(info.frames, Some(1234));
        assert_eq!(info.bytes, Some(567_890));
        assert_eq!(info.toc, None);
        assert_eq!(info.scale, Some(78));
    }

    #[test]
    fn verify_info_tag_with_toc() {
        // MPEG1 layer 3, 128 kbit/s, 44.1 kHz, mono.
        let header = parse_frame_header(0xfffb_90c4).unwrap();
        let mut body = first_frame(&header);

        let toc: Vec<u8> = (0..100).map(|i| (i * 2) as u8).collect();
        let tag =
            [&b"Info"[..], &0x0000_0005u32.to_be_bytes(), &99u32.to_be_bytes(), &toc[..]].concat();

        body[17..17 + tag.len()].copy_from_slice(&tag);

        let info = read_vbr_info(&header, &body).unwrap();

        assert_eq!(info.kind, VbrTagKind::Info);
        assert!(!info.is_vbr());
        assert_eq!(info.frames, Some(99));
        assert_eq!(info.bytes, None);
        assert_eq!(info.toc.as_ref().map(|toc| toc[50]), Some(100));
    }

    #[test]
    fn verify_vbri_tag() {
        let header = parse_frame_header(0xfffb_9064).unwrap();
        let mut body = first_frame(&header);

        let tag = [
            &b"VBRI"[..],
            &1u16.to_be_bytes(),
            &0u16.to_be_bytes(),
            &75u16.to_be_bytes(),
            &1_000_000u32.to_be_bytes(),
            &4000u32.to_be_bytes(),
        ]
        .concat();

        body[32..32 + tag.len()].copy_from_slice(&tag);

        // The VBRI tag shares its offset with the Xing tag of stereo MPEG1 frames.
        let info = read_vbr_info(&header, &body).unwrap();

        assert_eq!(info.kind, VbrTagKind::Vbri);
        assert_eq!(info.frames, Some(4000));
        assert_eq!(info.bytes, Some(1_000_000));
        assert_eq!(info.scale, Some(75));
    }

    #[test]
    fn verify_no_tag() {
        let header = parse_frame_header(0xfffb_9064).unwrap();
        assert_eq!(read_vbr_info(&header, &first_frame(&header)), None);

        // A tag cut short by the end of the frame is ignored.
        let mut body = vec![0u8; 40];
        body[32..36].copy_from_slice(b"Xing");
        assert_eq!(read_vbr_info(&header, &body), None);
    }
}
