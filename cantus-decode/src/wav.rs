// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, Write};

use cantus_core::audio::SignalSpec;

/// The length of the header written by `write_header`.
pub const HEADER_LEN: u32 = 44;

/// The data length written when the length is not known, as by streaming encoders.
pub const UNKNOWN_DATA_LEN: u32 = u32::MAX - HEADER_LEN;

const BITS_PER_SAMPLE: u16 = 16;

/// Writes a RIFF/WAVE header for 16-bit PCM followed by `data_len` bytes of samples.
pub fn write_header<W: Write>(writer: &mut W, spec: SignalSpec, data_len: u32) -> io::Result<()> {
    let channels = spec.channels as u16;
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = spec.rate * u32::from(block_align);

    let mut header = Vec::with_capacity(HEADER_LEN as usize);

    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(data_len.saturating_add(HEADER_LEN - 8)).to_le_bytes());
    header.extend_from_slice(b"WAVE");

    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    // PCM
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&spec.rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());

    writer.write_all(&header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_stereo_header() {
        let mut buf = Vec::new();
        write_header(&mut buf, SignalSpec::new(44100, 2), 4608).unwrap();

        assert_eq!(buf.len(), HEADER_LEN as usize);
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(&buf[4..8], &(4608u32 + 36).to_le_bytes());
        assert_eq!(&buf[22..24], &2u16.to_le_bytes());
        assert_eq!(&buf[24..28], &44100u32.to_le_bytes());
        assert_eq!(&buf[28..32], &176_400u32.to_le_bytes());
        assert_eq!(&buf[32..34], &4u16.to_le_bytes());
        assert_eq!(&buf[36..40], b"data");
        assert_eq!(&buf[40..44], &4608u32.to_le_bytes());
    }

    #[test]
    fn verify_unknown_length() {
        let mut buf = Vec::new();
        write_header(&mut buf, SignalSpec::new(8000, 1), UNKNOWN_DATA_LEN).unwrap();

        assert_eq!(&buf[4..8], &(u32::MAX - 8).to_le_bytes());
        assert_eq!(&buf[28..32], &16_000u32.to_le_bytes());
    }
}
