// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte and bit readers.
//!
//! Frames are pulled from a [`SourceStream`] wrapping any [`std::io::Read`]. Once a frame is in
//! memory, its body is read with a [`BufReader`], and its bit fields with a [`BitReaderLtr`],
//! most significant bit first.

use std::io;

mod bit;
mod buf_reader;
mod source_stream;

pub use bit::*;
pub use buf_reader::BufReader;
pub use source_stream::{SourceStream, SourceStreamOptions};

/// `ReadBytes` reads bytes, and big-endian integers, from a byte source. Running out of bytes is
/// an [`io::ErrorKind::UnexpectedEof`] error.
pub trait ReadBytes {
    /// Reads one byte.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Fills `buf` completely.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Skips `count` bytes.
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()>;

    /// Gets the number of bytes read from the start of the source.
    fn pos(&self) -> u64;

    #[inline(always)]
    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    #[inline(always)]
    fn read_be_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    #[inline(always)]
    fn read_be_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads `len` bytes into a new boxed slice.
    fn read_boxed_slice_exact(&mut self, len: usize) -> io::Result<Box<[u8]>> {
        let mut buf = vec![0u8; len].into_boxed_slice();
        self.read_buf_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: ReadBytes> ReadBytes for &mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        (**self).read_byte()
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        (**self).ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}
