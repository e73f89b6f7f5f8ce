// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::Read;

use super::ReadBytes;

const END_OF_STREAM_ERROR_STR: &str = "end of stream";

/// `SourceStreamOptions` specifies the buffering behaviour of a `SourceStream`.
pub struct SourceStreamOptions {
    /// The buffer size. Must be > 0.
    pub buffer_len: usize,
    /// The total length of the source in bytes, if known.
    pub byte_len: Option<u64>,
}

impl Default for SourceStreamOptions {
    fn default() -> Self {
        SourceStreamOptions { buffer_len: 32 * 1024, byte_len: None }
    }
}

/// A `SourceStream` is the byte source for Cantus. It wraps any [`std::io::Read`]er and pulls
/// bytes from it on demand, buffering reads to amortize the overhead of the inner reader over many
/// bytes.
///
/// `SourceStream` never blocks past the end of the inner reader. Once the inner reader is
/// exhausted, all reads return an [`io::ErrorKind::UnexpectedEof`] error, which is surfaced as
/// `Error::StreamExhausted`.
pub struct SourceStream<R: Read> {
    /// The source reader.
    inner: R,
    /// The read-ahead buffer.
    buf: Box<[u8]>,
    /// The read position within the buffer.
    read_pos: usize,
    /// The end of valid data within the buffer.
    end_pos: usize,
    /// Absolute position of the stream, in bytes consumed.
    abs_pos: u64,
    /// The total length of the source, if known.
    byte_len: Option<u64>,
    /// Set once the inner reader returns no more data.
    is_eof: bool,
}

impl<R: Read> SourceStream<R> {
    pub fn new(inner: R, options: SourceStreamOptions) -> Self {
        assert!(options.buffer_len > 0);

        SourceStream {
            inner,
            buf: vec![0; options.buffer_len].into_boxed_slice(),
            read_pos: 0,
            end_pos: 0,
            abs_pos: 0,
            byte_len: options.byte_len,
            is_eof: false,
        }
    }

    /// Gets the total length of the source in bytes, if known.
    pub fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }

    /// Gets a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwraps this `SourceStream`, returning the underlying reader. Any buffered data is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Get the number of bytes buffered but not yet read.
    #[inline(always)]
    pub fn unread_buffer_len(&self) -> usize {
        self.end_pos - self.read_pos
    }

    /// If the buffer has been exhausted, fetch a new block of data to replenish the buffer.
    fn fetch(&mut self) -> io::Result<()> {
        if self.read_pos == self.end_pos && !self.is_eof {
            let len = loop {
                match self.inner.read(&mut self.buf) {
                    Ok(len) => break len,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            };

            self.read_pos = 0;
            self.end_pos = len;
            self.is_eof = len == 0;
        }

        Ok(())
    }

    /// If the buffer has been exhausted, fetch a new block of data to replenish the buffer. If
    /// no more data could be fetched, return an end-of-stream error.
    fn fetch_or_eof(&mut self) -> io::Result<()> {
        self.fetch()?;

        if self.read_pos == self.end_pos {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
        }

        Ok(())
    }

    #[inline(always)]
    fn consume(&mut self, len: usize) {
        self.read_pos += len;
        self.abs_pos += len as u64;
    }
}

impl<R: Read> ReadBytes for SourceStream<R> {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.read_pos == self.end_pos {
            self.fetch_or_eof()?;
        }

        let value = self.buf[self.read_pos];
        self.consume(1);

        Ok(value)
    }

    fn read_buf_exact(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.fetch_or_eof()?;

            let len = cmp::min(self.unread_buffer_len(), buf.len());
            buf[..len].copy_from_slice(&self.buf[self.read_pos..self.read_pos + len]);
            self.consume(len);

            buf = &mut buf[len..];
        }

        Ok(())
    }

    fn ignore_bytes(&mut self, mut count: u64) -> io::Result<()> {
        while count > 0 {
            self.fetch_or_eof()?;

            let len = cmp::min(self.unread_buffer_len() as u64, count) as usize;
            self.consume(len);

            count -= len as u64;
        }

        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.abs_pos
    }
}
