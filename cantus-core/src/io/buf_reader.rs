// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use super::ReadBytes;

fn out_of_bytes<T>() -> io::Result<T> {
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "frame body exhausted"))
}

/// `BufReader` reads a byte slice, typically the body of one frame. Slices of the body can be
/// borrowed without copying.
pub struct BufReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BufReader { buf, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Borrows the next `len` bytes.
    pub fn read_buf_bytes_ref(&mut self, len: usize) -> io::Result<&'a [u8]> {
        match self.remaining().get(..len) {
            Some(bytes) => {
                self.pos += len;
                Ok(bytes)
            }
            None => out_of_bytes(),
        }
    }

    /// Borrows every byte not yet read, leaving the reader at the end.
    pub fn read_buf_bytes_available_ref(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.pos = self.buf.len();
        rest
    }
}

impl ReadBytes for BufReader<'_> {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        Ok(self.read_buf_bytes_ref(1)?[0])
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        buf.copy_from_slice(self.read_buf_bytes_ref(buf.len())?);
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        let len = usize::try_from(count).unwrap_or(usize::MAX);
        self.read_buf_bytes_ref(len).map(|_| ())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.pos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_buf_reader_reads() {
        let mut reader = BufReader::new(&[0xff, 0xfb, 0x90, 0x64, 0x01, 0x02]);

        assert_eq!(reader.read_be_u32().unwrap(), 0xfffb_9064);
        assert_eq!(reader.pos(), 4);
        assert_eq!(reader.read_buf_bytes_ref(1).unwrap(), &[0x01]);
        assert!(reader.read_be_u16().is_err());
        assert_eq!(reader.read_buf_bytes_available_ref(), &[0x02]);
        assert!(reader.ignore_bytes(1).is_err());
        assert!(reader.ignore_bytes(0).is_ok());
    }
}
