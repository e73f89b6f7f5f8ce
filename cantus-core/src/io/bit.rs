// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

fn out_of_bits<T>() -> io::Result<T> {
    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bit stream exhausted"))
}

/// A bit source with a known number of bits remaining.
pub trait FiniteBitStream {
    /// Gets the number of bits not yet read.
    fn bits_left(&self) -> u64;
}

/// `ReadBitsLtr` reads bit fields most-significant bit first.
pub trait ReadBitsLtr {
    /// Reads `bit_width` bits, up-to 32, as an unsigned integer. Fails if fewer bits remain.
    fn read_bits_leq32(&mut self, bit_width: u32) -> io::Result<u32>;

    /// Skips `num_bits` bits. Fails, skipping nothing, if fewer bits remain.
    fn ignore_bits(&mut self, num_bits: u32) -> io::Result<()>;

    #[inline(always)]
    fn read_bit(&mut self) -> io::Result<bool> {
        Ok(self.read_bits_leq32(1)? == 1)
    }
}

/// `BitReaderLtr` reads bit fields from a byte slice, most-significant bit first. The first bit
/// read from a field of N bits is bit N-1 of the value.
#[derive(Clone)]
pub struct BitReaderLtr<'a> {
    /// Bytes not yet loaded into the cache.
    buf: &'a [u8],
    /// Cached bits, left-aligned. Bits below the cached ones are 0.
    cache: u64,
    /// The number of bits in the cache.
    cached: u32,
}

impl<'a> BitReaderLtr<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BitReaderLtr { buf, cache: 0, cached: 0 }
    }

    /// Loads whole bytes into the cache until it holds more than 56 bits, or the buffer is
    /// empty.
    #[inline(always)]
    fn refill(&mut self) {
        while self.cached <= 56 {
            match self.buf.split_first() {
                Some((&byte, rest)) => {
                    self.cache |= u64::from(byte) << (56 - self.cached);
                    self.cached += 8;
                    self.buf = rest;
                }
                None => break,
            }
        }
    }

    /// Drops `n < 64` bits from the cache.
    #[inline(always)]
    fn consume(&mut self, n: u32) {
        self.cache <<= n;
        self.cached -= n;
    }

    /// Returns the next `bit_width` bits (up-to 32) without consuming them. Bits past the end of
    /// the buffer read as 0.
    #[inline(always)]
    pub fn peek_bits_leq32(&self, bit_width: u32) -> u32 {
        debug_assert!(bit_width <= u32::BITS);

        if bit_width == 0 {
            return 0;
        }

        let mut bits = self.cache;
        let mut n_bits = self.cached;

        // Bytes are only appended while fewer than 32 bits are cached, so the shift never
        // underflows.
        for &byte in self.buf.iter().take(((bit_width.saturating_sub(n_bits) + 7) >> 3) as usize) {
            bits |= u64::from(byte) << (56 - n_bits);
            n_bits += 8;
        }

        (bits >> (u64::BITS - bit_width)) as u32
    }
}

impl ReadBitsLtr for BitReaderLtr<'_> {
    #[inline(always)]
    fn read_bits_leq32(&mut self, bit_width: u32) -> io::Result<u32> {
        debug_assert!(bit_width <= u32::BITS);

        if bit_width == 0 {
            return Ok(0);
        }

        if self.cached < bit_width {
            self.refill();

            if self.cached < bit_width {
                return out_of_bits();
            }
        }

        let value = (self.cache >> (u64::BITS - bit_width)) as u32;
        self.consume(bit_width);

        Ok(value)
    }

    fn ignore_bits(&mut self, mut num_bits: u32) -> io::Result<()> {
        if u64::from(num_bits) > self.bits_left() {
            return out_of_bits();
        }

        if num_bits >= self.cached {
            // Drop the cache, then skip whole bytes without loading them.
            let rest = num_bits - self.cached;

            self.cache = 0;
            self.cached = 0;
            self.buf = &self.buf[(rest >> 3) as usize..];
            self.refill();

            num_bits = rest & 0x7;
        }

        self.consume(num_bits);

        Ok(())
    }
}

impl FiniteBitStream for BitReaderLtr<'_> {
    fn bits_left(&self) -> u64 {
        8 * self.buf.len() as u64 + u64::from(self.cached)
    }
}

#[cfg(test)]
mod tests {
    use super::{BitReaderLtr, FiniteBitStream, ReadBitsLtr};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn verify_bitreaderltr_ignore_bits() {
        let mut bs = BitReaderLtr::new(&[
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
            0xc0, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00, 0x0a, //
        ]);

        assert!(bs.read_bit().unwrap());

        bs.ignore_bits(128).unwrap();

        assert!(bs.read_bit().unwrap());
        assert!(!bs.read_bit().unwrap());
        assert!(!bs.read_bit().unwrap());

        bs.ignore_bits(7).unwrap();

        assert!(bs.read_bit().unwrap());

        bs.ignore_bits(19).unwrap();

        assert!(bs.read_bit().unwrap());

        bs.ignore_bits(28).unwrap();

        assert!(bs.read_bit().unwrap());
        assert!(!bs.read_bit().unwrap());
        assert!(bs.read_bit().unwrap());
        assert!(!bs.read_bit().unwrap());

        // Lower limit test.
        let mut bs = BitReaderLtr::new(&[]);

        assert!(bs.ignore_bits(0).is_ok());
        assert!(bs.ignore_bits(1).is_err());
    }

    #[test]
    fn verify_bitreaderltr_read_bits_leq32() {
        let mut bs = BitReaderLtr::new(&[0b1010_0101, 0b0111_1110, 0b1101_0011]);

        assert_eq!(bs.read_bits_leq32(4).unwrap(), 0b0000_0000_0000_1010);
        assert_eq!(bs.read_bits_leq32(4).unwrap(), 0b0000_0000_0000_0101);
        assert_eq!(bs.read_bits_leq32(13).unwrap(), 0b0000_1111_1101_1010);
        assert_eq!(bs.read_bits_leq32(3).unwrap(), 0b0000_0000_0000_0011);

        // Upper limit test.
        let mut bs = BitReaderLtr::new(&[0xff, 0xff, 0xff, 0xff, 0x01]);

        assert_eq!(bs.read_bits_leq32(32).unwrap(), u32::MAX);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0x01);

        // Cache fetch test.
        let mut bs = BitReaderLtr::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);

        assert_eq!(bs.read_bits_leq32(32).unwrap(), u32::MAX);
        assert_eq!(bs.read_bits_leq32(28).unwrap(), 0x0fff_ffff);
        assert_eq!(bs.read_bits_leq32(12).unwrap(), 0xf01);

        // Exhaustion.
        let mut bs = BitReaderLtr::new(&[0xff]);

        assert!(bs.read_bits_leq32(9).is_err());
    }

    #[test]
    fn verify_bitreaderltr_peek_bits_leq32() {
        let mut bs = BitReaderLtr::new(&[0b1011_0011, 0b1000_1111, 0xaa]);

        assert_eq!(bs.peek_bits_leq32(0), 0);
        assert_eq!(bs.peek_bits_leq32(3), 0b101);
        assert_eq!(bs.peek_bits_leq32(12), 0b1011_0011_1000);

        bs.ignore_bits(5).unwrap();

        assert_eq!(bs.peek_bits_leq32(8), 0b0111_0001);

        // Peeking does not consume.
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0b0111_0001);

        // Past the end of the buffer, bits read as 0.
        assert_eq!(bs.peek_bits_leq32(16), 0b1111_0101_0100_0000);
        assert_eq!(bs.bits_left(), 11);
    }

    #[test]
    fn verify_bitreaderltr_random_fields() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        // Generate random fields, pack them most-significant bit first, then read them back.
        let fields: Vec<(u32, u32)> = (0..500)
            .map(|_| {
                let width = rng.random_range(1..=32u32);
                let value = rng.random::<u32>() >> (32 - width);
                (width, value)
            })
            .collect();

        let mut bytes = Vec::new();
        let mut acc = 0u64;
        let mut n_acc = 0u32;

        for &(width, value) in &fields {
            acc = (acc << width) | u64::from(value);
            n_acc += width;

            while n_acc >= 8 {
                bytes.push((acc >> (n_acc - 8)) as u8);
                n_acc -= 8;
            }
        }

        if n_acc > 0 {
            bytes.push((acc << (8 - n_acc)) as u8);
        }

        let mut bs = BitReaderLtr::new(&bytes);

        for &(width, value) in &fields {
            assert_eq!(bs.peek_bits_leq32(width), value);
            assert_eq!(bs.read_bits_leq32(width).unwrap(), value);
        }
    }
}
