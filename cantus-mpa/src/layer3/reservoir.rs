// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{decode_error, Result};

use log::warn;

/// The capacity of the reservoir. The largest frame body (1441 bytes at 320 kbit/s, 32 kHz) plus
/// the largest back-reference (511 bytes) fits.
const RESERVOIR_CAPACITY: usize = 2048;

/// `BitReservoir` holds the main data of the current frame, prefixed by the unused tail of the
/// main data of preceding frames that the current frame references through `main_data_begin`.
pub struct BitReservoir {
    buf: Box<[u8]>,
    len: usize,
    consumed: usize,
}

impl Default for BitReservoir {
    fn default() -> Self {
        BitReservoir { buf: vec![0; RESERVOIR_CAPACITY].into_boxed_slice(), len: 0, consumed: 0 }
    }
}

impl BitReservoir {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends the main data of a frame to the reservoir, keeping the last `main_data_begin`
    /// unread bytes of previous frames in front of it.
    ///
    /// Returns the number of referenced bytes that were not available. A non-zero value means the
    /// first bytes of the frame's main data are lost, as happens when decoding starts mid-stream.
    /// On error the reservoir is left untouched.
    pub fn fill(&mut self, main_data: &[u8], main_data_begin: usize) -> Result<usize> {
        if main_data_begin + main_data.len() > self.buf.len() {
            return decode_error("main data exceeds the bit reservoir");
        }

        let unread = self.len - self.consumed;
        let reused = main_data_begin.min(unread);

        self.buf.copy_within(self.len - reused..self.len, 0);
        self.buf[reused..reused + main_data.len()].copy_from_slice(main_data);

        self.len = reused + main_data.len();
        self.consumed = 0;

        let missing = main_data_begin - reused;

        if missing > 0 {
            warn!("bit reservoir underrun by {} bytes", missing);
        }

        Ok(missing)
    }

    /// Gets the bytes of the reservoir that were not yet consumed.
    pub fn bytes_ref(&self) -> &[u8] {
        &self.buf[self.consumed..self.len]
    }

    /// Marks `len` bytes as consumed by the current frame.
    pub fn consume(&mut self, len: usize) {
        self.consumed = self.len.min(self.consumed + len);
    }

    /// Gets the number of bytes available to the next frame.
    pub fn available(&self) -> usize {
        self.len - self.consumed
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_reservoir_carries_unused_tail() {
        let mut reservoir = BitReservoir::new();

        assert_eq!(reservoir.fill(&[1, 2, 3, 4, 5], 0).unwrap(), 0);
        assert_eq!(reservoir.bytes_ref(), &[1, 2, 3, 4, 5]);

        // The first frame used 3 of its 5 bytes.
        reservoir.consume(3);
        assert_eq!(reservoir.available(), 2);

        assert_eq!(reservoir.fill(&[6, 7], 2).unwrap(), 0);
        assert_eq!(reservoir.bytes_ref(), &[4, 5, 6, 7]);

        // Referencing fewer bytes than are left over drops the oldest ones.
        reservoir.consume(3);
        assert_eq!(reservoir.fill(&[8], 0).unwrap(), 0);
        assert_eq!(reservoir.bytes_ref(), &[8]);
    }

    #[test]
    fn verify_reservoir_underrun() {
        let mut reservoir = BitReservoir::new();

        assert_eq!(reservoir.fill(&[1, 2], 0).unwrap(), 0);
        reservoir.consume(1);

        // Three bytes are referenced, but only one is available.
        assert_eq!(reservoir.fill(&[3, 4], 3).unwrap(), 2);
        assert_eq!(reservoir.bytes_ref(), &[2, 3, 4]);

        reservoir.clear();
        assert_eq!(reservoir.fill(&[5], 10).unwrap(), 10);
        assert_eq!(reservoir.bytes_ref(), &[5]);
    }

    #[test]
    fn verify_reservoir_overflow_is_rejected() {
        let mut reservoir = BitReservoir::new();

        assert_eq!(reservoir.fill(&[9; 16], 0).unwrap(), 0);
        assert!(reservoir.fill(&[0; RESERVOIR_CAPACITY], 1).is_err());

        // The previous contents survive the failed fill.
        assert_eq!(reservoir.bytes_ref(), &[9; 16]);
    }
}
