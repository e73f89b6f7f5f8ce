// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides the PCM output sink abstraction and a default sample buffer.

/// The maximum number of channels an `OutputSink` is asked to hold.
pub const MAX_CHANNELS: usize = 2;

/// `SignalSpec` describes the PCM produced by a decoder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SignalSpec {
    /// The sample rate in Hz.
    pub rate: u32,
    /// The number of channels, 1 or 2.
    pub channels: usize,
}

impl SignalSpec {
    pub fn new(rate: u32, channels: usize) -> Self {
        SignalSpec { rate, channels }
    }
}

/// Converts a PCM sample in the 16-bit signed range, represented as a float, to `i16`, clamping
/// out-of-range values.
#[inline(always)]
pub fn clamp_i16(sample: f32) -> i16 {
    sample.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// An `OutputSink` is the destination decoded PCM samples are written into.
///
/// A decoder writes every sample of a channel in order, and the channels of a frame in any order.
/// The decoder never reads samples back.
pub trait OutputSink {
    /// Called when the decoder initializes, and again if the stream's signal changes.
    fn configure(&mut self, _spec: SignalSpec) {}

    /// Appends a single 16-bit PCM sample to a channel.
    fn append_sample(&mut self, channel: usize, sample: i16);

    /// Appends a block of 32 PCM samples to a channel. The samples are in the 16-bit signed range.
    fn append_samples(&mut self, channel: usize, samples: &[f32; 32]) {
        for &sample in samples {
            self.append_sample(channel, clamp_i16(sample));
        }
    }

    /// Rewinds the write cursors to the start of the buffer.
    fn clear(&mut self);

    /// Gets the number of bytes written since the last `clear`.
    fn current_size(&self) -> usize;
}

/// A `SampleBuffer` stores interleaved 16-bit PCM samples for one decoded frame. It keeps one
/// write cursor per channel, so the channels of a frame may be written one after the other.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    buf: Vec<i16>,
    cursors: [usize; MAX_CHANNELS],
    spec: SignalSpec,
}

impl SampleBuffer {
    /// The number of samples per channel in the largest MPEG audio frame.
    const FRAME_CAPACITY: usize = 1152;

    /// Instantiate a new `SampleBuffer` for the given signal specification.
    pub fn new(spec: SignalSpec) -> Self {
        let mut sample_buf = SampleBuffer { buf: Vec::new(), cursors: [0; MAX_CHANNELS], spec };
        sample_buf.configure(spec);
        sample_buf
    }

    /// Gets the signal specification of the buffer.
    pub fn spec(&self) -> SignalSpec {
        self.spec
    }

    /// Gets the number of complete interleaved frames (one sample for every channel) written.
    pub fn frames(&self) -> usize {
        let channels = self.spec.channels.max(1);

        (0..channels).map(|ch| (self.cursors[ch] - ch) / channels).min().unwrap_or(0)
    }

    /// Gets the interleaved samples written since the last `clear`.
    pub fn samples(&self) -> &[i16] {
        &self.buf[..self.frames() * self.spec.channels.max(1)]
    }

    /// Appends the written samples to `out` as little-endian bytes.
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(2 * self.samples().len());

        for sample in self.samples() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        SampleBuffer::new(SignalSpec::new(0, 2))
    }
}

impl OutputSink for SampleBuffer {
    fn configure(&mut self, spec: SignalSpec) {
        assert!(spec.channels > 0 && spec.channels <= MAX_CHANNELS);

        self.spec = spec;
        self.buf = vec![0; Self::FRAME_CAPACITY * spec.channels];
        self.clear();
    }

    #[inline(always)]
    fn append_sample(&mut self, channel: usize, sample: i16) {
        let pos = self.cursors[channel];

        if pos >= self.buf.len() {
            self.buf.resize(pos + self.spec.channels, 0);
        }

        self.buf[pos] = sample;
        self.cursors[channel] += self.spec.channels;
    }

    fn clear(&mut self) {
        for (ch, cursor) in self.cursors.iter_mut().enumerate() {
            *cursor = ch;
        }
    }

    fn current_size(&self) -> usize {
        2 * self.samples().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_sample_buffer_interleaves() {
        let mut buf = SampleBuffer::new(SignalSpec::new(44100, 2));

        let left = [1000.0f32; 32];
        let right = [-40000.0f32; 32];

        buf.append_samples(0, &left);

        // Only the left channel is complete, so no interleaved frames are available yet.
        assert_eq!(buf.frames(), 0);

        buf.append_samples(1, &right);

        assert_eq!(buf.frames(), 32);
        assert_eq!(buf.current_size(), 128);
        assert_eq!(&buf.samples()[..4], &[1000, i16::MIN, 1000, i16::MIN]);

        buf.clear();

        assert_eq!(buf.frames(), 0);
        assert!(buf.samples().is_empty());
    }

    #[test]
    fn verify_sample_buffer_grows() {
        let mut buf = SampleBuffer::new(SignalSpec::new(8000, 1));

        for _ in 0..40 {
            buf.append_samples(0, &[0.5; 32]);
        }

        assert_eq!(buf.frames(), 1280);

        let mut bytes = Vec::new();
        buf.write_le_bytes(&mut bytes);

        assert_eq!(bytes.len(), 2560);
    }
}
