// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::audio::OutputSink;

use crate::common::SUBBANDS;
use crate::synthesis::SynthesisFilter;

/// Selects which channels of the stream are written to the output sink.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputChannels {
    /// Every channel of the stream.
    #[default]
    Both,
    /// Only the left channel of a stereo stream, as mono.
    Left,
    /// Only the right channel of a stereo stream, as mono.
    Right,
    /// The average of both channels of a stereo stream, as mono.
    Downmix,
}

impl OutputChannels {
    /// Gets the number of output channels given the number of channels in the stream.
    pub fn count(&self, source_channels: usize) -> usize {
        match self {
            OutputChannels::Both => source_channels,
            _ => 1,
        }
    }
}

/// One time slot of subband samples, a vector of 32 subband samples per channel.
pub type SubbandSlot = [[f32; SUBBANDS]; 2];

/// `FrameOutput` routes the subband samples a layer decoder produces through the synthesis
/// filters and into the output sink.
pub struct FrameOutput<'a> {
    filters: &'a mut [SynthesisFilter; 2],
    routing: OutputChannels,
    sink: &'a mut dyn OutputSink,
    concealed: usize,
}

impl<'a> FrameOutput<'a> {
    pub fn new(
        filters: &'a mut [SynthesisFilter; 2],
        routing: OutputChannels,
        sink: &'a mut dyn OutputSink,
    ) -> Self {
        FrameOutput { filters, routing, sink, concealed: 0 }
    }

    /// Records that `granules` granules of the frame were replaced by silence.
    pub fn conceal(&mut self, granules: usize) {
        self.concealed += granules;
    }

    /// Gets the number of granules of the frame that were replaced by silence.
    pub fn concealed(&self) -> usize {
        self.concealed
    }

    /// Synthesizes one time slot. `n_channels` is the number of channels in the stream and
    /// selects how many vectors of `slot` are valid.
    pub fn write_slot(&mut self, slot: &SubbandSlot, n_channels: usize) {
        if n_channels == 1 {
            self.filters[0].input_samples(&slot[0], &mut *self.sink);
            return;
        }

        match self.routing {
            OutputChannels::Both => {
                self.filters[0].input_samples(&slot[0], &mut *self.sink);
                self.filters[1].input_samples(&slot[1], &mut *self.sink);
            }
            OutputChannels::Left => self.filters[0].input_samples(&slot[0], &mut *self.sink),
            OutputChannels::Right => self.filters[0].input_samples(&slot[1], &mut *self.sink),
            OutputChannels::Downmix => {
                // The filterbank is linear, so mixing before synthesis is equivalent to mixing
                // the PCM.
                let mut mix = [0f32; SUBBANDS];

                for ((m, &l), &r) in mix.iter_mut().zip(&slot[0]).zip(&slot[1]) {
                    *m = 0.5 * (l + r);
                }

                self.filters[0].input_samples(&mix, &mut *self.sink);
            }
        }
    }

    /// Synthesizes `count` time slots of silence.
    pub fn write_silence(&mut self, count: usize, n_channels: usize) {
        let silence = [[0f32; SUBBANDS]; 2];

        for _ in 0..count {
            self.write_slot(&silence, n_channels);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_core::audio::{SampleBuffer, SignalSpec};

    fn slot(left: f32, right: f32) -> SubbandSlot {
        let mut slot = [[0f32; SUBBANDS]; 2];
        slot[0][0] = left;
        slot[1][0] = right;
        slot
    }

    fn render(routing: OutputChannels, slots: &[SubbandSlot]) -> Vec<i16> {
        let mut filters = [SynthesisFilter::new(0), SynthesisFilter::new(1)];
        let mut buf = SampleBuffer::new(SignalSpec::new(44100, routing.count(2)));

        {
            let mut out = FrameOutput::new(&mut filters, routing, &mut buf);
            for s in slots {
                out.write_slot(s, 2);
            }
        }

        buf.samples().to_vec()
    }

    #[test]
    fn verify_channel_selection() {
        let slots = [slot(0.5, -0.25); 20];

        let both = render(OutputChannels::Both, &slots);
        let left = render(OutputChannels::Left, &slots);
        let right = render(OutputChannels::Right, &slots);

        assert_eq!(both.len(), 2 * 640);
        assert_eq!(left.len(), 640);

        let both_left: Vec<i16> = both.iter().step_by(2).copied().collect();
        let both_right: Vec<i16> = both.iter().skip(1).step_by(2).copied().collect();

        assert_eq!(left, both_left);
        assert_eq!(right, both_right);
    }

    #[test]
    fn verify_downmix_of_identical_channels() {
        let mixed = render(OutputChannels::Downmix, &[slot(0.3, 0.3); 20]);
        let left = render(OutputChannels::Left, &[slot(0.3, 0.3); 20]);

        assert_eq!(mixed, left);
    }
}
