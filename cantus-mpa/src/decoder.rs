// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::audio::{OutputSink, SampleBuffer, SignalSpec};
use cantus_core::errors::{unsupported_layer_error, Result};
use cantus_core::io::BufReader;

use log::{debug, warn};

use crate::common::*;
use crate::equalizer::Equalizer;
use crate::output::{FrameOutput, OutputChannels};
use crate::reader::Frame;
use crate::synthesis::SynthesisFilter;

#[cfg(feature = "mp1")]
use crate::layer1::Layer1;
#[cfg(feature = "mp2")]
use crate::layer2::Layer2;
#[cfg(feature = "mp3")]
use crate::layer3::Layer3;

/// `DecoderParams` are the options of a `Decoder`.
#[derive(Copy, Clone, Debug, Default)]
pub struct DecoderParams {
    /// The channels written to the output sink.
    pub output_channels: OutputChannels,
    /// The initial equalizer settings.
    pub equalizer: Equalizer,
}

/// Counters of a decoding session.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// The number of frames decoded without error.
    pub frames_decoded: u64,
    /// The number of frames that were decoded with an error.
    pub frames_failed: u64,
    /// The number of granules, or Layer I and II frames, replaced by silence.
    pub concealed_granules: u64,
}

/// `Decoder` decodes MPEG audio frames of any layer into an `OutputSink`.
///
/// The output signal is set up from the first frame decoded. The decoder for each layer is
/// created when a frame of that layer is first seen.
pub struct Decoder<S: OutputSink> {
    params: DecoderParams,
    sink: S,
    filters: [SynthesisFilter; 2],
    spec: Option<SignalSpec>,
    #[cfg(feature = "mp1")]
    layer1: Option<Layer1>,
    #[cfg(feature = "mp2")]
    layer2: Option<Layer2>,
    #[cfg(feature = "mp3")]
    layer3: Option<Layer3>,
    stats: DecoderStats,
}

impl Decoder<SampleBuffer> {
    /// Instantiate a decoder writing into a `SampleBuffer`.
    pub fn new(params: DecoderParams) -> Self {
        Decoder::with_sink(SampleBuffer::default(), params)
    }
}

impl<S: OutputSink> Decoder<S> {
    /// Instantiate a decoder writing into `sink`.
    pub fn with_sink(sink: S, params: DecoderParams) -> Self {
        let mut filters = [SynthesisFilter::new(0), SynthesisFilter::new(1)];

        let factors = params.equalizer.band_factors();

        for filter in filters.iter_mut() {
            filter.set_eq_factors(&factors);
        }

        Decoder {
            params,
            sink,
            filters,
            spec: None,
            #[cfg(feature = "mp1")]
            layer1: None,
            #[cfg(feature = "mp2")]
            layer2: None,
            #[cfg(feature = "mp3")]
            layer3: None,
            stats: Default::default(),
        }
    }

    /// Gets the output sink.
    pub fn output(&self) -> &S {
        &self.sink
    }

    /// Gets a mutable reference to the output sink.
    pub fn output_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Replaces the output sink, and returns the previous one. The new sink receives the samples
    /// of the next frame decoded.
    pub fn set_output_buffer(&mut self, mut sink: S) -> S {
        if let Some(spec) = self.spec {
            sink.configure(spec);
        }

        std::mem::replace(&mut self.sink, sink)
    }

    /// Gets the output signal, once the first frame was decoded.
    pub fn output_spec(&self) -> Option<SignalSpec> {
        self.spec
    }

    /// Gets the sample rate of the output in Hz, or 0 before the first frame was decoded.
    pub fn output_frequency(&self) -> u32 {
        self.spec.map_or(0, |spec| spec.rate)
    }

    /// Gets the number of output channels, or 0 before the first frame was decoded.
    pub fn output_channels(&self) -> usize {
        self.spec.map_or(0, |spec| spec.channels)
    }

    /// Gets the equalizer.
    pub fn equalizer(&self) -> &Equalizer {
        &self.params.equalizer
    }

    /// Replaces the equalizer. It takes effect from the next time slot synthesized.
    pub fn set_equalizer(&mut self, equalizer: &Equalizer) {
        self.params.equalizer = *equalizer;

        let factors = equalizer.band_factors();

        for filter in self.filters.iter_mut() {
            filter.set_eq_factors(&factors);
        }
    }

    /// Gets the counters of the session. They are not cleared by `reset`.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Clears all state carried between frames: the bit reservoir, the IMDCT overlap, and the
    /// synthesis filter history. Must be called when decoding resumes at another position of the
    /// stream.
    pub fn reset(&mut self) {
        for filter in self.filters.iter_mut() {
            filter.reset();
        }

        #[cfg(feature = "mp1")]
        if let Some(layer) = self.layer1.as_mut() {
            layer.reset();
        }
        #[cfg(feature = "mp2")]
        if let Some(layer) = self.layer2.as_mut() {
            layer.reset();
        }
        #[cfg(feature = "mp3")]
        if let Some(layer) = self.layer3.as_mut() {
            layer.reset();
        }

        self.sink.clear();
    }

    /// Sets up the output signal from the first frame, or again if the signal changes.
    fn configure(&mut self, header: &FrameHeader) {
        let spec = SignalSpec::new(
            header.sample_rate,
            self.params.output_channels.count(header.n_channels()),
        );

        match self.spec {
            Some(current) if current == spec => return,
            Some(current) => {
                warn!("signal changed from {:?} to {:?}", current, spec);
                self.reset();
            }
            None => debug!("output signal: {:?}", spec),
        }

        self.sink.configure(spec);
        self.spec = Some(spec);
    }

    /// Decodes the body of a frame. The sink is cleared first, and holds the samples of this frame
    /// only when the call returns.
    ///
    /// A frame that is damaged still produces a frame of output, with the lost parts replaced by
    /// silence, and returns a recoverable error.
    pub fn decode_frame(&mut self, header: &FrameHeader, body: &[u8]) -> Result<()> {
        self.configure(header);
        self.sink.clear();

        let mut reader = BufReader::new(body);
        let routing = self.params.output_channels;
        let mut out = FrameOutput::new(&mut self.filters, routing, &mut self.sink);

        let result = match header.layer {
            #[cfg(feature = "mp1")]
            MpegLayer::Layer1 => {
                self.layer1.get_or_insert_with(Layer1::new).decode(&mut reader, header, &mut out)
            }
            #[cfg(feature = "mp2")]
            MpegLayer::Layer2 => {
                self.layer2.get_or_insert_with(Layer2::new).decode(&mut reader, header, &mut out)
            }
            #[cfg(feature = "mp3")]
            MpegLayer::Layer3 => {
                self.layer3.get_or_insert_with(Layer3::new).decode(&mut reader, header, &mut out)
            }
            #[allow(unreachable_patterns)]
            layer => unsupported_layer_error(layer.number()),
        };

        self.stats.concealed_granules += out.concealed() as u64;

        match result {
            Ok(()) => self.stats.frames_decoded += 1,
            Err(_) => self.stats.frames_failed += 1,
        }

        result
    }

    /// Decodes a frame read by a `FrameReader`.
    pub fn decode(&mut self, frame: &Frame) -> Result<()> {
        self.decode_frame(&frame.header, &frame.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_frame_header;
    use cantus_core::errors::Error;

    /// MPEG1 layer 1, 32 kbit/s, 44.1 kHz, stereo: 32 bytes.
    const LAYER1_HEADER: u32 = 0xffff_1000;

    fn silent_layer1_frame() -> (FrameHeader, Vec<u8>) {
        let header = parse_frame_header(LAYER1_HEADER).unwrap();
        let body = vec![0u8; header.frame_size];
        (header, body)
    }

    #[test]
    fn verify_first_frame_sets_up_output() {
        let mut decoder = Decoder::new(Default::default());
        assert_eq!(decoder.output_frequency(), 0);

        let (header, body) = silent_layer1_frame();
        decoder.decode_frame(&header, &body).unwrap();

        assert_eq!(decoder.output_frequency(), 44100);
        assert_eq!(decoder.output_channels(), 2);
        assert_eq!(decoder.output().frames(), 384);
        assert!(decoder.output().samples().iter().all(|&s| s == 0));

        // Each frame replaces the previous frame's samples.
        decoder.decode_frame(&header, &body).unwrap();
        assert_eq!(decoder.output().frames(), 384);
        assert_eq!(decoder.stats().frames_decoded, 2);
    }

    #[test]
    fn verify_mono_output_of_stereo_stream() {
        let mut decoder = Decoder::new(DecoderParams {
            output_channels: OutputChannels::Downmix,
            ..Default::default()
        });

        let (header, body) = silent_layer1_frame();
        decoder.decode_frame(&header, &body).unwrap();

        assert_eq!(decoder.output_channels(), 1);
        assert_eq!(decoder.output().samples().len(), 384);
    }

    #[test]
    fn verify_damaged_frame_is_concealed() {
        let mut decoder = Decoder::new(Default::default());

        // Every allocation code is the invalid 0b1111.
        let (header, _) = silent_layer1_frame();
        let body = vec![0xffu8; header.frame_size];

        let err = decoder.decode_frame(&header, &body).unwrap_err();

        assert!(err.is_recoverable());
        assert!(matches!(err, Error::DecodeError(_)));
        assert_eq!(decoder.output().frames(), 384);

        let stats = decoder.stats();
        assert_eq!(stats.frames_failed, 1);
        assert_eq!(stats.concealed_granules, 1);
    }

    #[test]
    fn verify_equalizer_is_copied() {
        let mut decoder = Decoder::new(Default::default());

        let mut eq = Equalizer::new();
        eq.set_band(3, -1.0).unwrap();

        decoder.set_equalizer(&eq);
        eq.reset();

        assert_eq!(decoder.equalizer().band(3), Some(-1.0));
    }

    #[test]
    fn verify_set_output_buffer() {
        let mut decoder = Decoder::new(Default::default());

        let (header, body) = silent_layer1_frame();
        decoder.decode_frame(&header, &body).unwrap();

        let previous = decoder.set_output_buffer(SampleBuffer::default());

        assert_eq!(previous.frames(), 384);
        assert_eq!(decoder.output().spec(), SignalSpec::new(44100, 2));
        assert_eq!(decoder.output().frames(), 0);
    }
}
