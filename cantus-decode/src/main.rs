// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Justification: Fields on DecoderParams and FrameReaderOptions may change at any time, but
// cantus-decode doesn't want to be updated every time those fields change, therefore always fill
// in the remaining fields with default values.
#![allow(clippy::needless_update)]

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cantus_core::audio::{SampleBuffer, SignalSpec};
use cantus_core::errors::{Error, Result};
use cantus_core::io::{SourceStream, SourceStreamOptions};
use cantus_mpa::{
    ChannelMode, Decoder, DecoderParams, Emphasis, Equalizer, FrameReader, FrameReaderOptions,
    OutputChannels, StreamInfo, VbrTagKind, EQ_BANDS,
};

use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use serde::Serialize;

mod wav;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// RIFF/WAVE, 16-bit PCM
    Wav,
    /// Raw interleaved 16-bit little-endian PCM
    Pcm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Channels {
    Both,
    Left,
    Right,
    Downmix,
}

impl From<Channels> for OutputChannels {
    fn from(channels: Channels) -> Self {
        match channels {
            Channels::Both => OutputChannels::Both,
            Channels::Left => OutputChannels::Left,
            Channels::Right => OutputChannels::Right,
            Channels::Downmix => OutputChannels::Downmix,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "Cantus Decode", version, about = "Decode MPEG audio to WAV or raw PCM")]
struct Args {
    /// The input file path
    input: PathBuf,

    /// The output file path, or - to use standard output
    #[arg(short, long, value_name = "PATH", required_unless_present = "info")]
    output: Option<PathBuf>,

    /// The output format
    #[arg(short, long, value_enum, default_value_t = Format::Wav)]
    format: Format,

    /// The channels to output
    #[arg(short, long, value_enum, default_value_t = Channels::Both)]
    channels: Channels,

    /// Up-to 32 comma-separated equalizer band values in the range [-1.0, 1.0]
    #[arg(long, value_name = "BANDS", value_delimiter = ',', allow_negative_numbers = true)]
    eq: Vec<f32>,

    /// The number of frames to skip before decoding
    #[arg(long, value_name = "FRAMES", default_value_t = 0)]
    skip: u64,

    /// Print information about the stream as JSON, and do not decode
    #[arg(long, conflicts_with_all = ["output", "skip"])]
    info: bool,

    /// Continue after a frame fails to decode
    #[arg(long)]
    keep_going: bool,
}

/// Stream information printed by `--info`.
#[derive(Serialize)]
struct InfoReport {
    path: String,
    version: &'static str,
    layer: u32,
    channel_mode: &'static str,
    channels: usize,
    sample_rate: u32,
    bitrate: u32,
    frame_len: usize,
    frame_rate: f64,
    ms_per_frame: f64,
    emphasis: &'static str,
    is_vbr: bool,
    vbr_tag: Option<&'static str>,
    vbr_scale: Option<u32>,
    is_copyrighted: bool,
    is_original: bool,
    has_crc: bool,
    has_padding: bool,
    total_frames: Option<u64>,
    duration_ms: Option<f64>,
}

impl InfoReport {
    fn new(path: &Path, info: &StreamInfo) -> Self {
        let channel_mode = match info.channel_mode {
            ChannelMode::Mono => "mono",
            ChannelMode::DualMono => "dual-mono",
            ChannelMode::Stereo => "stereo",
            ChannelMode::JointStereo(_) => "joint-stereo",
        };

        let emphasis = match info.emphasis {
            Emphasis::None => "none",
            Emphasis::Fifty15 => "50/15us",
            Emphasis::CcitJ17 => "ccit-j.17",
        };

        let vbr_tag = info.vbr.as_ref().map(|vbr| match vbr.kind {
            VbrTagKind::Xing => "xing",
            VbrTagKind::Info => "info",
            VbrTagKind::Vbri => "vbri",
        });

        InfoReport {
            path: path.display().to_string(),
            version: info.version.as_str(),
            layer: info.layer.number(),
            channel_mode,
            channels: info.channels,
            sample_rate: info.sample_rate,
            bitrate: info.bitrate,
            frame_len: info.frame_len,
            frame_rate: info.frame_rate,
            ms_per_frame: info.ms_per_frame,
            emphasis,
            is_vbr: info.is_vbr(),
            vbr_tag,
            vbr_scale: info.vbr.as_ref().and_then(|vbr| vbr.scale),
            is_copyrighted: info.is_copyrighted,
            is_original: info.is_original,
            has_crc: info.has_crc,
            has_padding: info.has_padding,
            total_frames: info.total_frames,
            duration_ms: info.duration_ms,
        }
    }
}

/// The destination of the decoded audio.
enum Output {
    File(BufWriter<File>),
    Stdout(io::StdoutLock<'static>),
}

impl Output {
    fn open(path: &Path) -> Result<Output> {
        if path.as_os_str() == "-" {
            Ok(Output::Stdout(io::stdout().lock()))
        }
        else {
            Ok(Output::File(BufWriter::new(File::create(path)?)))
        }
    }

    /// Flushes the output. For a file, the WAV header is rewritten with the final data length.
    fn finish(self, header: Option<SignalSpec>, data_len: u64) -> Result<()> {
        match self {
            Output::File(writer) => {
                let mut file = writer.into_inner().map_err(|err| err.into_error())?;

                if let Some(spec) = header {
                    let data_len = u32::try_from(data_len).unwrap_or(wav::UNKNOWN_DATA_LEN);

                    file.seek(SeekFrom::Start(0))?;
                    wav::write_header(&mut file, spec, data_len)?;
                }

                file.flush()?;
            }
            Output::Stdout(mut stdout) => stdout.flush()?,
        }

        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::File(writer) => writer.write(buf),
            Output::Stdout(stdout) => stdout.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::File(writer) => writer.flush(),
            Output::Stdout(stdout) => stdout.flush(),
        }
    }
}

fn main() {
    pretty_env_logger::init();

    let args = Args::parse();

    // For any error, return an exit code -1. Otherwise return the exit code provided.
    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            -1
        }
    };

    std::process::exit(code)
}

fn run(args: &Args) -> Result<i32> {
    let file = File::open(&args.input)?;
    let byte_len = file.metadata()?.len();

    let source = SourceStream::new(
        file,
        SourceStreamOptions { byte_len: Some(byte_len), ..Default::default() },
    );

    let mut reader = FrameReader::new(
        source,
        FrameReaderOptions { byte_len: Some(byte_len), ..Default::default() },
    );

    if args.info {
        return print_info(&args.input, &mut reader);
    }

    if args.eq.len() > EQ_BANDS {
        error!("at most {} equalizer bands may be given, got {}", EQ_BANDS, args.eq.len());
        return Ok(-1);
    }

    if args.skip > 0 {
        let skipped = reader.skip_frames(args.skip)?;

        if skipped < args.skip {
            warn!("stream ended after skipping {} frames", skipped);
        }
    }

    let params = DecoderParams {
        output_channels: args.channels.into(),
        equalizer: Equalizer::from_values(&args.eq),
        ..Default::default()
    };

    // Only reachable when --info is absent, where the output is required.
    let path = match &args.output {
        Some(path) => path,
        None => return Ok(-1),
    };

    decode(args, &mut reader, Decoder::new(params), Output::open(path)?)
}

fn print_info(path: &Path, reader: &mut FrameReader<SourceStream<File>>) -> Result<i32> {
    // The stream information is available once the first frame is read.
    reader.next_frame()?;

    let info = match reader.stream_info() {
        Some(info) => info,
        None => return Ok(-1),
    };

    let report = InfoReport::new(path, info);

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(err) => return Err(Error::IoError(err.into())),
    }

    Ok(0)
}

fn decode(
    args: &Args,
    reader: &mut FrameReader<SourceStream<File>>,
    mut decoder: Decoder<SampleBuffer>,
    mut output: Output,
) -> Result<i32> {
    let mut header: Option<SignalSpec> = None;
    let mut data_len = 0u64;
    let mut bytes = Vec::new();

    let result = loop {
        let frame = match reader.next_frame() {
            Ok(frame) => frame,
            Err(Error::StreamExhausted) => break Ok(()),
            Err(err) => break Err(err),
        };

        match decoder.decode(&frame) {
            Ok(()) => (),
            Err(err) if args.keep_going && err.is_recoverable() => {
                warn!("frame at {}: {}", frame.pos, err);
            }
            Err(err) => break Err(err),
        }

        let spec = decoder.output().spec();

        match header {
            None if args.format == Format::Wav => {
                wav::write_header(&mut output, spec, wav::UNKNOWN_DATA_LEN)?;
                header = Some(spec);
            }
            Some(current) if current != spec => {
                warn!("signal changed from {:?} to {:?}, output is inconsistent", current, spec);
            }
            _ => (),
        }

        bytes.clear();
        decoder.output().write_le_bytes(&mut bytes);

        output.write_all(&bytes)?;
        data_len += bytes.len() as u64;
    };

    output.finish(header, data_len)?;

    let stats = decoder.stats();

    info!(
        "decoded {} frames ({} failed, {} granules concealed), {} bytes of pcm",
        stats.frames_decoded + stats.frames_failed,
        stats.frames_failed,
        stats.concealed_granules,
        data_len,
    );

    result.map(|_| 0)
}
