// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `ErrorLevel` describes how far the damage of an error reaches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorLevel {
    /// Insufficient data, or no valid frame could be found. Resynchronize or end the stream.
    Stream,
    /// A frame header is well-formed but invalid or unsupported. Skip the frame.
    Header,
    /// Damage is limited to one granule or frame. Decoding continues with the next frame.
    Granule,
    /// The decoder was misconfigured. The offending value is clamped and decoding continues.
    Configuration,
}

/// `Error` provides an enumeration of all possible errors reported by Cantus.
#[derive(Debug)]
pub enum Error {
    /// An IO error occured while reading the stream.
    IoError(io::Error),
    /// Fewer bits or bytes remain in the stream than were requested.
    StreamExhausted,
    /// The leading sync pattern of a frame header did not match, or no valid frame header could
    /// be found.
    InvalidSync,
    /// A header field decoded to a reserved value.
    ReservedValue(&'static str),
    /// The frame uses the free-format bitrate (bitrate index 0).
    FreeFormatUnsupported,
    /// The frame's layer is not one the decoder can decode.
    UnsupportedLayer(u32),
    /// A Huffman code or Huffman table selector in the main data was invalid.
    HuffmanTableError(&'static str),
    /// The bit reservoir held fewer bytes than a frame's `main_data_begin` referenced.
    ReservoirUnderrun {
        /// The number of bytes that were referenced.
        needed: usize,
        /// The number of bytes that were available.
        available: usize,
    },
    /// The stream contained malformed data and a granule or frame could not be decoded.
    DecodeError(&'static str),
    /// An equalizer band index was out-of-range.
    BandOutOfRange(usize),
}

impl Error {
    /// Gets the level at which the error occured.
    pub fn level(&self) -> ErrorLevel {
        match *self {
            Error::IoError(_) => ErrorLevel::Stream,
            Error::StreamExhausted => ErrorLevel::Stream,
            Error::InvalidSync => ErrorLevel::Stream,
            Error::ReservedValue(_) => ErrorLevel::Header,
            Error::FreeFormatUnsupported => ErrorLevel::Header,
            Error::UnsupportedLayer(_) => ErrorLevel::Header,
            Error::HuffmanTableError(_) => ErrorLevel::Granule,
            Error::ReservoirUnderrun { .. } => ErrorLevel::Granule,
            Error::DecodeError(_) => ErrorLevel::Granule,
            Error::BandOutOfRange(_) => ErrorLevel::Configuration,
        }
    }

    /// Returns true if decoding may continue with the next frame after this error.
    ///
    /// Only the loss of the underlying stream is fatal. A lost sync is recovered by scanning for
    /// the next frame header.
    pub fn is_recoverable(&self) -> bool {
        !matches!(*self, Error::IoError(_) | Error::StreamExhausted)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::StreamExhausted => {
                write!(f, "end of stream")
            }
            Error::InvalidSync => {
                write!(f, "lost sync: no valid frame header found")
            }
            Error::ReservedValue(field) => {
                write!(f, "malformed header: reserved {}", field)
            }
            Error::FreeFormatUnsupported => {
                write!(f, "unsupported feature: free format bitrate")
            }
            Error::UnsupportedLayer(layer) => {
                write!(f, "unsupported feature: layer {}", layer)
            }
            Error::HuffmanTableError(msg) => {
                write!(f, "malformed main data: {}", msg)
            }
            Error::ReservoirUnderrun { needed, available } => {
                write!(
                    f,
                    "bit reservoir underrun: {} bytes referenced, {} available",
                    needed, available
                )
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::BandOutOfRange(band) => {
                write!(f, "equalizer band {} is out-of-range", band)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::StreamExhausted,
            _ => Error::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create a reserved value error.
pub fn reserved_value_error<T>(field: &'static str) -> Result<T> {
    Err(Error::ReservedValue(field))
}

/// Convenience function to create a Huffman table error.
pub fn huffman_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::HuffmanTableError(desc))
}

/// Convenience function to create an unsupported layer error.
pub fn unsupported_layer_error<T>(layer: u32) -> Result<T> {
    Err(Error::UnsupportedLayer(layer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_error_levels() {
        assert_eq!(Error::StreamExhausted.level(), ErrorLevel::Stream);
        assert_eq!(Error::InvalidSync.level(), ErrorLevel::Stream);
        assert_eq!(Error::FreeFormatUnsupported.level(), ErrorLevel::Header);
        assert_eq!(Error::UnsupportedLayer(4).level(), ErrorLevel::Header);
        assert_eq!(Error::HuffmanTableError("x").level(), ErrorLevel::Granule);
        assert_eq!(
            Error::ReservoirUnderrun { needed: 10, available: 2 }.level(),
            ErrorLevel::Granule
        );
        assert_eq!(Error::BandOutOfRange(32).level(), ErrorLevel::Configuration);

        assert!(Error::InvalidSync.is_recoverable());
        assert!(Error::HuffmanTableError("x").is_recoverable());
        assert!(!Error::StreamExhausted.is_recoverable());
    }

    #[test]
    fn verify_eof_maps_to_stream_exhausted() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, Error::StreamExhausted));

        let err: Error = io::Error::new(io::ErrorKind::Other, "other").into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
