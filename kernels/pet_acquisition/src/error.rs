//! Error types for the acquisition IO and codec layer
//!
//! Physics discards (a photon that misses the ring, a crystal pair with no
//! valid line of response) are `Option::None` at the call site, never errors.
//! Errors here mean corrupted or truncated data, or a configuration the
//! scanner cannot represent.

use std::io;
use thiserror::Error;

/// Result type for acquisition operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or persisting event data
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file or stream failure
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Buffer ends before the declared record payload
    #[error("truncated buffer: need {needed} bytes, got {len}")]
    TruncatedBuffer { needed: usize, len: usize },

    /// Packet header inconsistent with its payload
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// List-mode CSV row that does not parse back into a record
    #[error("csv parse error at line {line}: {reason}")]
    CsvParse { line: usize, reason: String },

    /// Sinogram file whose header disagrees with its payload
    #[error("sinogram format error: {0}")]
    SinogramFormat(String),

    /// Failure writing a sinogram preview image
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Manifest serialization failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration the scanner model cannot represent
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors caused by malformed input data rather than the host
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Error::TruncatedBuffer { .. }
                | Error::MalformedPacket(_)
                | Error::CsvParse { .. }
                | Error::SinogramFormat(_)
        )
    }
}
