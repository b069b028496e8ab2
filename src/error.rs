use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XvizError>;

#[derive(Error, Debug)]
pub enum XvizError {
    /// Input could not be classified as any known format.
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Unsupported container version: {0}")]
    UnsupportedFormatVersion(u32),
    /// The container's JSON chunk is not valid UTF-8 JSON.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    /// Bad lengths, truncated chunks, or buffer references that do not
    /// resolve to exactly one binary chunk.
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),
    #[error("Conversion unsupported: {0}")]
    ConversionUnsupported(String),
    #[error("Invalid writer state: {0}")]
    InvalidState(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl XvizError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptContainer(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::ConversionUnsupported(msg.into())
    }
}
