//! Media errors

use thiserror::Error;

/// Errors raised by frame sources
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    /// The media element could not load or decode the video
    #[error("Media decode failure: {0}")]
    MediaDecodeFailure(String),

    /// A single pushed image could not be decoded
    #[error("Frame decode failure: {0}")]
    FrameDecodeFailure(String),

    /// The socket could not be opened or failed while open
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}
