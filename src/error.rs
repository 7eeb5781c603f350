//! Error taxonomy shared by the conversion pipeline.

use std::io;

use thiserror::Error;

/// Failures reported by a [`crate::extractor::VideoExtractor`].
///
/// Extractors classify their own failures so callers can match on the variant
/// instead of inspecting message text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("video is private: {0}")]
    Private(String),
    #[error("video is age-restricted: {0}")]
    AgeRestricted(String),
    #[error("video is unavailable: {0}")]
    Unavailable(String),
    /// Upstream hiccup worth retrying (HTTP 400, "bad request", generic HTTP errors).
    #[error("transient upstream error: {0}")]
    Transient(String),
    #[error("extractor failed: {0}")]
    Failed(String),
    #[error("extractor I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExtractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Domain errors surfaced by the conversion service and mapped to HTTP
/// statuses by the route layer.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("This video is private and cannot be accessed.")]
    PrivateVideo,
    #[error("This video is age-restricted and cannot be downloaded.")]
    AgeRestricted,
    #[error("This video is unavailable. It may have been removed or restricted.")]
    VideoUnavailable,
    #[error("YouTube request failed: {0}")]
    Upstream(String),
    #[error("{0}")]
    NoSuitableStream(String),
    #[error("file error: {0}")]
    FileIo(#[from] io::Error),
}

impl ConvertError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<ExtractError> for ConvertError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Private(_) => Self::PrivateVideo,
            ExtractError::AgeRestricted(_) => Self::AgeRestricted,
            ExtractError::Unavailable(_) => Self::VideoUnavailable,
            ExtractError::Transient(message) => Self::Upstream(format!(
                "{message}. Please try again in a moment or check if the video URL is correct."
            )),
            ExtractError::Failed(message) => Self::Upstream(message),
            ExtractError::Io(err) => Self::Upstream(err.to_string()),
        }
    }
}
