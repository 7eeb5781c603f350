//! Seam around the third-party video extractor.
//!
//! Everything YouTube-specific (player responses, signatures, chunked
//! transfers) stays on the other side of [`VideoExtractor`]. The rest of the
//! crate only sees a [`VideoHandle`] with plain metadata and a stream list.

use std::path::{Path, PathBuf};

use crate::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Audio and video already multiplexed into one file.
    Progressive,
    /// Video track only; no merge step is performed, so the result is silent.
    VideoOnly,
    AudioOnly,
}

/// One downloadable stream as advertised by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub id: String,
    /// Container / file extension without the dot, e.g. `mp4`, `m4a`, `webm`.
    pub container: String,
    pub mime_type: Option<String>,
    /// Vertical resolution in pixels.
    pub resolution: Option<u32>,
    /// Audio bitrate in kbps.
    pub audio_bitrate: Option<f64>,
    pub kind: StreamKind,
}

impl StreamInfo {
    pub fn is_progressive(&self) -> bool {
        self.kind == StreamKind::Progressive
    }

    pub fn is_audio_only(&self) -> bool {
        self.kind == StreamKind::AudioOnly
    }

    pub fn is_video_only(&self) -> bool {
        self.kind == StreamKind::VideoOnly
    }

    pub fn has_container(&self, container: &str) -> bool {
        self.container.eq_ignore_ascii_case(container)
    }
}

/// Parsed video: metadata plus every stream the extractor found.
#[derive(Debug, Clone, Default)]
pub struct VideoHandle {
    pub title: Option<String>,
    pub author: Option<String>,
    pub length_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub views: Option<u64>,
    pub streams: Vec<StreamInfo>,
}

/// Blocking interface to the external extractor. Implementations classify
/// their failures into [`ExtractError`] variants.
pub trait VideoExtractor: Send + Sync {
    /// Short label reported by `/health`.
    fn name(&self) -> &'static str;

    fn open(&self, url: &str) -> Result<VideoHandle, ExtractError>;

    /// Downloads `stream` into `dest_dir`, naming the file `stem` plus
    /// whatever extension the extractor picks. Returns the written path.
    fn download(
        &self,
        url: &str,
        stream: &StreamInfo,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, ExtractError>;
}
