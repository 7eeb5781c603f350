//! Video metadata as exposed by the `/video-info` endpoint.

use crate::extractor::VideoHandle;

const UNKNOWN: &str = "Unknown";

/// Summary of a video, with extractor gaps already filled by defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail_url: String,
    pub duration_seconds: u64,
    pub uploader: String,
    pub view_count: u64,
}

impl VideoInfo {
    pub fn from_handle(handle: &VideoHandle) -> Self {
        Self {
            title: non_blank(handle.title.as_deref()).unwrap_or(UNKNOWN).to_string(),
            thumbnail_url: handle.thumbnail_url.clone().unwrap_or_default(),
            duration_seconds: handle.length_seconds.unwrap_or(0),
            uploader: non_blank(handle.author.as_deref()).unwrap_or(UNKNOWN).to_string(),
            view_count: handle.views.unwrap_or(0),
        }
    }

    pub fn duration_text(&self) -> String {
        format_duration(self.duration_seconds)
    }
}

/// Renders durations as `H:MM:SS`, or `M:SS` when under an hour.
pub fn format_duration(duration: u64) -> String {
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
