//! YouTube URL recognition. Pure string matching, no network access.

use std::sync::LazyLock;

use regex::Regex;

/// Host/path shapes we accept, followed by an 11-character video id. The match
/// is anchored at the start only, so trailing query parameters are fine.
static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?(?:youtube|youtu|youtube-nocookie)\.(?:com|be)/(?:watch\?v=|embed/|v/|.+\?v=)?([^&=%?]{11})",
    )
    .expect("YouTube URL pattern compiles")
});

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id pattern compiles"));

pub fn is_youtube_url(candidate: &str) -> bool {
    !candidate.is_empty() && YOUTUBE_URL.is_match(candidate)
}

/// Returns the video id captured from a recognised URL, when it has the
/// canonical `[A-Za-z0-9_-]{11}` shape. Used for log context only.
pub fn extract_video_id(candidate: &str) -> Option<String> {
    let captures = YOUTUBE_URL.captures(candidate)?;
    let id = captures.get(1)?.as_str();
    VIDEO_ID.is_match(id).then(|| id.to_string())
}
