//! Stream selection heuristics.
//!
//! Video requests only consider `mp4` streams, preferring progressive ones so
//! the result has sound without a merge step. Audio requests take an
//! audio-only stream as-is; no transcoding happens anywhere.

use crate::{
    convert::{MediaFormat, Quality},
    error::ConvertError,
    extractor::StreamInfo,
};

const VIDEO_CONTAINER: &str = "mp4";

pub fn select_stream(
    streams: &[StreamInfo],
    format: MediaFormat,
    quality: Quality,
) -> Result<&StreamInfo, ConvertError> {
    match format {
        MediaFormat::Mp3 => select_audio(streams).ok_or_else(|| {
            ConvertError::NoSuitableStream("No audio stream available for this video".into())
        }),
        MediaFormat::Mp4 => select_video(streams, quality).ok_or_else(|| match quality {
            Quality::Best => ConvertError::NoSuitableStream("No suitable video stream found".into()),
            Quality::Height(height) => ConvertError::NoSuitableStream(format!(
                "No video stream available at {height}p quality"
            )),
        }),
    }
}

/// Highest-bitrate audio-only stream, preferring the widely supported
/// `audio/mp4` (m4a) container over webm/opus.
pub fn select_audio(streams: &[StreamInfo]) -> Option<&StreamInfo> {
    let audio = || streams.iter().filter(|stream| stream.is_audio_only());
    highest_by(audio().filter(|stream| is_mp4_audio(stream)), audio_bitrate)
        .or_else(|| highest_by(audio(), audio_bitrate))
}

pub fn select_video(streams: &[StreamInfo], quality: Quality) -> Option<&StreamInfo> {
    let progressive = || {
        streams
            .iter()
            .filter(|stream| stream.is_progressive() && stream.has_container(VIDEO_CONTAINER))
    };

    match quality {
        Quality::Best => highest_by(progressive(), resolution).or_else(|| {
            // Silent fallback: adaptive video without an audio track.
            highest_by(
                streams
                    .iter()
                    .filter(|stream| stream.is_video_only() && stream.has_container(VIDEO_CONTAINER)),
                resolution,
            )
        }),
        Quality::Height(requested) => progressive()
            .find(|stream| stream.resolution == Some(requested))
            .or_else(|| {
                highest_by(
                    progressive().filter(|stream| resolution(stream) <= f64::from(requested)),
                    resolution,
                )
            })
            .or_else(|| highest_by(progressive(), resolution)),
    }
}

fn is_mp4_audio(stream: &StreamInfo) -> bool {
    stream
        .mime_type
        .as_deref()
        .map(|mime| mime.eq_ignore_ascii_case("audio/mp4"))
        .unwrap_or(false)
        || stream.has_container("m4a")
        || stream.has_container("mp4")
}

fn resolution(stream: &StreamInfo) -> f64 {
    f64::from(stream.resolution.unwrap_or(0))
}

fn audio_bitrate(stream: &StreamInfo) -> f64 {
    stream.audio_bitrate.unwrap_or(0.0)
}

/// Maximum by `key`, keeping the earliest stream on ties.
fn highest_by<'a>(
    streams: impl Iterator<Item = &'a StreamInfo>,
    key: impl Fn(&StreamInfo) -> f64,
) -> Option<&'a StreamInfo> {
    streams.fold(None::<&'a StreamInfo>, |best, stream| match best {
        Some(current) if key(stream) <= key(current) => Some(current),
        _ => Some(stream),
    })
}
