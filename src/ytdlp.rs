//! `yt-dlp` subprocess implementation of [`VideoExtractor`].
//!
//! Metadata comes from `--dump-single-json`; downloads run one `--format`
//! invocation into the caller's work directory. yt-dlp only reports failures as
//! text on stderr, so this is the one place that inspects error messages.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use serde::Deserialize;
use tracing::debug;

use crate::{
    error::ExtractError,
    extractor::{StreamInfo, StreamKind, VideoExtractor, VideoHandle},
};

pub const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_YT_DLP_BIN)
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--no-progress");
        command
    }

    fn run(&self, mut command: Command) -> Result<Output, ExtractError> {
        let output = command.output().map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ExtractError::Failed(format!(
                    "{} is not installed or not on PATH",
                    self.binary.display()
                ))
            } else {
                ExtractError::Io(err)
            }
        })?;
        if !output.status.success() {
            let message = last_error_line(&output.stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(classify_error(&message));
        }
        Ok(output)
    }
}

impl VideoExtractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn open(&self, url: &str) -> Result<VideoHandle, ExtractError> {
        let mut command = self.command();
        command.arg("--dump-single-json").arg("--skip-download").arg(url);
        let output = self.run(command)?;
        let info: InfoJson = serde_json::from_slice(&output.stdout)
            .map_err(|err| ExtractError::Failed(format!("parsing yt-dlp metadata: {err}")))?;
        Ok(info.into_handle())
    }

    fn download(
        &self,
        url: &str,
        stream: &StreamInfo,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf, ExtractError> {
        let template = dest_dir.join(format!("{stem}.%(ext)s"));
        debug!(format = %stream.id, dest = %dest_dir.display(), "running yt-dlp download");

        let mut command = self.command();
        command
            .arg("--format")
            .arg(&stream.id)
            .arg("--output")
            .arg(template.to_string_lossy().to_string())
            .arg("--no-part")
            .arg("--no-mtime")
            .arg("--no-embed-metadata")
            .arg(url);
        self.run(command)?;

        find_output(dest_dir, stem)?.ok_or_else(|| {
            ExtractError::Failed(format!(
                "yt-dlp finished but no file named {stem}.* was written"
            ))
        })
    }
}

/// Maps yt-dlp's error text onto [`ExtractError`] variants. Terminal
/// categories are checked before the transient HTTP ones.
pub fn classify_error(message: &str) -> ExtractError {
    let lower = message.to_ascii_lowercase();
    let owned = message.trim().to_string();
    if lower.contains("private video") || lower.contains("video is private") {
        ExtractError::Private(owned)
    } else if lower.contains("confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("age restricted")
        || lower.contains("inappropriate for some users")
    {
        ExtractError::AgeRestricted(owned)
    } else if lower.contains("video unavailable")
        || lower.contains("this video is not available")
        || lower.contains("this video has been removed")
        || lower.contains("video does not exist")
    {
        ExtractError::Unavailable(owned)
    } else if lower.contains("400") || lower.contains("bad request") || lower.contains("http error")
    {
        ExtractError::Transient(owned)
    } else {
        ExtractError::Failed(owned)
    }
}

fn last_error_line(stderr: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.to_string())
}

fn find_output(dest_dir: &Path, stem: &str) -> Result<Option<PathBuf>, ExtractError> {
    let prefix = format!("{stem}.");
    for entry in fs::read_dir(dest_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&prefix) || name.ends_with(".part") || name.ends_with(".ytdl") {
            continue;
        }
        return Ok(Some(entry.path()));
    }
    Ok(None)
}

/// Subset of the `--dump-single-json` payload we care about.
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    fulltitle: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    view_count: Option<u64>,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: Option<String>,
    ext: Option<String>,
    height: Option<u32>,
    vcodec: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
    protocol: Option<String>,
}

impl InfoJson {
    fn into_handle(self) -> VideoHandle {
        let streams = self.formats.iter().filter_map(stream_from_format).collect();
        VideoHandle {
            title: self.title.or(self.fulltitle),
            author: self.uploader.or(self.channel),
            length_seconds: self
                .duration
                .filter(|value| value.is_finite() && *value >= 0.0)
                .map(|value| value.round() as u64),
            thumbnail_url: self.thumbnail,
            views: self.view_count,
            streams,
        }
    }
}

fn has_codec(codec: Option<&str>) -> bool {
    matches!(codec, Some(value) if !value.is_empty() && value != "none")
}

/// Storyboards and HLS manifests are skipped; everything else becomes a
/// stream classified by which codecs it carries.
fn stream_from_format(format: &FormatJson) -> Option<StreamInfo> {
    let id = format.format_id.as_deref()?.trim();
    let container = format.ext.as_deref()?.trim().to_ascii_lowercase();
    if id.is_empty() || container.is_empty() || container == "mhtml" {
        return None;
    }
    if let Some(protocol) = format.protocol.as_deref()
        && (protocol.contains("m3u8") || protocol.contains("dash"))
    {
        return None;
    }

    let kind = match (
        has_codec(format.vcodec.as_deref()),
        has_codec(format.acodec.as_deref()),
    ) {
        (true, true) => StreamKind::Progressive,
        (true, false) => StreamKind::VideoOnly,
        (false, true) => StreamKind::AudioOnly,
        (false, false) => return None,
    };

    Some(StreamInfo {
        id: id.to_string(),
        mime_type: Some(mime_for(kind, &container)),
        container,
        resolution: format.height.filter(|_| kind != StreamKind::AudioOnly),
        audio_bitrate: format.abr.filter(|value| *value > 0.0),
        kind,
    })
}

fn mime_for(kind: StreamKind, container: &str) -> String {
    let subtype = match container {
        "m4a" => "mp4",
        other => other,
    };
    match kind {
        StreamKind::AudioOnly => format!("audio/{subtype}"),
        StreamKind::Progressive | StreamKind::VideoOnly => format!("video/{subtype}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn format(id: &str, ext: &str, height: Option<u32>, vcodec: &str, acodec: &str) -> FormatJson {
        FormatJson {
            format_id: Some(id.into()),
            ext: Some(ext.into()),
            height,
            vcodec: Some(vcodec.into()),
            acodec: Some(acodec.into()),
            abr: None,
            protocol: Some("https".into()),
        }
    }

    #[test]
    fn classify_error_detects_terminal_categories() {
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: Private video. Sign in if you've been granted access"),
            ExtractError::Private(_)
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: Sign in to confirm your age."),
            ExtractError::AgeRestricted(_)
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: Video unavailable"),
            ExtractError::Unavailable(_)
        ));
    }

    #[test]
    fn classify_error_keeps_format_failures_generic() {
        let err = classify_error("ERROR: [youtube] abc: Requested format is not available");
        assert!(matches!(err, ExtractError::Failed(_)));
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: This video is not available in your country"),
            ExtractError::Unavailable(_)
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube] abc: This video has been removed by the uploader"),
            ExtractError::Unavailable(_)
        ));
    }

    #[test]
    fn classify_error_marks_http_failures_transient() {
        assert!(classify_error("ERROR: unable to download: HTTP Error 400: Bad Request").is_transient());
        assert!(classify_error("bad request").is_transient());
        assert!(!classify_error("ERROR: Unsupported URL").is_transient());
    }

    #[test]
    fn stream_from_format_classifies_codecs() {
        let progressive = stream_from_format(&format("18", "mp4", Some(360), "avc1", "mp4a")).unwrap();
        assert_eq!(progressive.kind, StreamKind::Progressive);
        assert_eq!(progressive.resolution, Some(360));
        assert_eq!(progressive.mime_type.as_deref(), Some("video/mp4"));

        let video = stream_from_format(&format("137", "mp4", Some(1080), "avc1", "none")).unwrap();
        assert_eq!(video.kind, StreamKind::VideoOnly);

        let audio = stream_from_format(&format("140", "m4a", None, "none", "mp4a")).unwrap();
        assert_eq!(audio.kind, StreamKind::AudioOnly);
        assert_eq!(audio.mime_type.as_deref(), Some("audio/mp4"));

        assert!(stream_from_format(&format("sb0", "mhtml", Some(90), "none", "none")).is_none());

        let mut hls = format("96", "mp4", Some(1080), "avc1", "mp4a");
        hls.protocol = Some("m3u8_native".into());
        assert!(stream_from_format(&hls).is_none());
    }

    #[test]
    fn last_error_line_prefers_error_prefix() {
        let stderr = b"WARNING: something\nERROR: Video unavailable\n[info] trailing\n";
        assert_eq!(
            last_error_line(stderr).as_deref(),
            Some("ERROR: Video unavailable")
        );
        assert_eq!(last_error_line(b"   \n"), None);
    }

    #[cfg(unix)]
    fn install_ytdlp_stub(dir: &Path, fail_with: Option<&str>) -> PathBuf {
        let script_path = dir.join("yt-dlp");
        let failure = match fail_with {
            Some(message) => format!("echo '{message}' >&2\nexit 1\n"),
            None => String::new(),
        };
        let script = format!(
            r#"#!/usr/bin/env bash
set -eu
{failure}args=("$@")
output=""
while [[ $# -gt 0 ]]; do
  case "$1" in
    --output)
      shift
      output="$1"
      ;;
  esac
  shift
done

if printf '%s\n' "${{args[@]}}" | grep -q -- '--dump-single-json'; then
  cat <<'JSON'
{{
  "id": "dQw4w9WgXcQ",
  "title": "Stub Title",
  "uploader": "Stub Channel",
  "duration": 212.0,
  "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg",
  "view_count": 99,
  "formats": [
    {{"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none", "protocol": "mhtml"}},
    {{"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "protocol": "https"}},
    {{"format_id": "18", "ext": "mp4", "height": 360, "vcodec": "avc1", "acodec": "mp4a", "protocol": "https"}}
  ]
}}
JSON
  exit 0
fi

if [[ -n "$output" ]]; then
  target="${{output//%(ext)s/m4a}}"
  mkdir -p "$(dirname "$target")"
  echo "audio" > "$target"
fi
exit 0
"#
        );
        fs::write(&script_path, script).unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    #[cfg(unix)]
    #[test]
    fn open_parses_stub_metadata() {
        let dir = tempdir().unwrap();
        let ytdlp = YtDlp::new(install_ytdlp_stub(dir.path(), None));
        let handle = ytdlp
            .open("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .unwrap();
        assert_eq!(handle.title.as_deref(), Some("Stub Title"));
        assert_eq!(handle.author.as_deref(), Some("Stub Channel"));
        assert_eq!(handle.length_seconds, Some(212));
        assert_eq!(handle.views, Some(99));
        assert_eq!(handle.streams.len(), 2);
        assert!(handle.streams.iter().any(|s| s.id == "18" && s.is_progressive()));
    }

    #[cfg(unix)]
    #[test]
    fn download_returns_written_file() {
        let dir = tempdir().unwrap();
        let ytdlp = YtDlp::new(install_ytdlp_stub(dir.path(), None));
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let stream = StreamInfo {
            id: "140".into(),
            container: "m4a".into(),
            mime_type: Some("audio/mp4".into()),
            resolution: None,
            audio_bitrate: Some(129.5),
            kind: StreamKind::AudioOnly,
        };
        let path = ytdlp
            .download("https://youtu.be/dQw4w9WgXcQ", &stream, &work, "Stub-Title")
            .unwrap();
        assert_eq!(path, work.join("Stub-Title.m4a"));
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn open_classifies_stub_failures() {
        let dir = tempdir().unwrap();
        let ytdlp = YtDlp::new(install_ytdlp_stub(
            dir.path(),
            Some("ERROR: [youtube] dQw4w9WgXcQ: Private video"),
        ));
        let err = ytdlp.open("https://youtu.be/dQw4w9WgXcQ").unwrap_err();
        assert!(matches!(err, ExtractError::Private(_)));
    }

    #[test]
    fn missing_binary_is_reported() {
        let ytdlp = YtDlp::new("/nonexistent/yt-dlp-binary");
        let err = ytdlp.open("https://youtu.be/dQw4w9WgXcQ").unwrap_err();
        assert!(matches!(err, ExtractError::Failed(message) if message.contains("not installed")));
    }
}
