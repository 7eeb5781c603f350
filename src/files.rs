//! Filesystem naming helpers: title sanitization, collision-safe output names
//! and basename restriction for user-supplied filenames.

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

pub const MAX_FILENAME_CHARS: usize = 200;
/// Byte cap for a stem. Leaves room for a `_N` counter and the extension
/// under the usual 255-byte filename limit.
pub const MAX_STEM_BYTES: usize = 220;
const FALLBACK_STEM: &str = "video";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("unsafe char pattern compiles"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("separator pattern compiles"));

/// A finished file inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub filename: String,
    pub path: PathBuf,
}

/// Drops everything except word characters, whitespace and hyphens, collapses
/// whitespace/hyphen runs into a single `-` and caps the result at
/// [`MAX_FILENAME_CHARS`] characters and [`MAX_STEM_BYTES`] bytes.
pub fn sanitize_filename(title: &str) -> String {
    let stripped = UNSAFE_CHARS.replace_all(title, "");
    let collapsed = SEPARATOR_RUNS.replace_all(&stripped, "-");
    let capped: String = collapsed.chars().take(MAX_FILENAME_CHARS).collect();
    truncate_to_bytes(&capped, MAX_STEM_BYTES).to_string()
}

/// Longest prefix of `value` that fits in `max_bytes` without splitting a
/// character.
fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Sanitized stem for a video title, never empty.
pub fn output_stem(title: &str) -> String {
    let stem = sanitize_filename(title);
    if stem.is_empty() || stem == "-" {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}

/// Reduces a user-supplied filename to its final component so lookups can
/// never leave the base directory. `None` for empty names, `.` and `..`.
pub fn safe_basename(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Path::new(trimmed)
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
}

/// Copies `source` into `dir` as `{stem}{ext}`, or `{stem}_1{ext}`,
/// `{stem}_2{ext}`, … when the name is taken. `ext` includes the leading dot.
pub fn copy_to_unique(
    source: &Path,
    dir: &Path,
    stem: &str,
    ext: &str,
) -> io::Result<DownloadedFile> {
    fs::create_dir_all(dir)?;
    let (filename, path, mut target) = claim_unique_name(dir, stem, ext)?;
    let copied = File::open(source).and_then(|mut input| io::copy(&mut input, &mut target));
    if let Err(err) = copied {
        drop(target);
        let _ = fs::remove_file(&path);
        return Err(err);
    }
    target.sync_all()?;
    Ok(DownloadedFile { filename, path })
}

// create_new makes the existence check and the claim a single step, so two
// requests for the same title cannot end up writing the same file.
fn claim_unique_name(dir: &Path, stem: &str, ext: &str) -> io::Result<(String, PathBuf, File)> {
    let mut counter: u32 = 0;
    loop {
        let filename = if counter == 0 {
            format!("{stem}{ext}")
        } else {
            format!("{stem}_{counter}{ext}")
        };
        let path = dir.join(&filename);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((filename, path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_keeps_word_chars_and_hyphens() {
        let cleaned = sanitize_filename("Rick Astley - Never Gonna Give You Up (Official Video)!");
        assert_eq!(cleaned, "Rick-Astley-Never-Gonna-Give-You-Up-Official-Video");
        assert!(
            cleaned
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("a\\b:c*d?e"), "abcde");
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        let title = "word ".repeat(100);
        let cleaned = sanitize_filename(&title);
        assert_eq!(cleaned.chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn sanitize_applies_the_tighter_of_both_caps() {
        // 150 two-byte characters fit the character cap but not the byte cap.
        let cleaned = sanitize_filename(&"é".repeat(150));
        assert_eq!(cleaned.len(), MAX_STEM_BYTES);
        assert_eq!(cleaned.chars().count(), MAX_STEM_BYTES / 2);
    }

    #[test]
    fn sanitize_caps_multibyte_titles_by_bytes() {
        let title = "日本語のタイトル".repeat(12);
        let cleaned = sanitize_filename(&title);
        assert!(cleaned.len() <= MAX_STEM_BYTES);
        assert_eq!(cleaned.len() % 3, 0);
        assert!(title.starts_with(&cleaned));

        assert_eq!(truncate_to_bytes("aé", 2), "a");
        assert_eq!(truncate_to_bytes("abc", 10), "abc");
    }

    #[test]
    fn output_stem_falls_back_for_punctuation_titles() {
        assert_eq!(output_stem("!!!"), "video");
        assert_eq!(output_stem("   "), "video");
        assert_eq!(output_stem("Clip 1"), "Clip-1");
    }

    #[test]
    fn safe_basename_drops_directories() {
        assert_eq!(safe_basename("../../etc/passwd"), Some("passwd"));
        assert_eq!(safe_basename("/abs/path/song.mp3"), Some("song.mp3"));
        assert_eq!(safe_basename("video.mp4"), Some("video.mp4"));
        assert_eq!(safe_basename(".."), None);
        assert_eq!(safe_basename(""), None);
    }

    #[test]
    fn copy_to_unique_appends_counters() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"payload").unwrap();
        let out = dir.path().join("out");

        let first = copy_to_unique(&source, &out, "Title", ".mp4").unwrap();
        let second = copy_to_unique(&source, &out, "Title", ".mp4").unwrap();
        let third = copy_to_unique(&source, &out, "Title", ".mp4").unwrap();

        assert_eq!(first.filename, "Title.mp4");
        assert_eq!(second.filename, "Title_1.mp4");
        assert_eq!(third.filename, "Title_2.mp4");
        assert_eq!(std::fs::read(&third.path).unwrap(), b"payload");
    }

    #[test]
    fn copy_to_unique_releases_name_when_source_missing() {
        let dir = tempdir().unwrap();
        let err = copy_to_unique(&dir.path().join("missing"), dir.path(), "Title", ".mp3")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!dir.path().join("Title.mp3").exists());
    }
}
