//! Conversion requests and the service that runs them.
//!
//! [`Converter`] is the whole pipeline behind `/convert`: cache lookup,
//! metadata fetch, download, cache insert. Every method blocks, so async
//! callers should run it on a blocking thread.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    cache::{CacheEntry, ConversionCache, fingerprint},
    downloader::download_media,
    error::ConvertError,
    extractor::VideoExtractor,
    fetcher::{RetryPolicy, fetch_video_info},
    metadata::VideoInfo,
    url::{extract_video_id, is_youtube_url},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Mp4,
    Mp3,
}

impl MediaFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mp3 => "mp3",
        }
    }

    /// Extension given to the stored file, dot included.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => ".mp4",
            Self::Mp3 => ".mp3",
        }
    }
}

impl FromStr for MediaFormat {
    type Err = ConvertError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "mp3" => Ok(Self::Mp3),
            _ => Err(ConvertError::invalid_input("Invalid format. Use mp4 or mp3")),
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    /// Target vertical resolution, e.g. `720`.
    Height(u32),
}

impl FromStr for Quality {
    type Err = ConvertError;

    /// Accepts `best`, `720` or `720p`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("best") {
            return Ok(Self::Best);
        }
        let digits = trimmed
            .strip_suffix('p')
            .or_else(|| trimmed.strip_suffix('P'))
            .unwrap_or(trimmed);
        match digits.parse::<u32>() {
            Ok(height) if height > 0 => Ok(Self::Height(height)),
            _ => Err(ConvertError::invalid_input(
                "Invalid quality. Use best or a resolution such as 720",
            )),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => f.write_str("best"),
            Self::Height(height) => write!(f, "{height}"),
        }
    }
}

/// Checks that `url` is present and looks like a YouTube link; returns it
/// trimmed.
pub fn validate_url(url: &str) -> Result<String, ConvertError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ConvertError::invalid_input("URL is required"));
    }
    if !is_youtube_url(trimmed) {
        return Err(ConvertError::invalid_input("Invalid YouTube URL"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
}

impl ConversionRequest {
    /// Validates raw request fields in the order the API reports them: URL,
    /// then format, then quality.
    pub fn parse(url: &str, format: &str, quality: &str) -> Result<Self, ConvertError> {
        let url = validate_url(url)?;
        let format = format.parse()?;
        let quality = quality.parse()?;
        Ok(Self {
            url,
            format,
            quality,
        })
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.url, self.format.as_str(), &self.quality.to_string())
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub filename: String,
    pub title: String,
    pub path: PathBuf,
    pub from_cache: bool,
}

pub struct Converter {
    extractor: Arc<dyn VideoExtractor>,
    cache: ConversionCache,
    output_dir: PathBuf,
    retry: RetryPolicy,
}

impl Converter {
    pub fn new(extractor: Arc<dyn VideoExtractor>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            cache: ConversionCache::new(),
            output_dir: output_dir.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    pub fn backend_name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn video_info(&self, url: &str) -> Result<VideoInfo, ConvertError> {
        fetch_video_info(self.extractor.as_ref(), url, &self.retry)
    }

    pub fn convert(&self, request: &ConversionRequest) -> Result<Conversion, ConvertError> {
        let key = request.fingerprint();
        let video_id = extract_video_id(&request.url).unwrap_or_default();

        if let Some(entry) = self.cache.lookup(&key) {
            debug!(%video_id, filename = %entry.filename, "conversion cache hit");
            return Ok(Conversion {
                filename: entry.filename,
                title: entry.title,
                path: entry.path,
                from_cache: true,
            });
        }

        let info = fetch_video_info(self.extractor.as_ref(), &request.url, &self.retry)?;
        info!(
            %video_id,
            title = %info.title,
            format = %request.format,
            quality = %request.quality,
            "starting conversion"
        );

        let file = download_media(
            self.extractor.as_ref(),
            request,
            &self.output_dir,
            &self.retry,
        )?;
        info!(%video_id, filename = %file.filename, "conversion finished");

        let conversion = Conversion {
            filename: file.filename.clone(),
            title: info.title.clone(),
            path: file.path.clone(),
            from_cache: false,
        };
        let evicted = self.cache.insert(CacheEntry::new(key, file, info.title));
        if evicted > 0 {
            debug!(evicted, "expired cache entries removed");
        }
        Ok(conversion)
    }
}
