//! Download step of a conversion: open the video, pick a stream, fetch it
//! into a scratch directory and move it into the output directory.
//!
//! "MP3" output is the native audio container (usually m4a or webm) renamed
//! to `.mp3`. Nothing is re-encoded; most players cope, some strict decoders
//! will not.

use std::path::Path;

use tracing::{info, warn};

use crate::{
    convert::ConversionRequest,
    error::ConvertError,
    extractor::VideoExtractor,
    fetcher::{RetryPolicy, open_with_retry},
    files::{DownloadedFile, copy_to_unique, output_stem},
    selector::select_stream,
};

const WORK_DIR_PREFIX: &str = "vidflow-";

/// Produces the requested file in `output_dir`. The scratch directory is
/// removed whether or not the download succeeds.
pub fn download_media(
    extractor: &dyn VideoExtractor,
    request: &ConversionRequest,
    output_dir: &Path,
    retry: &RetryPolicy,
) -> Result<DownloadedFile, ConvertError> {
    download_media_in(extractor, request, output_dir, retry, &std::env::temp_dir())
}

/// [`download_media`] with the scratch directory created under `scratch_root`.
pub(crate) fn download_media_in(
    extractor: &dyn VideoExtractor,
    request: &ConversionRequest,
    output_dir: &Path,
    retry: &RetryPolicy,
    scratch_root: &Path,
) -> Result<DownloadedFile, ConvertError> {
    let work_dir = tempfile::Builder::new()
        .prefix(WORK_DIR_PREFIX)
        .tempdir_in(scratch_root)?;
    let result = download_into(extractor, request, work_dir.path(), output_dir, retry);
    let work_path = work_dir.path().to_path_buf();
    if let Err(err) = work_dir.close() {
        warn!(path = %work_path.display(), error = %err, "failed to remove work directory");
    }
    result
}

fn download_into(
    extractor: &dyn VideoExtractor,
    request: &ConversionRequest,
    work_dir: &Path,
    output_dir: &Path,
    retry: &RetryPolicy,
) -> Result<DownloadedFile, ConvertError> {
    let handle = open_with_retry(extractor, &request.url, retry)?;
    let stem = output_stem(handle.title.as_deref().unwrap_or_default());
    let stream = select_stream(&handle.streams, request.format, request.quality)?;
    info!(
        stream = %stream.id,
        kind = ?stream.kind,
        container = %stream.container,
        resolution = ?stream.resolution,
        "selected stream"
    );

    let downloaded = extractor.download(&request.url, stream, work_dir, &stem)?;
    if !downloaded.is_file() {
        return Err(ConvertError::Upstream(format!(
            "Downloaded file not found: {}",
            downloaded.display()
        )));
    }

    let stored = copy_to_unique(&downloaded, output_dir, &stem, request.format.extension())?;
    Ok(stored)
}
