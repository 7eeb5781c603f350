//! Metadata lookups with bounded retry around the extractor.

use std::{thread, time::Duration};

use tracing::warn;

use crate::{
    error::{ConvertError, ExtractError},
    extractor::{VideoExtractor, VideoHandle},
    metadata::VideoInfo,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Linear backoff: the wait before retry `n` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Opens a video handle, retrying only [`ExtractError::Transient`] failures.
/// Blocks the calling thread while backing off.
pub fn open_with_retry(
    extractor: &dyn VideoExtractor,
    url: &str,
    policy: &RetryPolicy,
) -> Result<VideoHandle, ExtractError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match extractor.open(url) {
            Ok(handle) => return Ok(handle),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient extractor error, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn fetch_video_info(
    extractor: &dyn VideoExtractor,
    url: &str,
    policy: &RetryPolicy,
) -> Result<VideoInfo, ConvertError> {
    let handle = open_with_retry(extractor, url, policy)?;
    Ok(VideoInfo::from_handle(&handle))
}
