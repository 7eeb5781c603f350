#![forbid(unsafe_code)]

//! Building blocks for the vidflow backend: URL validation, stream selection,
//! download orchestration and the in-memory conversion cache. The HTTP layer
//! lives in `src/bin/backend.rs`.

pub mod cache;
pub mod config;
pub mod convert;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod files;
pub mod metadata;
pub mod security;
pub mod selector;
pub mod url;
pub mod ytdlp;
