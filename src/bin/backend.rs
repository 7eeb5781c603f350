#![forbid(unsafe_code)]

//! Axum backend for vidflow.
//!
//! Serves the conversion API (`/health`, `/video-info`, `/convert`,
//! `/download/{filename}`) and falls back to the static front end for every
//! other path. All extractor work is blocking, so handlers hand it to
//! `spawn_blocking` and await the result.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State, rejection::JsonRejection},
    http::{HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use clap::Parser;
use mime_guess::{MimeGuess, mime::Mime};
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vidflow::{
    config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings},
    convert::{ConversionRequest, Converter, validate_url},
    error::ConvertError,
    files::safe_basename,
    security::ensure_not_root,
    ytdlp::YtDlp,
};

const DEFAULT_LOG_FILTER: &str = "vidflow=info,backend=info,tower_http=info";
const CACHE_HIT_MESSAGE: &str = "File retrieved from cache";
const CONVERTED_MESSAGE: &str = "Conversion completed successfully";

#[derive(Debug, Clone, Parser)]
#[command(name = "backend", about = "YouTube to MP4/MP3 conversion server")]
struct BackendArgs {
    /// Directory finished files are written to and served from.
    #[arg(long)]
    downloads_dir: Option<PathBuf>,
    /// Directory holding the static front end.
    #[arg(long)]
    www_root: Option<PathBuf>,
    #[arg(long)]
    host: Option<IpAddr>,
    #[arg(long)]
    port: Option<u16>,
    /// Path to the yt-dlp executable.
    #[arg(long = "yt-dlp")]
    yt_dlp: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn resolve(self) -> Result<RuntimeSettings> {
        let settings = resolve_runtime_settings(RuntimeOverrides {
            downloads_dir: self.downloads_dir,
            www_root: self.www_root,
            port: self.port,
            host: self.host.map(|host| host.to_string()),
            yt_dlp: self.yt_dlp,
            env_path: self.env_file,
        })?;
        Ok(settings)
    }
}

fn parse_host(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/VIDFLOW_HOST")
}

#[derive(Clone)]
struct AppState {
    converter: Arc<Converter>,
    www_root: Arc<PathBuf>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// `/video-info` only distinguishes bad input from everything else.
    fn from_info_error(err: ConvertError) -> Self {
        match err {
            ConvertError::InvalidInput(message) => Self::bad_request(message),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        let status = match &err {
            ConvertError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ConvertError::PrivateVideo | ConvertError::VideoUnavailable => StatusCode::NOT_FOUND,
            ConvertError::AgeRestricted => StatusCode::FORBIDDEN,
            ConvertError::Upstream(_)
            | ConvertError::NoSuitableStream(_)
            | ConvertError::FileIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    timestamp: DateTime<Utc>,
    cache_size: usize,
    backend: &'static str,
    ffmpeg_required: bool,
}

#[derive(Debug, Default, Deserialize)]
struct VideoInfoRequest {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct VideoInfoResponse {
    success: bool,
    title: String,
    thumbnail: String,
    duration: String,
    uploader: String,
    view_count: u64,
}

/// Clients send quality either as `"720p"`/`"best"` or as a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum QualityField {
    Number(u64),
    Text(String),
}

impl QualityField {
    fn into_text(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConvertRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    quality: Option<QualityField>,
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    success: bool,
    filename: String,
    title: String,
    message: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = BackendArgs::parse().resolve()?;
    ensure_not_root("backend")?;

    let host = parse_host(&settings.host)?;
    tokio::fs::create_dir_all(&settings.downloads_dir)
        .await
        .with_context(|| format!("creating {}", settings.downloads_dir.display()))?;

    let extractor = Arc::new(YtDlp::new(&settings.yt_dlp));
    let state = AppState {
        converter: Arc::new(Converter::new(extractor, &settings.downloads_dir)),
        www_root: Arc::new(settings.www_root.clone()),
    };
    let app = router(state);

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(
        %addr,
        downloads_dir = %settings.downloads_dir.display(),
        yt_dlp = %settings.yt_dlp.display(),
        "vidflow listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/video-info", post(video_info))
        .route("/convert", post(convert))
        .route("/download/{filename}", get(download))
        .fallback(static_fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthPayload> {
    Json(HealthPayload {
        status: "healthy",
        timestamp: Utc::now(),
        cache_size: state.converter.cache().len(),
        backend: state.converter.backend_name(),
        ffmpeg_required: false,
    })
}

async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> ApiResult<Json<VideoInfoResponse>> {
    let Json(payload) = payload?;
    let url = validate_url(payload.url.as_deref().unwrap_or_default())
        .map_err(ApiError::from_info_error)?;

    let converter = state.converter.clone();
    let info = run_blocking(move || converter.video_info(&url))
        .await?
        .map_err(|err| {
            warn!(error = %err, "video info lookup failed");
            ApiError::from_info_error(err)
        })?;

    Ok(Json(VideoInfoResponse {
        success: true,
        duration: info.duration_text(),
        title: info.title,
        thumbnail: info.thumbnail_url,
        uploader: info.uploader,
        view_count: info.view_count,
    }))
}

async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> ApiResult<Json<ConvertResponse>> {
    let Json(payload) = payload?;
    let quality = payload
        .quality
        .map(QualityField::into_text)
        .unwrap_or_else(|| "best".to_string());
    let request = ConversionRequest::parse(
        payload.url.as_deref().unwrap_or_default(),
        payload.format.as_deref().unwrap_or("mp4"),
        &quality,
    )?;

    let converter = state.converter.clone();
    let conversion = run_blocking(move || converter.convert(&request))
        .await?
        .map_err(|err| {
            error!(error = %err, "conversion failed");
            ApiError::from(err)
        })?;

    Ok(Json(ConvertResponse {
        success: true,
        message: if conversion.from_cache {
            CACHE_HIT_MESSAGE
        } else {
            CONVERTED_MESSAGE
        },
        filename: conversion.filename,
        title: conversion.title,
    }))
}

async fn download(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Response> {
    let name = safe_basename(&filename).ok_or_else(|| ApiError::not_found("file not found"))?;
    let path = state.converter.output_dir().join(name);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("file not found"));
    }

    let mut response = stream_file(path, Some(mime_guess::mime::APPLICATION_OCTET_STREAM)).await?;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    let disposition = HeaderValue::from_str(&content_disposition(name))
        .map_err(|_| ApiError::internal("could not build download headers"))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

async fn run_blocking<T, F>(job: F) -> ApiResult<Result<T, ConvertError>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(|err| {
        error!(error = %err, "blocking task failed");
        ApiError::internal("worker task failed")
    })
}

fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_') {
                character
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// `/about` resolves to `about.html` when that page exists; other
/// extension-less paths get `index.html`.
async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html"), None).await,
        Ok(_) => stream_file(target, None).await,
        Err(_) if should_fallback_to_index(request_path) => {
            let page = target.with_extension("html");
            if tokio::fs::metadata(&page)
                .await
                .is_ok_and(|meta| meta.is_file())
            {
                stream_file(page, None).await
            } else {
                stream_file(root.join("index.html"), None).await
            }
        }
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

/// Extension-less paths are front-end pages; anything with an extension is a
/// real asset and must exist.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

async fn stream_file(path: PathBuf, mime: Option<Mime>) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let guessed = mime.or_else(|| MimeGuess::from_path(&path).first());
    if let Some(mime) = guessed
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
