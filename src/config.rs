#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_WWW_ROOT: &str = "static";
pub const DEFAULT_VIDFLOW_PORT: u16 = 5000;
pub const DEFAULT_VIDFLOW_HOST: &str = "127.0.0.1";
pub const DEFAULT_YT_DLP: &str = crate::ytdlp::DEFAULT_YT_DLP_BIN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub downloads_dir: PathBuf,
    pub www_root: PathBuf,
    pub port: u16,
    pub host: String,
    pub yt_dlp: PathBuf,
}

/// Values that win over both the environment and the `.env` file, usually
/// coming from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub downloads_dir: Option<PathBuf>,
    pub www_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub yt_dlp: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_runtime_settings(&file_vars, env_var_string, overrides))
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let path_setting = |value: Option<PathBuf>, key: &str, default: &str| {
        value
            .or_else(|| lookup_value(key, file_vars, &env_lookup).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(default))
    };

    let downloads_dir = path_setting(
        overrides.downloads_dir,
        "VIDFLOW_DOWNLOADS_DIR",
        DEFAULT_DOWNLOADS_DIR,
    );
    let www_root = path_setting(overrides.www_root, "VIDFLOW_WWW_ROOT", DEFAULT_WWW_ROOT);
    let yt_dlp = path_setting(overrides.yt_dlp, "VIDFLOW_YT_DLP", DEFAULT_YT_DLP);
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("VIDFLOW_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_VIDFLOW_PORT);
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value("VIDFLOW_HOST", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_VIDFLOW_HOST.to_string());

    RuntimeSettings {
        downloads_dir,
        www_root,
        port,
        host,
        yt_dlp,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

/// Parses `KEY=value` lines, tolerating `export` prefixes, quotes, blank
/// lines and comments. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
