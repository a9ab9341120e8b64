use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::media;
use crate::paging;

const DEFAULT_ENV_PREFIX: &str = "FEDI_TUI";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_hashtag")]
    pub hashtag: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_reply_page_size")]
    pub reply_page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            hashtag: default_hashtag(),
            page_size: default_page_size(),
            reply_page_size: default_reply_page_size(),
        }
    }
}

fn default_hashtag() -> String {
    "rust".into()
}

fn default_page_size() -> usize {
    paging::PAGE_SIZE
}

fn default_reply_page_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            tick: default_tick(),
        }
    }
}

fn default_tick() -> Duration {
    Duration::from_millis(120)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_media_enabled")]
    pub enabled: bool,
    #[serde(default = "default_frame_tool")]
    pub frame_tool: String,
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
    #[serde(default = "default_frame_timeout", with = "humantime_serde")]
    pub frame_timeout: Duration,
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: default_media_enabled(),
            frame_tool: default_frame_tool(),
            max_frames: default_max_frames(),
            frame_timeout: default_frame_timeout(),
            fetch_timeout: default_fetch_timeout(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl MediaConfig {
    pub fn settings(&self) -> media::Settings {
        media::Settings {
            max_bytes: self.max_bytes,
            fetch_timeout: self.fetch_timeout,
            frame_timeout: self.frame_timeout,
            max_frames: self.max_frames,
        }
    }
}

fn default_media_enabled() -> bool {
    true
}

fn default_frame_tool() -> String {
    "ffmpeg".into()
}

fn default_max_frames() -> usize {
    media::MAX_FRAMES
}

fn default_frame_timeout() -> Duration {
    media::FRAME_TIMEOUT
}

fn default_fetch_timeout() -> Duration {
    media::FETCH_TIMEOUT
}

fn default_max_bytes() -> usize {
    media::MAX_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.feed.hashtag.trim().is_empty() {
        base.feed.hashtag = other.feed.hashtag;
    }
    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    if other.feed.reply_page_size != 0 {
        base.feed.reply_page_size = other.feed.reply_page_size;
    }

    if !other.ui.tick.is_zero() {
        base.ui.tick = other.ui.tick;
    }

    base.media.enabled = other.media.enabled;
    if !other.media.frame_tool.trim().is_empty() {
        base.media.frame_tool = other.media.frame_tool;
    }
    if other.media.max_frames != 0 {
        base.media.max_frames = other.media.max_frames;
    }
    if !other.media.frame_timeout.is_zero() {
        base.media.frame_timeout = other.media.frame_timeout;
    }
    if !other.media.fetch_timeout.is_zero() {
        base.media.fetch_timeout = other.media.fetch_timeout;
    }
    if other.media.max_bytes != 0 {
        base.media.max_bytes = other.media.max_bytes;
    }

    if !other.log.level.trim().is_empty() {
        base.log.level = other.log.level;
    }
    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }

    base
}

fn env_values(prefix: &str) -> HashMap<String, String> {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect()
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    for (key, value) in env_values(prefix) {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.hashtag" => cfg.feed.hashtag = value,
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.page_size = parsed.max(1);
            }
        }
        "feed.reply_page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.reply_page_size = parsed.max(1);
            }
        }
        "ui.tick" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.tick = duration;
            }
        }
        "media.enabled" => {
            cfg.media.enabled = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "media.frame_tool" => cfg.media.frame_tool = value,
        "media.max_frames" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.max_frames = parsed;
            }
        }
        "media.frame_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.frame_timeout = duration;
            }
        }
        "media.fetch_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.fetch_timeout = duration;
            }
        }
        "media.max_bytes" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.max_bytes = parsed;
            }
        }
        "log.level" => cfg.log.level = value,
        "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.yaml"))
}

/// Directory holding `config.yaml` and `prefs.json`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fedi-tui"))
}
