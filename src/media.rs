use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use crate::cellart::{self, CellArt};
use crate::post::{MediaAttachment, MediaKind};

pub const MAX_FRAMES: usize = 8;
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(8);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(6);
pub const MAX_BYTES: usize = 4 * 1024 * 1024;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(format!("fedi-tui/{}", crate::VERSION))
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("frame extractor `{0}` is not installed")]
    ToolMissing(String),
    #[error("gave up after {0:?}")]
    Timeout(Duration),
    #[error("download exceeded {0} bytes")]
    TooLarge(usize),
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("no usable preview source")]
    NoCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewOwner {
    Post,
    Avatar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Thumbnail shown in lists.
    Base,
    /// Larger rendering used when a post with a single attachment is opened.
    Single,
}

impl Resolution {
    pub fn grid(&self, owner: PreviewOwner) -> (u16, u16) {
        match (owner, self) {
            (PreviewOwner::Avatar, _) => (8, 4),
            (PreviewOwner::Post, Resolution::Base) => (32, 10),
            (PreviewOwner::Post, Resolution::Single) => (64, 20),
        }
    }
}

pub fn cache_key(owner: PreviewOwner, resolution: Resolution, url: &str) -> String {
    let owner = match owner {
        PreviewOwner::Post => "post",
        PreviewOwner::Avatar => "avatar",
    };
    let resolution = match resolution {
        Resolution::Base => "base",
        Resolution::Single => "single",
    };
    format!("{owner}:{resolution}:{url}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTarget {
    pub url: String,
    pub fallback_url: Option<String>,
    pub animated: bool,
}

/// Preview sources for a post's attachments, deduplicated by URL. Motion
/// media prefers the original (frames are extracted from it) and falls back
/// to the static preview; still images prefer the smaller preview.
pub fn preview_targets(media: &[MediaAttachment]) -> Vec<PreviewTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for attachment in media {
        let url = attachment.url.trim();
        let preview = attachment.preview_url.trim();
        let gif = is_gif_url(url);
        let (primary, fallback, animated) = match attachment.kind {
            MediaKind::Video | MediaKind::Gifv => (url, preview, true),
            MediaKind::Image if gif => (url, preview, true),
            MediaKind::Image => (preview, url, false),
            MediaKind::Audio | MediaKind::Unknown => (preview, "", false),
        };
        let (primary, fallback) = if primary.is_empty() {
            (fallback, "")
        } else {
            (primary, fallback)
        };
        if primary.is_empty() || !seen.insert(primary.to_string()) {
            continue;
        }
        targets.push(PreviewTarget {
            url: primary.to_string(),
            fallback_url: (!fallback.is_empty() && fallback != primary)
                .then(|| fallback.to_string()),
            animated,
        });
    }
    targets
}

pub fn is_gif_url(raw: &str) -> bool {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.to_ascii_lowercase().ends_with(".gif")
}

pub fn strip_query(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

/// Download attempts in order, each flagged with whether a GIF there may be
/// decoded as an animation.
pub fn candidates(target: &PreviewTarget) -> Vec<(String, bool)> {
    let mut list: Vec<(String, bool)> = Vec::new();
    let primary_animates = target.animated && is_gif_url(&target.url);
    let mut push = |url: String, animate: bool| {
        if !url.is_empty() && !list.iter().any(|(existing, _)| *existing == url) {
            list.push((url, animate));
        }
    };
    push(target.url.clone(), primary_animates);
    push(strip_query(&target.url), primary_animates);
    if let Some(fallback) = &target.fallback_url {
        push(fallback.clone(), false);
        push(strip_query(fallback), false);
    }
    list
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub art: CellArt,
    pub frames: Vec<CellArt>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_bytes: usize,
    pub fetch_timeout: Duration,
    pub frame_timeout: Duration,
    pub max_frames: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_bytes: MAX_BYTES,
            fetch_timeout: FETCH_TIMEOUT,
            frame_timeout: FRAME_TIMEOUT,
            max_frames: MAX_FRAMES,
        }
    }
}

/// Byte sources for the preview pipeline.
pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, url: &str, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;
    /// Returns the first `max_frames` frames of `url` as GIF bytes.
    fn extract_frames(&self, url: &str, max_frames: usize, timeout: Duration) -> Result<Vec<u8>>;
}

/// Downloads over HTTP and shells out to an ffmpeg-compatible tool for
/// frame extraction.
pub struct HttpFetcher {
    frame_tool: String,
}

impl HttpFetcher {
    pub fn new(frame_tool: impl Into<String>) -> Self {
        Self {
            frame_tool: frame_tool.into(),
        }
    }
}

impl MediaFetcher for HttpFetcher {
    fn fetch(&self, url: &str, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let response = HTTP_CLIENT
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("media: download {url}"))?
            .error_for_status()
            .with_context(|| format!("media: request {url}"))?;
        let mut bytes = Vec::new();
        response
            .take(max_bytes as u64 + 1)
            .read_to_end(&mut bytes)
            .context("media: body")?;
        if bytes.len() > max_bytes {
            return Err(MediaError::TooLarge(max_bytes).into());
        }
        Ok(bytes)
    }

    fn extract_frames(&self, url: &str, max_frames: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.frame_tool);
        command
            .args(["-v", "error", "-i", url])
            .args(["-frames:v", &max_frames.to_string()])
            .args(["-vf", "fps=4,scale=160:-1"])
            .args(["-f", "gif", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::ToolMissing(self.frame_tool.clone()).into());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("launch {}", self.frame_tool));
            }
        };

        let mut stdout = child.stdout.take().context("frame extractor stdout")?;
        let reader = thread::spawn(move || {
            let mut buffer = Vec::new();
            stdout.read_to_end(&mut buffer).map(|_| buffer)
        });

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let bytes = reader
                        .join()
                        .map_err(|_| anyhow::anyhow!("frame reader panicked"))?
                        .context("read extracted frames")?;
                    if !status.success() || bytes.is_empty() {
                        anyhow::bail!("{} exited with {:?}", self.frame_tool, status.code());
                    }
                    return Ok(bytes);
                }
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MediaError::Timeout(timeout).into());
                }
                Ok(None) => thread::sleep(Duration::from_millis(30)),
                Err(err) => {
                    let _ = child.kill();
                    return Err(err).context("poll frame extractor");
                }
            }
        }
    }
}

/// Runs the fetch/decode pipeline for one target: frame extraction for
/// animated media first, then each download candidate until one decodes.
pub fn load_preview(
    fetcher: &dyn MediaFetcher,
    target: &PreviewTarget,
    grid: (u16, u16),
    settings: &Settings,
) -> Result<Decoded> {
    if target.animated {
        match fetcher
            .extract_frames(&target.url, settings.max_frames, settings.frame_timeout)
            .and_then(|bytes| decode(&bytes, true, grid, settings.max_frames))
        {
            Ok(decoded) => return Ok(decoded),
            Err(err) => debug!(url = %target.url, error = %err, "frame extraction failed"),
        }
    }

    let mut last_error: Option<anyhow::Error> = None;
    for (url, animate) in candidates(target) {
        let attempt = fetcher
            .fetch(&url, settings.max_bytes, settings.fetch_timeout)
            .and_then(|bytes| decode(&bytes, animate, grid, settings.max_frames));
        match attempt {
            Ok(decoded) => return Ok(decoded),
            Err(err) => {
                debug!(url = %url, error = %err, "preview candidate failed");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| MediaError::NoCandidate.into()))
}

pub fn decode(bytes: &[u8], allow_animation: bool, grid: (u16, u16), max_frames: usize) -> Result<Decoded> {
    let (cols, rows) = grid;
    if allow_animation && matches!(image::guess_format(bytes), Ok(ImageFormat::Gif)) {
        let decoder =
            GifDecoder::new(Cursor::new(bytes)).map_err(|err| MediaError::Decode(err.to_string()))?;
        let frames = decoder
            .into_frames()
            .take(max_frames.max(1))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| MediaError::Decode(err.to_string()))?;
        let mut arts: Vec<CellArt> = frames
            .iter()
            .map(|frame| cellart::rasterize(frame.buffer(), cols, rows))
            .collect();
        if let Some(first) = arts.first().cloned() {
            if arts.len() == 1 {
                arts.clear();
            }
            return Ok(Decoded {
                art: first,
                frames: arts,
            });
        }
    }

    let image = image::load_from_memory(bytes)
        .map_err(|err| MediaError::Decode(err.to_string()))?
        .to_rgba8();
    Ok(Decoded {
        art: cellart::rasterize(&image, cols, rows),
        frames: Vec::new(),
    })
}

/// One cached preview. `art == None` marks media known to be unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaPreview {
    pub art: Option<CellArt>,
    pub frames: Vec<CellArt>,
    pub frame_index: usize,
}

impl MediaPreview {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.art.is_some()
    }

    pub fn current(&self) -> Option<&CellArt> {
        self.frames.get(self.frame_index).or(self.art.as_ref())
    }

    fn advance(&mut self) -> bool {
        if self.frames.len() < 2 {
            return false;
        }
        self.frame_index = (self.frame_index + 1) % self.frames.len();
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaCache {
    entries: HashMap<String, MediaPreview>,
    in_flight: HashSet<String>,
}

impl MediaCache {
    pub fn get(&self, key: &str) -> Option<&MediaPreview> {
        self.entries.get(key)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    /// Marks `key` in flight unless it is cached or already requested.
    pub fn begin(&mut self, key: &str) -> bool {
        if self.entries.contains_key(key) || self.in_flight.contains(key) {
            return false;
        }
        self.in_flight.insert(key.to_string());
        true
    }

    pub fn complete(&mut self, key: &str, owner: PreviewOwner, result: Result<Decoded, String>) {
        self.in_flight.remove(key);
        match result {
            Ok(decoded) => {
                self.entries.insert(
                    key.to_string(),
                    MediaPreview {
                        art: Some(decoded.art),
                        frames: decoded.frames,
                        frame_index: 0,
                    },
                );
            }
            Err(_) if owner == PreviewOwner::Avatar => {}
            Err(_) => {
                self.entries
                    .insert(key.to_string(), MediaPreview::unavailable());
            }
        }
    }

    /// Advances every animated entry one frame. Returns whether anything moved.
    pub fn tick(&mut self) -> bool {
        let mut moved = false;
        for preview in self.entries.values_mut() {
            moved |= preview.advance();
        }
        moved
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
