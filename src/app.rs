use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{self, Config};
use crate::data::{MemoryBackend, Services};
use crate::engine::{self, Model};
use crate::feed::FeedView;
use crate::logging;
use crate::media::HttpFetcher;
use crate::prefs::{self, Preferences};
use crate::ui;

const LOCAL_ACCOUNT: &str = "me";

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let _log_guard = logging::init(&cfg.log).context("initialise logging")?;
    info!(
        version = crate::VERSION,
        config = %friendly_path(config::default_path().as_ref()),
        "starting"
    );

    let prefs_path = prefs::default_path();
    let stored = match prefs_path.as_deref().map(prefs::load) {
        Some(Ok(stored)) => stored,
        Some(Err(err)) => {
            warn!(error = %err, "ignoring unreadable preferences");
            None
        }
        None => None,
    };

    let options = engine_options(&cfg, stored, prefs_path);
    let backend = Arc::new(MemoryBackend::with_samples(LOCAL_ACCOUNT, &options.primary_tag));
    let fetcher = Arc::new(HttpFetcher::new(cfg.media.frame_tool.clone()));
    let model = Model::new(Services::from_backend(backend, fetcher), options);

    let mut app = ui::App::new(model, ui::Options { tick: cfg.ui.tick });
    app.run()
}

/// Combines the config file with restored preferences. A saved custom view
/// without a hashtag falls back to the primary tag.
fn engine_options(cfg: &Config, stored: Option<Preferences>, prefs_path: Option<PathBuf>) -> engine::Options {
    let stored = stored.unwrap_or_default();
    let custom_tag = crate::feed::normalize_tag(&stored.hashtag);
    let view = match stored.feed_source {
        FeedView::CustomTag if custom_tag.is_empty() => FeedView::PrimaryTag,
        view => view,
    };
    engine::Options {
        primary_tag: crate::feed::normalize_tag(&cfg.feed.hashtag),
        custom_tag,
        view,
        page_size: cfg.feed.page_size.max(1),
        reply_page_size: cfg.feed.reply_page_size.max(1),
        media_enabled: cfg.media.enabled,
        media: cfg.media.settings(),
        prefs_path,
    }
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/fedi-tui/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restored_custom_view_keeps_its_tag() {
        let stored = Preferences {
            hashtag: "#Gardening".into(),
            feed_source: FeedView::CustomTag,
        };
        let options = engine_options(&Config::default(), Some(stored), None);
        assert_eq!(options.view, FeedView::CustomTag);
        assert_eq!(options.custom_tag, "gardening");
    }

    #[test]
    fn custom_view_without_tag_falls_back() {
        let stored = Preferences {
            hashtag: "  ".into(),
            feed_source: FeedView::CustomTag,
        };
        let options = engine_options(&Config::default(), Some(stored), None);
        assert_eq!(options.view, FeedView::PrimaryTag);
    }

    #[test]
    fn missing_preferences_use_config() {
        let mut cfg = Config::default();
        cfg.feed.hashtag = "Rust".into();
        cfg.feed.page_size = 0;
        cfg.media.enabled = false;
        let options = engine_options(&cfg, None, Some(PathBuf::from("/tmp/prefs.json")));
        assert_eq!(options.primary_tag, "rust");
        assert_eq!(options.view, FeedView::PrimaryTag);
        assert_eq!(options.page_size, 1);
        assert!(!options.media_enabled);
        assert!(options.prefs_path.is_some());
    }

    #[test]
    fn home_paths_are_shortened() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let path = home.join(".config/fedi-tui/config.yaml");
        assert_eq!(friendly_path(Some(&path)), "~/.config/fedi-tui/config.yaml");
        assert_eq!(friendly_path(None), "~/.config/fedi-tui/config.yaml");
    }
}
