use super::Model;
use crate::media::{self, PreviewOwner, Resolution};
use crate::message::{Command, Message};
use crate::post::Post;

impl Model {
    /// Starts loads for the post's previews that are neither cached nor in
    /// flight.
    pub(super) fn request_post_media(&mut self, post: &Post, resolution: Resolution) -> Vec<Command> {
        if !self.options.media_enabled {
            return Vec::new();
        }
        let grid = resolution.grid(PreviewOwner::Post);
        media::preview_targets(&post.media)
            .into_iter()
            .filter_map(|target| {
                let key = media::cache_key(PreviewOwner::Post, resolution, &target.url);
                self.state
                    .media
                    .begin(&key)
                    .then(|| self.preview_command(key, PreviewOwner::Post, target, grid))
            })
            .collect()
    }

    /// Avatar failures are not cached, so a later call retries.
    pub(super) fn request_avatar(&mut self, url: &str) -> Option<Command> {
        let url = url.trim();
        if !self.options.media_enabled || url.is_empty() {
            return None;
        }
        let key = media::cache_key(PreviewOwner::Avatar, Resolution::Base, url);
        if !self.state.media.begin(&key) {
            return None;
        }
        let target = media::PreviewTarget {
            url: url.to_string(),
            fallback_url: None,
            animated: false,
        };
        let grid = Resolution::Base.grid(PreviewOwner::Avatar);
        Some(self.preview_command(key, PreviewOwner::Avatar, target, grid))
    }

    fn preview_command(
        &self,
        key: String,
        owner: PreviewOwner,
        target: media::PreviewTarget,
        grid: (u16, u16),
    ) -> Command {
        let fetcher = self.services.media.clone();
        let settings = self.options.media.clone();
        Command::new("media.preview", move || Message::MediaLoaded {
            result: media::load_preview(fetcher.as_ref(), &target, grid, &settings)
                .map_err(|err| format!("{err:#}")),
            key,
            owner,
        })
    }

    pub(super) fn request_selected_media(&mut self) -> Vec<Command> {
        match self.selected_post().cloned() {
            Some(post) => self.request_post_media(&post, Resolution::Base),
            None => Vec::new(),
        }
    }

    /// A focused post with a single attachment gets the larger rendering.
    pub(super) fn request_focus_media(&mut self) -> Vec<Command> {
        let Some(focus) = self.state.detail.focus.clone() else {
            return Vec::new();
        };
        let resolution = if focus.media.len() == 1 {
            Resolution::Single
        } else {
            Resolution::Base
        };
        self.request_post_media(&focus, resolution)
    }
}

/// Cache key the host uses to look up the preview drawn for `post`.
pub fn preview_key(post: &Post, resolution: Resolution) -> Option<String> {
    media::preview_targets(&post.media)
        .first()
        .map(|target| media::cache_key(PreviewOwner::Post, resolution, &target.url))
}

pub fn avatar_key(url: &str) -> String {
    media::cache_key(PreviewOwner::Avatar, Resolution::Base, url.trim())
}
