use anyhow::Context;
use tracing::{debug, info, warn};

use super::{Model, Modal, Pane, ITEM_LINES};
use crate::feed::{self, normalize_tag, FeedItem, FeedView, ItemStatus, LoadMode};
use crate::message::{describe, Command, Message};
use crate::paging::{self, Anchor, MoreDecision, Restored};
use crate::post::Post;
use crate::prefs::{self, Preferences};
use crate::reconcile::{self, LocalAuthor, Outcome};
use crate::visibility::{move_cursor_visible, nearest_visible};

impl Model {
    pub(super) fn start_initial_load(&mut self) -> Vec<Command> {
        let view = self.state.feed.view;
        if view == FeedView::CustomTag && normalize_tag(&self.state.feed.custom_tag).is_empty() {
            self.state.status = "Pick a hashtag first (press t).".into();
            return Vec::new();
        }
        let seq = self.state.feed.paging.entry(view).or_default().begin_initial();
        self.state.feed.error = None;
        let query_key = self.state.feed.query_key();
        vec![self.fetch_page(view, query_key, seq, LoadMode::Initial, None)]
    }

    fn start_older_load(&mut self) -> Vec<Command> {
        let view = self.state.feed.view;
        let paging = self.state.feed.paging.entry(view).or_default();
        let before = paging.oldest_id.clone();
        let seq = paging.begin_more();
        let query_key = self.state.feed.query_key();
        debug!(view = view.as_str(), before = ?before, "loading older page");
        vec![self.fetch_page(view, query_key, seq, LoadMode::Older, before)]
    }

    fn fetch_page(
        &self,
        view: FeedView,
        query_key: String,
        seq: u64,
        mode: LoadMode,
        before: Option<String>,
    ) -> Command {
        let timeline = self.services.timeline.clone();
        let limit = self.options.page_size;
        let tag = match view {
            FeedView::PrimaryTag => normalize_tag(&self.state.feed.primary_tag),
            FeedView::CustomTag => normalize_tag(&self.state.feed.custom_tag),
            FeedView::Trending | FeedView::Following => String::new(),
        };
        Command::new("feed.fetch", move || {
            let before = before.as_deref();
            let result = match view {
                FeedView::PrimaryTag | FeedView::CustomTag => {
                    let page = match before {
                        None => timeline.tag(&tag, limit),
                        Some(_) => timeline.tag_page(&tag, limit, before),
                    };
                    page.with_context(|| format!("fetch #{tag}"))
                }
                FeedView::Following => timeline
                    .home_page(limit, before)
                    .context("fetch home timeline"),
                FeedView::Trending => timeline
                    .trending_page(limit, before)
                    .context("fetch trending posts"),
            };
            Message::FeedLoaded {
                view,
                query_key,
                seq,
                mode,
                result: result.map_err(|err| describe(&err)),
            }
        })
    }

    pub(super) fn feed_loaded(
        &mut self,
        view: FeedView,
        query_key: String,
        seq: u64,
        mode: LoadMode,
        result: Result<Vec<Post>, String>,
    ) -> Vec<Command> {
        let feed = &self.state.feed;
        let current = view == feed.view
            && query_key == feed.query_key()
            && feed.paging.get(&view).map(|p| p.accepts(seq)).unwrap_or(false);
        if !current {
            debug!(view = view.as_str(), %query_key, seq, "dropping stale feed page");
            return Vec::new();
        }

        let posts = match result {
            Ok(posts) => posts,
            Err(err) => {
                warn!(view = view.as_str(), error = %err, "feed load failed");
                if let Some(paging) = self.state.feed.paging.get_mut(&view) {
                    paging.finish();
                }
                self.state.status = format!("Load failed: {err} (r to retry)");
                self.state.feed.error = Some(err);
                return Vec::new();
            }
        };

        let fetched = posts.len();
        let anchor = self.capture_feed_anchor();
        let merged = feed::merge_fetched(&self.state.feed.items, posts, mode);
        self.state.feed.items = merged;

        let oldest = feed::oldest_server_id(&self.state.feed.items);
        let limit = self.options.page_size;
        if let Some(paging) = self.state.feed.paging.get_mut(&view) {
            paging.finish();
            paging.oldest_id = oldest;
            paging.has_more = paging::has_more_after(view, fetched, limit);
        }
        self.state.feed.error = None;

        let fallback = match mode {
            LoadMode::Initial => Restored {
                offset: 0,
                top_line: 0,
                cursor: 0,
            },
            LoadMode::Older => self.current_restored(),
        };
        self.restore_feed_anchor(&anchor, fallback);
        if mode == LoadMode::Initial && self.state.status.starts_with("Refreshing") {
            self.state.status.clear();
        }

        let mut commands = Vec::new();
        if view == FeedView::Following {
            commands.extend(self.hydrate_relationships());
        }
        commands.extend(self.request_selected_media());
        commands
    }

    pub(super) fn move_cursor(&mut self, delta: isize) -> Vec<Command> {
        match self.state.modal {
            Some(Modal::Blocked) => {
                let moderation = &mut self.state.moderation;
                let last = moderation.blocked.len().saturating_sub(1) as isize;
                let next = (moderation.blocked_cursor as isize + delta).clamp(0, last);
                moderation.blocked_cursor = next as usize;
                return Vec::new();
            }
            Some(_) => return Vec::new(),
            None => {}
        }
        match self.active_pane() {
            Pane::Detail => self.move_detail_cursor(delta),
            Pane::Profile => self.move_profile_cursor(delta),
            Pane::Feed => self.move_feed_cursor(delta),
        }
    }

    fn move_feed_cursor(&mut self, delta: isize) -> Vec<Command> {
        let visible = self.visible_indices();
        let cursor = move_cursor_visible(&visible, self.state.feed.cursor, delta);
        self.state.feed.cursor = cursor;
        self.ensure_cursor_visible();

        let mut commands = Vec::new();
        let ready = self
            .state
            .feed
            .paging()
            .map(|paging| paging::decide_more(paging) == MoreDecision::Start)
            .unwrap_or(false);
        if ready && paging::near_end(&visible, cursor) {
            commands.extend(self.start_older_load());
        }
        commands.extend(self.request_selected_media());
        commands
    }

    fn items_per_view(&self) -> usize {
        (self.state.feed.viewport_rows / ITEM_LINES).max(1)
    }

    /// Scrolls the feed just enough to keep the selected item on screen.
    pub(super) fn ensure_cursor_visible(&mut self) {
        let visible = self.visible_indices();
        let per_view = self.items_per_view();
        let feed = &mut self.state.feed;
        let Some(position) = visible.iter().position(|&index| index == feed.cursor) else {
            feed.offset = feed.offset.min(visible.len().saturating_sub(1));
            return;
        };
        if position < feed.offset || (position == feed.offset && feed.top_line > 0) {
            feed.offset = position;
            feed.top_line = 0;
        } else if position >= feed.offset + per_view {
            feed.offset = position + 1 - per_view;
            feed.top_line = 0;
        }
    }

    pub(super) fn scroll_lines(&mut self, lines: isize) {
        let visible_len = self.visible_indices().len();
        let feed = &mut self.state.feed;
        if visible_len == 0 {
            feed.offset = 0;
            feed.top_line = 0;
            return;
        }
        let max = ((visible_len - 1) * ITEM_LINES) as isize;
        let current = (feed.offset * ITEM_LINES + feed.top_line) as isize;
        let target = (current + lines).clamp(0, max) as usize;
        feed.offset = target / ITEM_LINES;
        feed.top_line = target % ITEM_LINES;
    }

    /// Moves every cursor off items that are no longer displayable.
    pub(super) fn relocate_cursor(&mut self) {
        self.snap_feed_cursor();
        self.ensure_cursor_visible();

        let profile = &mut self.state.profile;
        profile.cursor = profile.cursor.min(profile.posts.len().saturating_sub(1));
        let detail = &mut self.state.detail;
        detail.cursor = detail.cursor.min(detail.visible_replies().len());
        let moderation = &mut self.state.moderation;
        moderation.blocked_cursor = moderation
            .blocked_cursor
            .min(moderation.blocked.len().saturating_sub(1));
    }

    fn snap_feed_cursor(&mut self) {
        let visible = self.visible_indices();
        let feed = &mut self.state.feed;
        let cursor = feed.cursor.min(feed.items.len().saturating_sub(1));
        feed.cursor = nearest_visible(&visible, cursor);
    }

    pub(super) fn capture_feed_anchor(&self) -> Anchor {
        let visible = self.visible_indices();
        let feed = &self.state.feed;
        paging::capture_anchor(&feed.items, &visible, feed.offset, feed.top_line, feed.cursor)
    }

    fn current_restored(&self) -> Restored {
        Restored {
            offset: self.state.feed.offset,
            top_line: self.state.feed.top_line,
            cursor: self.state.feed.cursor,
        }
    }

    pub(super) fn restore_feed_anchor(&mut self, anchor: &Anchor, fallback: Restored) {
        let visible = self.visible_indices();
        let restored = paging::restore_anchor(anchor, &self.state.feed.items, &visible, fallback);
        let feed = &mut self.state.feed;
        feed.offset = restored.offset;
        feed.top_line = restored.top_line;
        feed.cursor = restored.cursor;
        self.snap_feed_cursor();
    }

    pub(super) fn switch_view(&mut self, view: FeedView) -> Vec<Command> {
        if view == FeedView::CustomTag && normalize_tag(&self.state.feed.custom_tag).is_empty() {
            self.state.modal = Some(Modal::TagPrompt(String::new()));
            self.state.status = "Enter a hashtag to browse.".into();
            return Vec::new();
        }
        if view == self.state.feed.view {
            return Vec::new();
        }
        info!(view = view.as_str(), "switching feed view");
        self.state.feed.view = view;
        self.reset_feed_list();
        let mut commands = self.start_initial_load();
        commands.extend(self.save_preferences());
        commands
    }

    pub(super) fn set_custom_tag(&mut self, tag: String) -> Vec<Command> {
        let tag = normalize_tag(&tag);
        if tag.is_empty() {
            self.state.status = "Hashtag cannot be empty.".into();
            return Vec::new();
        }
        info!(%tag, "browsing custom hashtag");
        self.state.feed.custom_tag = tag;
        self.state.feed.view = FeedView::CustomTag;
        self.reset_feed_list();
        let mut commands = self.start_initial_load();
        commands.extend(self.save_preferences());
        commands
    }

    fn reset_feed_list(&mut self) {
        let feed = &mut self.state.feed;
        feed.items.clear();
        feed.cursor = 0;
        feed.offset = 0;
        feed.top_line = 0;
        feed.error = None;
    }

    fn save_preferences(&self) -> Option<Command> {
        let path = self.options.prefs_path.clone()?;
        let preferences = Preferences {
            hashtag: self.state.feed.custom_tag.clone(),
            feed_source: self.state.feed.view,
        };
        Some(Command::new("prefs.save", move || Message::PreferencesSaved {
            result: prefs::save(&path, &preferences).map_err(|err| err.to_string()),
        }))
    }

    pub(super) fn refresh(&mut self) -> Vec<Command> {
        match self.active_pane() {
            Pane::Detail => self.reload_thread(),
            Pane::Profile => self.reload_profile(),
            Pane::Feed => {
                self.state.status = format!("Refreshing {}…", self.state.feed.view.title());
                self.start_initial_load()
            }
        }
    }

    pub(super) fn load_more(&mut self) -> Vec<Command> {
        match self.active_pane() {
            Pane::Detail => {
                self.reveal_more_replies(true);
                Vec::new()
            }
            Pane::Profile => self.load_more_profile(true),
            Pane::Feed => {
                let decision = self
                    .state
                    .feed
                    .paging()
                    .map(paging::decide_more)
                    .unwrap_or(MoreDecision::Exhausted);
                match decision {
                    MoreDecision::AlreadyLoading => {
                        self.state.status = "Already loading…".into();
                        Vec::new()
                    }
                    MoreDecision::Exhausted => {
                        self.state.status = "No more posts.".into();
                        Vec::new()
                    }
                    MoreDecision::Start => self.start_older_load(),
                }
            }
        }
    }

    pub(super) fn local_author(&self) -> LocalAuthor {
        let session = &self.state.session;
        let profile = session.profile.clone().unwrap_or_default();
        LocalAuthor {
            account_id: session.account_id.clone().unwrap_or(profile.id),
            display_name: profile.display_name,
            handle: profile.handle,
        }
    }

    pub(super) fn create_post(&mut self, content: String) -> Vec<Command> {
        let content = content.trim().to_string();
        if content.is_empty() {
            self.state.status = "Nothing to post.".into();
            return Vec::new();
        }
        let local_id = reconcile::mint_temp_id();
        let post = reconcile::local_post(local_id.clone(), &content, &self.local_author(), None);

        let anchor = self.capture_feed_anchor();
        let fallback = self.current_restored();
        self.state
            .feed
            .items
            .insert(0, FeedItem::pending(post, ItemStatus::PendingCreate));
        self.restore_feed_anchor(&anchor, fallback);
        self.state.status = "Posting…".into();
        vec![self.create_command(local_id, content)]
    }

    fn create_command(&self, local_id: String, content: String) -> Command {
        let posts = self.services.posts.clone();
        Command::new("post.create", move || Message::PostCreated {
            local_id,
            result: posts
                .create(&content)
                .context("publish post")
                .map_err(|err| describe(&err)),
        })
    }

    pub(super) fn post_created(&mut self, local_id: String, result: Result<Post, String>) {
        match result {
            Ok(server) => {
                let anchor = self.capture_feed_anchor();
                let fallback = self.current_restored();
                let outcome = reconcile::apply_saved(&mut self.state.feed.items, &local_id, server, false);
                if outcome == Outcome::Appended {
                    debug!(%local_id, "no local item matched created post; appending");
                }
                feed::sort_items(&mut self.state.feed.items);
                self.restore_feed_anchor(&anchor, fallback);
                self.state.status = "Posted.".into();
            }
            Err(err) => {
                warn!(%local_id, error = %err, "create failed");
                reconcile::apply_save_failed(&mut self.state.feed.items, &local_id, &err);
                self.state.status = format!("Post failed: {err}");
            }
        }
    }

    pub(super) fn edit_post(&mut self, id: String, content: String) -> Vec<Command> {
        let content = content.trim().to_string();
        if content.is_empty() {
            self.state.status = "Post cannot be empty.".into();
            return Vec::new();
        }
        if reconcile::is_temp_id(&id) {
            self.state.status = "Wait for the post to finish sending.".into();
            return Vec::new();
        }
        let Some(previous) = self.find_post(&id).map(|post| post.content.clone()) else {
            self.state.status = "Post not found.".into();
            return Vec::new();
        };
        if previous == content {
            return Vec::new();
        }

        for list in [
            &mut self.state.feed.items,
            &mut self.state.profile.posts,
            &mut self.state.detail.replies,
        ] {
            if let Some(item) = list.iter_mut().find(|item| item.post.id == id) {
                if item.old_content.is_none() {
                    item.old_content = Some(previous.clone());
                }
                item.status = ItemStatus::PendingUpdate;
                item.error = None;
            }
        }
        self.fan_out(&id, |post| post.content = content.clone());
        self.state.status = "Saving…".into();

        let posts = self.services.posts.clone();
        vec![Command::new("post.edit", move || Message::PostEdited {
            result: posts
                .edit(&id, &content)
                .context("save edit")
                .map_err(|err| describe(&err)),
            id,
            previous,
        })]
    }

    pub(super) fn post_edited(&mut self, id: String, previous: String, result: Result<Post, String>) {
        match result {
            Ok(server) => {
                let content = server.content.clone();
                for list in [
                    &mut self.state.feed.items,
                    &mut self.state.profile.posts,
                    &mut self.state.detail.replies,
                ] {
                    if feed::position_of(list, &id).is_some() {
                        reconcile::apply_saved(list, &id, server.clone(), true);
                    }
                }
                self.fan_out(&id, |post| post.content = content.clone());
                self.state.status = "Saved.".into();
            }
            Err(err) => {
                warn!(%id, error = %err, "edit failed");
                for list in [
                    &mut self.state.feed.items,
                    &mut self.state.profile.posts,
                    &mut self.state.detail.replies,
                ] {
                    reconcile::apply_save_failed(list, &id, &err);
                }
                self.fan_out(&id, |post| post.content = previous.clone());
                self.state.status = format!("Edit failed: {err}");
            }
        }
    }

    pub(super) fn delete_post(&mut self, id: String) -> Vec<Command> {
        if reconcile::is_temp_id(&id) {
            self.dismiss_item(&id);
            return Vec::new();
        }
        if self.find_post(&id).is_none() {
            self.state.status = "Post not found.".into();
            return Vec::new();
        }
        for list in [
            &mut self.state.feed.items,
            &mut self.state.profile.posts,
            &mut self.state.detail.replies,
        ] {
            if let Some(item) = list.iter_mut().find(|item| item.post.id == id) {
                item.status = ItemStatus::PendingDelete;
                item.error = None;
            }
        }
        self.state.feed.failed_deletes.remove(&id);
        self.state.status = "Deleting…".into();

        let posts = self.services.posts.clone();
        vec![Command::new("post.delete", move || Message::PostDeleted {
            result: posts
                .delete(&id)
                .context("delete post")
                .map_err(|err| describe(&err)),
            id,
        })]
    }

    pub(super) fn post_deleted(&mut self, id: String, result: Result<(), String>) -> Vec<Command> {
        match result {
            Ok(()) => {
                let anchor = self.capture_feed_anchor();
                let fallback = self.current_restored();
                reconcile::apply_deleted(&mut self.state.feed.items, &id);
                self.restore_feed_anchor(&anchor, fallback);
                reconcile::apply_deleted(&mut self.state.profile.posts, &id);
                self.state.feed.failed_deletes.remove(&id);
                self.state.status = "Deleted.".into();
                let commands = self.forget_in_threads(&id);
                self.relocate_cursor();
                commands
            }
            Err(err) => {
                warn!(%id, error = %err, "delete failed");
                for list in [
                    &mut self.state.feed.items,
                    &mut self.state.profile.posts,
                    &mut self.state.detail.replies,
                ] {
                    reconcile::apply_delete_failed(list, &id, &err);
                }
                self.state.feed.failed_deletes.insert(id);
                self.state.status = format!("Delete failed: {err}");
                Vec::new()
            }
        }
    }

    pub(super) fn toggle_like(&mut self, id: String) -> Vec<Command> {
        if reconcile::is_temp_id(&id) {
            return Vec::new();
        }
        let Some(liked) = self.find_post(&id).map(|post| !post.liked) else {
            return Vec::new();
        };
        self.fan_out(&id, |post| {
            if post.liked != liked {
                post.toggle_like();
            }
        });

        let posts = self.services.posts.clone();
        vec![Command::new("post.like", move || {
            let result = if liked {
                posts.like(&id).context("like post")
            } else {
                posts.unlike(&id).context("unlike post")
            };
            Message::LikeToggled {
                id,
                liked,
                result: result.map_err(|err| describe(&err)),
            }
        })]
    }

    pub(super) fn like_toggled(&mut self, id: String, liked: bool, result: Result<(), String>) {
        if let Err(err) = result {
            warn!(%id, error = %err, "like failed; reverting");
            self.fan_out(&id, |post| {
                if post.liked == liked {
                    post.toggle_like();
                }
            });
            self.state.status = format!("Like failed: {err}");
        }
    }

    pub(super) fn retry_item(&mut self, id: String) -> Vec<Command> {
        let Some(item) = self
            .state
            .feed
            .items
            .iter_mut()
            .find(|item| item.post.id == id && item.status == ItemStatus::Failed)
        else {
            return self.retry_reply(id);
        };

        if reconcile::is_temp_id(&id) {
            item.status = ItemStatus::PendingCreate;
            item.error = None;
            let content = item.post.content.clone();
            self.state.status = "Posting…".into();
            return vec![self.create_command(id, content)];
        }
        if self.state.feed.failed_deletes.contains(&id) {
            return self.delete_post(id);
        }
        self.state.status = "Edit the post again to retry.".into();
        Vec::new()
    }

    /// Drops a failed local item, or clears the error from a failed server item.
    pub(super) fn dismiss_item(&mut self, id: &str) {
        let anchor = self.capture_feed_anchor();
        let fallback = self.current_restored();
        let items = &mut self.state.feed.items;
        if reconcile::is_temp_id(id) {
            items.retain(|item| item.post.id != id);
        } else if let Some(item) = items
            .iter_mut()
            .find(|item| item.post.id == id && item.status == ItemStatus::Failed)
        {
            item.mark_normal();
        }
        self.restore_feed_anchor(&anchor, fallback);

        if let Some(item) = self
            .state
            .profile
            .posts
            .iter_mut()
            .find(|item| item.post.id == id && item.status == ItemStatus::Failed)
        {
            item.mark_normal();
        }
        self.state
            .detail
            .replies
            .retain(|item| !(item.post.id == id && item.status == ItemStatus::Failed));
        self.state.feed.failed_deletes.remove(id);
        self.relocate_cursor();
    }
}
