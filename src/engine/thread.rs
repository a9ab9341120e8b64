use anyhow::Context;
use tracing::{debug, warn};

use super::{DetailState, Model};
use crate::feed::{FeedItem, ItemStatus};
use crate::message::{describe, Command, Message};
use crate::paging::PREFETCH_DISTANCE;
use crate::post::{Post, ThreadContext};
use crate::reconcile;
use crate::thread::{assemble, ThreadEntry};

impl Model {
    pub(super) fn open_selected(&mut self) -> Vec<Command> {
        if self.has_modal_open() {
            return Vec::new();
        }
        let Some(post) = self.selected_post().cloned() else {
            return Vec::new();
        };
        if reconcile::is_temp_id(&post.id) {
            self.state.status = "This post is still sending.".into();
            return Vec::new();
        }
        if self.is_detail_active() {
            if self.state.detail.cursor == 0 {
                return Vec::new();
            }
            if let Some(current) = self.state.detail.focus.take() {
                self.state.detail.back.push(current);
            }
        }
        self.focus_thread(post)
    }

    /// Shows `post` as the focused thread. A cached thread renders at once and
    /// is refreshed in the background.
    fn focus_thread(&mut self, post: Post) -> Vec<Command> {
        let id = post.id.clone();
        let detail = &mut self.state.detail;
        detail.focus = Some(post);
        detail.cursor = 0;
        detail.shown = 0;
        detail.error = None;
        detail.loading = true;
        detail.replies.clear();
        detail.ancestors.clear();
        if let Some(entry) = detail.cache.get(&id) {
            detail.ancestors = entry.ancestors.clone();
            self.rebuild_replies();
            self.reveal_first_page();
        }

        let mut commands = vec![self.fetch_thread(id)];
        commands.extend(self.request_focus_media());
        commands
    }

    fn fetch_thread(&self, thread_id: String) -> Command {
        let timeline = self.services.timeline.clone();
        Command::new("thread.fetch", move || Message::ThreadLoaded {
            result: timeline
                .thread(&thread_id)
                .with_context(|| format!("fetch thread {thread_id}"))
                .map_err(|err| describe(&err)),
            thread_id,
        })
    }

    pub(super) fn reload_thread(&mut self) -> Vec<Command> {
        let Some(thread_id) = self.state.detail.thread_id().map(str::to_string) else {
            return Vec::new();
        };
        self.state.detail.loading = true;
        vec![self.fetch_thread(thread_id)]
    }

    pub(super) fn close_detail(&mut self) -> Vec<Command> {
        let detail = &mut self.state.detail;
        if detail.focus.is_none() {
            return Vec::new();
        }
        if let Some(previous) = detail.back.pop() {
            return self.focus_thread(previous);
        }
        let cache = std::mem::take(&mut detail.cache);
        *detail = DetailState {
            cache,
            ..DetailState::default()
        };
        self.relocate_cursor();
        self.request_selected_media()
    }

    pub(super) fn thread_loaded(
        &mut self,
        thread_id: String,
        result: Result<ThreadContext, String>,
    ) -> Vec<Command> {
        if self.state.detail.thread_id() != Some(thread_id.as_str()) {
            debug!(%thread_id, "dropping thread for a post no longer focused");
            return Vec::new();
        }
        let detail = &mut self.state.detail;
        detail.loading = false;

        let context = match result {
            Ok(context) => context,
            Err(err) => {
                warn!(%thread_id, error = %err, "thread load failed");
                self.state.status = format!("Thread failed to load: {err}");
                self.state.detail.error = Some(err);
                return Vec::new();
            }
        };

        let mut descendants = context.descendants;
        if let Some(previous) = detail.cache.get(&thread_id) {
            for local in previous
                .descendants
                .iter()
                .filter(|post| reconcile::is_temp_id(&post.id))
            {
                let confirmed = descendants.iter().any(|post| {
                    post.parent_id() == local.parent_id()
                        && post.content.trim() == local.content.trim()
                });
                if !confirmed {
                    descendants.push(local.clone());
                }
            }
        }
        let entry = ThreadEntry {
            descendants: assemble(&thread_id, &descendants),
            ancestors: context.ancestors,
        };
        detail.ancestors = entry.ancestors.clone();
        detail.cache.insert(thread_id, entry);
        detail.error = None;

        self.rebuild_replies();
        self.reveal_first_page();
        self.relocate_cursor();
        Vec::new()
    }

    /// Re-derives the reply list from the cached thread, carrying local status
    /// by id. Failed local replies stay listed after the cached ones.
    fn rebuild_replies(&mut self) {
        let detail = &mut self.state.detail;
        let Some(root) = detail.focus.as_ref().map(|post| post.id.clone()) else {
            return;
        };
        let previous = std::mem::take(&mut detail.replies);
        let assembled = detail
            .cache
            .get(&root)
            .map(|entry| entry.descendants.clone())
            .unwrap_or_default();

        let mut replies: Vec<FeedItem> = assembled
            .into_iter()
            .map(|post| {
                let mut item = FeedItem::new(post);
                if let Some(old) = previous.iter().find(|old| old.post.id == item.post.id) {
                    item.status = old.status;
                    item.error = old.error.clone();
                }
                item
            })
            .collect();
        for item in previous {
            if item.status == ItemStatus::Failed
                && !replies.iter().any(|reply| reply.post.id == item.post.id)
            {
                replies.push(item);
            }
        }
        detail.replies = replies;
        detail.shown = detail.shown.min(detail.replies.len());
    }

    fn reveal_first_page(&mut self) {
        let page = self.options.reply_page_size.max(1);
        let detail = &mut self.state.detail;
        detail.shown = detail.shown.max(page).min(detail.replies.len());
    }

    pub(super) fn reveal_more_replies(&mut self, manual: bool) {
        let page = self.options.reply_page_size.max(1);
        let detail = &mut self.state.detail;
        if detail.has_more_replies() {
            detail.shown = (detail.shown + page).min(detail.replies.len());
        } else if manual {
            self.state.status = "No more replies.".into();
        }
    }

    pub(super) fn move_detail_cursor(&mut self, delta: isize) -> Vec<Command> {
        let detail = &mut self.state.detail;
        let last = detail.visible_replies().len() as isize;
        detail.cursor = (detail.cursor as isize + delta).clamp(0, last) as usize;
        if detail.shown.saturating_sub(detail.cursor) <= PREFETCH_DISTANCE {
            self.reveal_more_replies(false);
        }
        self.request_selected_media()
    }

    fn reply_parent_in_thread(&self, root: &str, parent_id: &str) -> bool {
        let detail = &self.state.detail;
        parent_id == root
            || detail.ancestors.iter().any(|post| post.id == parent_id)
            || detail.visible_replies().iter().any(|item| item.post.id == parent_id)
            || detail
                .cache
                .get(root)
                .map(|entry| entry.contains(parent_id))
                .unwrap_or(false)
    }

    pub(super) fn reply(&mut self, parent_id: String, content: String) -> Vec<Command> {
        let content = content.trim().to_string();
        if content.is_empty() {
            self.state.status = "Reply is empty.".into();
            return Vec::new();
        }
        if reconcile::is_temp_id(&parent_id) {
            self.state.status = "Wait for the post to finish sending.".into();
            return Vec::new();
        }

        let local_id = reconcile::mint_temp_id();
        let thread_id = self.state.detail.thread_id().map(str::to_string);
        let open_root = thread_id
            .clone()
            .filter(|root| self.reply_parent_in_thread(root, &parent_id));
        match open_root {
            Some(root) => {
                let post = reconcile::local_post(
                    local_id.clone(),
                    &content,
                    &self.local_author(),
                    Some(parent_id.clone()),
                );
                self.insert_cached_reply(&root, post);
                self.rebuild_replies();
                let detail = &mut self.state.detail;
                if let Some(position) = detail.replies.iter().position(|item| item.post.id == local_id) {
                    detail.replies[position].status = ItemStatus::PendingCreate;
                    detail.shown = detail.shown.max(position + 1);
                }
            }
            None => debug!(%parent_id, "reply parent is outside the open thread; not shown"),
        }
        self.state.status = "Replying…".into();

        let posts = self.services.posts.clone();
        vec![Command::new("post.reply", move || Message::ReplyPosted {
            result: posts
                .reply(&parent_id, &content)
                .context("send reply")
                .map_err(|err| describe(&err)),
            local_id,
            thread_id,
        })]
    }

    fn insert_cached_reply(&mut self, root: &str, post: Post) {
        let detail = &mut self.state.detail;
        if detail.cache.get(root).is_none() {
            let ancestors = detail.ancestors.clone();
            detail.cache.insert(
                root,
                ThreadEntry {
                    ancestors,
                    descendants: Vec::new(),
                },
            );
        }
        if let Some(entry) = detail.cache.get_mut(root) {
            entry.descendants.push(post);
            entry.descendants = assemble(root, &entry.descendants);
        }
    }

    pub(super) fn reply_posted(
        &mut self,
        local_id: String,
        thread_id: Option<String>,
        result: Result<Post, String>,
    ) {
        match result {
            Ok(server) => {
                if let Some(parent) = server.parent_id().map(str::to_string) {
                    self.fan_out(&parent, |post| post.replies_count += 1);
                }
                if let Some(root) = thread_id.as_deref() {
                    if let Some(entry) = self.state.detail.cache.get_mut(root) {
                        match reconcile::find_reply_post(&entry.descendants, &local_id, &server) {
                            Some(index) => entry.descendants[index] = server.clone(),
                            None => {
                                let belongs = server
                                    .parent_id()
                                    .map(|parent| parent == root || entry.contains(parent))
                                    .unwrap_or(false);
                                if belongs {
                                    entry.descendants.push(server.clone());
                                }
                            }
                        }
                        entry.descendants = assemble(root, &entry.descendants);
                    }
                    if self.state.detail.thread_id() == Some(root) {
                        self.rebuild_replies();
                        let detail = &mut self.state.detail;
                        if let Some(position) =
                            detail.replies.iter().position(|item| item.post.id == server.id)
                        {
                            detail.shown = detail.shown.max(position + 1);
                        }
                    }
                }
                self.state.status = "Replied.".into();
            }
            Err(err) => {
                warn!(%local_id, error = %err, "reply failed");
                if let Some(root) = thread_id.as_deref() {
                    if let Some(entry) = self.state.detail.cache.get_mut(root) {
                        entry.descendants.retain(|post| post.id != local_id);
                    }
                }
                if let Some(item) = self
                    .state
                    .detail
                    .replies
                    .iter_mut()
                    .find(|item| item.post.id == local_id)
                {
                    item.mark_failed(err.clone());
                }
                self.state.status = format!("Reply failed: {err}");
            }
        }
    }

    /// Re-sends a failed local reply.
    pub(super) fn retry_reply(&mut self, id: String) -> Vec<Command> {
        let Some(position) = self
            .state
            .detail
            .replies
            .iter()
            .position(|item| item.post.id == id && item.status == ItemStatus::Failed)
        else {
            return Vec::new();
        };
        let failed = self.state.detail.replies.remove(position);
        let Some(parent_id) = failed.post.parent_id().map(str::to_string) else {
            return Vec::new();
        };
        self.reply(parent_id, failed.post.content)
    }

    /// Removes a deleted post from every thread view and closes it if focused.
    pub(super) fn forget_in_threads(&mut self, id: &str) -> Vec<Command> {
        let detail = &mut self.state.detail;
        detail.replies.retain(|item| item.post.id != id);
        detail.ancestors.retain(|post| post.id != id);
        detail.back.retain(|post| post.id != id);
        for entry in detail.cache.entries_mut() {
            entry.descendants.retain(|post| post.id != id);
            entry.ancestors.retain(|post| post.id != id);
        }
        if detail.thread_id() == Some(id) {
            return self.close_detail();
        }
        Vec::new()
    }
}
