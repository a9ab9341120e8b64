use std::thread;

use anyhow::{anyhow, Context};
use tracing::{debug, warn};

use super::{Model, ProfileState};
use crate::feed::{self, LoadMode};
use crate::message::{describe, Command, Message};
use crate::paging::{self, MoreDecision};
use crate::post::{Post, Profile};

impl Model {
    pub(super) fn open_profile(&mut self, account_id: Option<String>) -> Vec<Command> {
        let Some(account_id) = account_id.or_else(|| self.state.session.account_id.clone()) else {
            self.state.status = "Your account has not loaded yet.".into();
            return Vec::new();
        };
        let cache = std::mem::take(&mut self.state.detail.cache);
        self.state.detail = super::DetailState {
            cache,
            ..Default::default()
        };
        let seq = self.state.profile.paging.seq;
        self.state.profile = ProfileState {
            account_id: Some(account_id),
            paging: paging::Paging {
                seq,
                ..Default::default()
            },
            ..ProfileState::default()
        };
        self.reload_profile()
    }

    pub(super) fn reload_profile(&mut self) -> Vec<Command> {
        let Some(account_id) = self.state.profile.account_id.clone() else {
            return Vec::new();
        };
        let seq = self.state.profile.paging.begin_initial();
        self.state.profile.error = None;

        let accounts = self.services.accounts.clone();
        let limit = self.options.page_size;
        vec![Command::new("profile.fetch", move || {
            // Profile and first page are fetched side by side and joined.
            let (profile, posts) = thread::scope(|scope| {
                let profile = scope.spawn(|| {
                    accounts
                        .profile_by_id(&account_id)
                        .context("fetch profile")
                });
                let posts = accounts
                    .posts_by_account(&account_id, limit, None)
                    .context("fetch profile posts");
                let profile = profile
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("profile fetch panicked")));
                (profile, posts)
            });
            let result = profile
                .and_then(|profile| posts.map(|posts| (profile, posts)))
                .map_err(|err| describe(&err));
            Message::ProfileLoaded {
                account_id,
                seq,
                result,
            }
        })]
    }

    pub(super) fn profile_loaded(
        &mut self,
        account_id: String,
        seq: u64,
        result: Result<(Profile, Vec<Post>), String>,
    ) -> Vec<Command> {
        let profile = &self.state.profile;
        if profile.account_id.as_deref() != Some(account_id.as_str()) || !profile.paging.accepts(seq) {
            debug!(%account_id, seq, "dropping stale profile");
            return Vec::new();
        }
        self.state.profile.paging.finish();

        let (loaded, posts) = match result {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(%account_id, error = %err, "profile load failed");
                self.state.status = format!("Profile failed to load: {err}");
                self.state.profile.error = Some(err);
                return Vec::new();
            }
        };

        let fetched = posts.len();
        let limit = self.options.page_size;
        let avatar = loaded.avatar_url.clone();
        let state = &mut self.state.profile;
        state.posts = feed::merge_fetched(&state.posts, posts, LoadMode::Initial);
        state.paging.oldest_id = feed::oldest_server_id(&state.posts);
        state.paging.has_more = fetched >= limit;
        state.cursor = state.cursor.min(state.posts.len().saturating_sub(1));
        state.profile = Some(loaded);

        let mut commands: Vec<Command> = self.request_avatar(&avatar).into_iter().collect();
        if !self.is_me(&account_id) && self.is_following(&account_id).is_none() {
            commands.extend(self.lookup_relationships(vec![account_id]));
        }
        commands.extend(self.request_selected_media());
        commands
    }

    pub(super) fn move_profile_cursor(&mut self, delta: isize) -> Vec<Command> {
        let profile = &mut self.state.profile;
        let last = profile.posts.len().saturating_sub(1) as isize;
        profile.cursor = (profile.cursor as isize + delta).clamp(0, last) as usize;

        let remaining = profile.posts.len().saturating_sub(profile.cursor + 1);
        let mut commands = Vec::new();
        if remaining <= paging::PREFETCH_DISTANCE {
            commands.extend(self.load_more_profile(false));
        }
        commands.extend(self.request_selected_media());
        commands
    }

    pub(super) fn load_more_profile(&mut self, manual: bool) -> Vec<Command> {
        let Some(account_id) = self.state.profile.account_id.clone() else {
            return Vec::new();
        };
        match paging::decide_more(&self.state.profile.paging) {
            MoreDecision::Start => {}
            MoreDecision::AlreadyLoading => {
                if manual {
                    self.state.status = "Already loading…".into();
                }
                return Vec::new();
            }
            MoreDecision::Exhausted => {
                if manual {
                    self.state.status = "No more posts.".into();
                }
                return Vec::new();
            }
        }
        let before = self.state.profile.paging.oldest_id.clone();
        let seq = self.state.profile.paging.begin_more();
        let accounts = self.services.accounts.clone();
        let limit = self.options.page_size;
        vec![Command::new("profile.posts", move || Message::ProfilePostsLoaded {
            result: accounts
                .posts_by_account(&account_id, limit, before.as_deref())
                .context("fetch profile posts")
                .map_err(|err| describe(&err)),
            account_id,
            seq,
        })]
    }

    pub(super) fn profile_posts_loaded(
        &mut self,
        account_id: String,
        seq: u64,
        result: Result<Vec<Post>, String>,
    ) {
        let limit = self.options.page_size;
        let profile = &mut self.state.profile;
        if profile.account_id.as_deref() != Some(account_id.as_str()) || !profile.paging.accepts(seq) {
            debug!(%account_id, seq, "dropping stale profile page");
            return;
        }
        profile.paging.finish();
        match result {
            Ok(posts) => {
                let fetched = posts.len();
                let selected = profile.posts.get(profile.cursor).map(|item| item.post.id.clone());
                profile.posts = feed::merge_fetched(&profile.posts, posts, LoadMode::Older);
                profile.paging.oldest_id = feed::oldest_server_id(&profile.posts);
                profile.paging.has_more = fetched >= limit;
                if let Some(index) = selected.and_then(|id| feed::position_of(&profile.posts, &id)) {
                    profile.cursor = index;
                }
                profile.error = None;
            }
            Err(err) => {
                warn!(%account_id, error = %err, "profile page failed");
                self.state.status = format!("Load failed: {err}");
                self.state.profile.error = Some(err);
            }
        }
    }

    pub(super) fn update_profile(&mut self, display_name: String, bio: String) -> Vec<Command> {
        let display_name = display_name.trim().to_string();
        if display_name.is_empty() {
            self.state.status = "Display name cannot be empty.".into();
            return Vec::new();
        }
        self.state.status = "Saving profile…".into();
        let accounts = self.services.accounts.clone();
        vec![Command::new("profile.update", move || Message::ProfileUpdated {
            result: accounts
                .update_profile(&display_name, bio.trim())
                .context("update profile")
                .map_err(|err| describe(&err)),
        })]
    }

    pub(super) fn profile_updated(&mut self, result: Result<Profile, String>) {
        match result {
            Ok(updated) => {
                if self.state.profile.account_id.as_deref() == Some(updated.id.as_str()) {
                    self.state.profile.profile = Some(updated.clone());
                }
                self.state.session.profile = Some(updated);
                self.state.status = "Profile saved.".into();
            }
            Err(err) => {
                warn!(error = %err, "profile update failed");
                self.state.status = format!("Profile update failed: {err}");
                self.state.profile.error = Some(err);
            }
        }
    }
}
