//! The transition engine.
//!
//! `Model::update` is the only code that mutates client state. It handles one
//! message at a time, changes state synchronously and returns commands for
//! anything that needs I/O. Commands never see live state; they capture the
//! inputs they need and report back with exactly one message.

mod compose;
mod feed;
mod moderation;
mod preview;
mod profile;
mod thread;

#[cfg(test)]
mod tests;

pub use preview::{avatar_key, preview_key};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::debug;

use crate::data::Services;
use crate::feed::{FeedItem, FeedView};
use crate::media::{self, MediaCache};
use crate::message::{ComposeKind, Command, Message};
use crate::paging::{self, Paging};
use crate::post::{BlockedAccount, Post, Profile};
use crate::thread::ThreadCache;
use crate::visibility::Filter;

/// Lines one feed item occupies in the list.
pub const ITEM_LINES: usize = 4;
pub const BLOCKED_PAGE: usize = 40;

#[derive(Debug, Clone)]
pub struct Options {
    pub primary_tag: String,
    pub custom_tag: String,
    pub view: FeedView,
    pub page_size: usize,
    pub reply_page_size: usize,
    pub media_enabled: bool,
    pub media: media::Settings,
    pub prefs_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            primary_tag: "rust".into(),
            custom_tag: String::new(),
            view: FeedView::PrimaryTag,
            page_size: paging::PAGE_SIZE,
            reply_page_size: 10,
            media_enabled: true,
            media: media::Settings::default(),
            prefs_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedState {
    pub view: FeedView,
    pub primary_tag: String,
    pub custom_tag: String,
    pub items: Vec<FeedItem>,
    pub cursor: usize,
    /// Position, within the visible list, of the topmost rendered item.
    pub offset: usize,
    /// Lines of the topmost item scrolled out of view.
    pub top_line: usize,
    pub viewport_rows: usize,
    pub paging: HashMap<FeedView, Paging>,
    pub failed_deletes: HashSet<String>,
    pub error: Option<String>,
}

impl FeedState {
    pub fn query_key(&self) -> String {
        self.view.query_key(&self.primary_tag, &self.custom_tag)
    }

    pub fn paging(&self) -> Option<&Paging> {
        self.paging.get(&self.view)
    }

    pub fn is_loading(&self) -> bool {
        self.paging().map(Paging::is_loading).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailState {
    pub focus: Option<Post>,
    pub ancestors: Vec<Post>,
    /// Assembled replies, including local ones still in flight.
    pub replies: Vec<FeedItem>,
    /// How many replies are revealed.
    pub shown: usize,
    /// 0 selects the focused post, n selects `replies[n - 1]`.
    pub cursor: usize,
    pub loading: bool,
    pub error: Option<String>,
    /// Previously focused posts, most recent last.
    pub back: Vec<Post>,
    pub cache: ThreadCache,
}

impl DetailState {
    pub fn thread_id(&self) -> Option<&str> {
        self.focus.as_ref().map(|post| post.id.as_str())
    }

    pub fn has_more_replies(&self) -> bool {
        self.shown < self.replies.len()
    }

    pub fn visible_replies(&self) -> &[FeedItem] {
        &self.replies[..self.shown.min(self.replies.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileState {
    pub account_id: Option<String>,
    pub profile: Option<Profile>,
    pub posts: Vec<FeedItem>,
    pub cursor: usize,
    pub paging: Paging,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModerationState {
    pub hidden_posts: HashSet<String>,
    pub hidden_authors: HashSet<String>,
    pub show_hidden: bool,
    pub blocked: Vec<BlockedAccount>,
    pub blocked_cursor: usize,
    pub blocked_loading: bool,
    pub blocked_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipState {
    pub following: HashMap<String, bool>,
    pub pending: HashSet<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub account_id: Option<String>,
    pub profile: Option<Profile>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileField {
    #[default]
    DisplayName,
    Bio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Compose { kind: ComposeKind, text: String },
    ProfileEdit {
        display_name: String,
        bio: String,
        field: ProfileField,
    },
    TagPrompt(String),
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Feed,
    Profile,
    Detail,
}

/// Everything the host renders. Kept free of service handles so it can be
/// cloned and compared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    pub feed: FeedState,
    pub detail: DetailState,
    pub profile: ProfileState,
    pub moderation: ModerationState,
    pub relationships: RelationshipState,
    pub media: MediaCache,
    pub session: SessionState,
    pub modal: Option<Modal>,
    pub status: String,
}

pub struct Model {
    services: Services,
    options: Options,
    state: State,
}

impl Model {
    pub fn new(services: Services, options: Options) -> Self {
        let state = State {
            feed: FeedState {
                view: options.view,
                primary_tag: options.primary_tag.clone(),
                custom_tag: options.custom_tag.clone(),
                viewport_rows: ITEM_LINES * 10,
                ..FeedState::default()
            },
            ..State::default()
        };
        Self {
            services,
            options,
            state,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn init(&mut self) -> Vec<Command> {
        let mut commands = vec![self.load_session()];
        commands.extend(self.start_initial_load());
        commands
    }

    /// Applies one message. Unhandled combinations leave state untouched.
    pub fn update(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::Tick => {
                self.state.media.tick();
                Vec::new()
            }
            Message::Resize { rows } => {
                self.state.feed.viewport_rows = rows as usize;
                self.ensure_cursor_visible();
                Vec::new()
            }
            Message::MoveCursor(delta) => self.move_cursor(delta),
            Message::Scroll(lines) => {
                self.scroll_lines(lines);
                Vec::new()
            }
            Message::SwitchView(view) => self.switch_view(view),
            Message::NextView => {
                let next = self.state.feed.view.next();
                self.switch_view(next)
            }
            Message::SetCustomTag(tag) => self.set_custom_tag(tag),
            Message::Refresh => self.refresh(),
            Message::LoadMore => self.load_more(),
            Message::OpenSelected => self.open_selected(),
            Message::CloseDetail => self.close_detail(),
            Message::OpenProfile(account_id) => self.open_profile(account_id),
            Message::CloseProfile => {
                let seq = self.state.profile.paging.seq;
                self.state.profile = ProfileState {
                    paging: Paging {
                        seq,
                        ..Default::default()
                    },
                    ..ProfileState::default()
                };
                Vec::new()
            }

            Message::OpenCompose(kind) => self.open_compose(kind),
            Message::OpenTagPrompt => {
                let current = self.state.feed.custom_tag.clone();
                self.state.modal = Some(Modal::TagPrompt(current));
                Vec::new()
            }
            Message::EditProfile => self.open_profile_edit(),
            Message::OpenBlockedList => self.open_blocked_list(),
            Message::ModalInput(ch) => {
                self.modal_input(ch);
                Vec::new()
            }
            Message::ModalBackspace => {
                self.modal_backspace();
                Vec::new()
            }
            Message::ModalNewline => {
                self.modal_input('\n');
                Vec::new()
            }
            Message::ModalNextField => {
                self.modal_next_field();
                Vec::new()
            }
            Message::ModalSubmit => self.modal_submit(),
            Message::CloseModal => {
                self.state.modal = None;
                Vec::new()
            }

            Message::CreatePost(content) => self.create_post(content),
            Message::EditPost { id, content } => self.edit_post(id, content),
            Message::DeletePost(id) => self.delete_post(id),
            Message::ToggleLike(id) => self.toggle_like(id),
            Message::Reply { parent_id, content } => self.reply(parent_id, content),
            Message::RetryItem(id) => self.retry_item(id),
            Message::DismissItem(id) => {
                self.dismiss_item(&id);
                Vec::new()
            }
            Message::HidePost(id) => {
                self.state.moderation.hidden_posts.insert(id);
                self.relocate_cursor();
                self.state.status = "Post hidden.".into();
                Vec::new()
            }
            Message::HideAuthor(account_id) => {
                self.state.moderation.hidden_authors.insert(account_id);
                self.relocate_cursor();
                self.state.status = "Author hidden.".into();
                Vec::new()
            }
            Message::ToggleShowHidden => {
                let moderation = &mut self.state.moderation;
                moderation.show_hidden = !moderation.show_hidden;
                self.state.status = if self.state.moderation.show_hidden {
                    "Showing hidden posts.".into()
                } else {
                    "Hiding hidden posts.".into()
                };
                self.relocate_cursor();
                Vec::new()
            }
            Message::Follow(account_id) => self.set_following(account_id, true),
            Message::Unfollow(account_id) => self.set_following(account_id, false),
            Message::Block(account_id) => self.set_blocked(account_id, true),
            Message::Unblock(account_id) => self.set_blocked(account_id, false),
            Message::UpdateProfile { display_name, bio } => self.update_profile(display_name, bio),

            Message::SessionLoaded { result } => self.session_loaded(result),
            Message::FeedLoaded {
                view,
                query_key,
                seq,
                mode,
                result,
            } => self.feed_loaded(view, query_key, seq, mode, result),
            Message::PostCreated { local_id, result } => {
                self.post_created(local_id, result);
                Vec::new()
            }
            Message::PostEdited {
                id,
                previous,
                result,
            } => {
                self.post_edited(id, previous, result);
                Vec::new()
            }
            Message::PostDeleted { id, result } => self.post_deleted(id, result),
            Message::LikeToggled { id, liked, result } => {
                self.like_toggled(id, liked, result);
                Vec::new()
            }
            Message::ReplyPosted {
                local_id,
                thread_id,
                result,
            } => {
                self.reply_posted(local_id, thread_id, result);
                Vec::new()
            }
            Message::ThreadLoaded { thread_id, result } => self.thread_loaded(thread_id, result),
            Message::ProfileLoaded {
                account_id,
                seq,
                result,
            } => self.profile_loaded(account_id, seq, result),
            Message::ProfilePostsLoaded {
                account_id,
                seq,
                result,
            } => {
                self.profile_posts_loaded(account_id, seq, result);
                Vec::new()
            }
            Message::RelationshipsLoaded { ids, result } => {
                self.relationships_loaded(ids, result);
                Vec::new()
            }
            Message::FollowChanged {
                account_id,
                following,
                result,
            } => {
                self.follow_changed(account_id, following, result);
                Vec::new()
            }
            Message::BlockChanged {
                account_id,
                blocked,
                result,
            } => {
                self.block_changed(account_id, blocked, result);
                Vec::new()
            }
            Message::BlockedLoaded { result } => {
                self.blocked_loaded(result);
                Vec::new()
            }
            Message::ProfileUpdated { result } => {
                self.profile_updated(result);
                Vec::new()
            }
            Message::MediaLoaded { key, owner, result } => {
                if let Err(err) = &result {
                    debug!(%key, error = %err, "media preview failed");
                }
                self.state.media.complete(&key, owner, result);
                Vec::new()
            }
            Message::PreferencesSaved { result } => {
                if let Err(err) = result {
                    self.state.status = format!("Could not save preferences: {err}");
                }
                Vec::new()
            }
        }
    }

    pub fn active_pane(&self) -> Pane {
        if self.state.detail.focus.is_some() {
            Pane::Detail
        } else if self.state.profile.account_id.is_some() {
            Pane::Profile
        } else {
            Pane::Feed
        }
    }

    pub fn is_detail_active(&self) -> bool {
        self.active_pane() == Pane::Detail
    }

    /// The host consults this before treating keys as global shortcuts.
    pub fn has_modal_open(&self) -> bool {
        self.state.modal.is_some()
    }

    pub fn selected_post(&self) -> Option<&Post> {
        match self.active_pane() {
            Pane::Detail => {
                let detail = &self.state.detail;
                match detail.cursor {
                    0 => detail.focus.as_ref(),
                    n => detail.visible_replies().get(n - 1).map(|item| &item.post),
                }
            }
            Pane::Profile => self
                .state
                .profile
                .posts
                .get(self.state.profile.cursor)
                .map(|item| &item.post),
            Pane::Feed => {
                let item = self.state.feed.items.get(self.state.feed.cursor)?;
                self.filter().is_visible(item).then_some(&item.post)
            }
        }
    }

    pub fn filter(&self) -> Filter<'_> {
        Filter {
            hidden_posts: &self.state.moderation.hidden_posts,
            hidden_authors: &self.state.moderation.hidden_authors,
            show_hidden: self.state.moderation.show_hidden,
            view: self.state.feed.view,
            relationships: &self.state.relationships.following,
            current_account: self.state.session.account_id.as_deref(),
        }
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        self.filter().visible_indices(&self.state.feed.items)
    }

    pub fn is_following(&self, account_id: &str) -> Option<bool> {
        self.state.relationships.following.get(account_id).copied()
    }

    fn is_me(&self, account_id: &str) -> bool {
        self.state.session.account_id.as_deref() == Some(account_id)
    }

    fn find_post(&self, id: &str) -> Option<&Post> {
        let state = &self.state;
        state
            .feed
            .items
            .iter()
            .map(|item| &item.post)
            .chain(state.detail.replies.iter().map(|item| &item.post))
            .chain(state.detail.ancestors.iter())
            .chain(state.detail.focus.iter())
            .chain(state.profile.posts.iter().map(|item| &item.post))
            .find(|post| post.id == id)
    }

    /// Applies `apply` to every stored copy of post `id`. Returns how many
    /// copies were touched.
    fn fan_out<F>(&mut self, id: &str, mut apply: F) -> usize
    where
        F: FnMut(&mut Post),
    {
        let state = &mut self.state;
        let mut touched = 0;
        let mut visit = |post: &mut Post| {
            if post.id == id {
                apply(post);
                touched += 1;
            }
        };
        state.feed.items.iter_mut().for_each(|item| visit(&mut item.post));
        state.detail.replies.iter_mut().for_each(|item| visit(&mut item.post));
        state.detail.ancestors.iter_mut().for_each(&mut visit);
        state
            .detail
            .cache
            .entries_mut()
            .flat_map(|entry| entry.posts_mut())
            .for_each(&mut visit);
        state.profile.posts.iter_mut().for_each(|item| visit(&mut item.post));
        if let Some(focus) = state.detail.focus.as_mut() {
            visit(focus);
        }
        state.detail.back.iter_mut().for_each(&mut visit);
        touched
    }

    fn load_session(&self) -> Command {
        let accounts = self.services.accounts.clone();
        Command::new("session.load", move || {
            let result = accounts
                .current_account_id()
                .and_then(|id| accounts.current_profile().map(|profile| (id, profile)))
                .map_err(|err| crate::message::describe(&err));
            Message::SessionLoaded { result }
        })
    }

    fn session_loaded(&mut self, result: Result<(String, Profile), String>) -> Vec<Command> {
        match result {
            Ok((account_id, profile)) => {
                let avatar = profile.avatar_url.clone();
                self.state.session = SessionState {
                    account_id: Some(account_id),
                    profile: Some(profile),
                    error: None,
                };
                self.relocate_cursor();
                self.request_avatar(&avatar).into_iter().collect()
            }
            Err(err) => {
                self.state.status = format!("Could not load your account: {err}");
                self.state.session.error = Some(err);
                Vec::new()
            }
        }
    }
}
