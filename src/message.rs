use std::collections::HashMap;
use std::fmt;

use crate::feed::{FeedView, LoadMode};
use crate::media::{Decoded, PreviewOwner};
use crate::post::{BlockedAccount, Post, Profile, ThreadContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeKind {
    New,
    Edit { id: String },
    Reply { parent_id: String },
}

/// Everything the engine reacts to: user intents from the host and results
/// produced by commands. Results carry rendered error strings.
#[derive(Debug)]
pub enum Message {
    Tick,
    Resize { rows: u16 },
    MoveCursor(isize),
    Scroll(isize),
    SwitchView(FeedView),
    NextView,
    SetCustomTag(String),
    Refresh,
    LoadMore,
    OpenSelected,
    CloseDetail,
    OpenProfile(Option<String>),
    CloseProfile,

    OpenCompose(ComposeKind),
    OpenTagPrompt,
    EditProfile,
    OpenBlockedList,
    ModalInput(char),
    ModalBackspace,
    ModalNewline,
    ModalNextField,
    ModalSubmit,
    CloseModal,

    CreatePost(String),
    EditPost { id: String, content: String },
    DeletePost(String),
    ToggleLike(String),
    Reply { parent_id: String, content: String },
    RetryItem(String),
    DismissItem(String),
    HidePost(String),
    HideAuthor(String),
    ToggleShowHidden,
    Follow(String),
    Unfollow(String),
    Block(String),
    Unblock(String),
    UpdateProfile { display_name: String, bio: String },

    SessionLoaded {
        result: Result<(String, Profile), String>,
    },
    FeedLoaded {
        view: FeedView,
        query_key: String,
        seq: u64,
        mode: LoadMode,
        result: Result<Vec<Post>, String>,
    },
    PostCreated {
        local_id: String,
        result: Result<Post, String>,
    },
    PostEdited {
        id: String,
        previous: String,
        result: Result<Post, String>,
    },
    PostDeleted {
        id: String,
        result: Result<(), String>,
    },
    LikeToggled {
        id: String,
        liked: bool,
        result: Result<(), String>,
    },
    ReplyPosted {
        local_id: String,
        thread_id: Option<String>,
        result: Result<Post, String>,
    },
    ThreadLoaded {
        thread_id: String,
        result: Result<ThreadContext, String>,
    },
    ProfileLoaded {
        account_id: String,
        seq: u64,
        result: Result<(Profile, Vec<Post>), String>,
    },
    ProfilePostsLoaded {
        account_id: String,
        seq: u64,
        result: Result<Vec<Post>, String>,
    },
    RelationshipsLoaded {
        ids: Vec<String>,
        result: Result<HashMap<String, bool>, String>,
    },
    FollowChanged {
        account_id: String,
        following: bool,
        result: Result<(), String>,
    },
    BlockChanged {
        account_id: String,
        blocked: bool,
        result: Result<(), String>,
    },
    BlockedLoaded {
        result: Result<Vec<BlockedAccount>, String>,
    },
    ProfileUpdated {
        result: Result<Profile, String>,
    },
    MediaLoaded {
        key: String,
        owner: PreviewOwner,
        result: Result<Decoded, String>,
    },
    PreferencesSaved {
        result: Result<(), String>,
    },
}

type Task = Box<dyn FnOnce() -> Message + Send + 'static>;

/// Deferred side effect. Running it performs the I/O and yields the single
/// message that feeds its result back into the engine.
pub struct Command {
    label: &'static str,
    task: Task,
}

impl Command {
    pub fn new<F>(label: &'static str, task: F) -> Self
    where
        F: FnOnce() -> Message + Send + 'static,
    {
        Self {
            label,
            task: Box::new(task),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn run(self) -> Message {
        (self.task)()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("label", &self.label).finish()
    }
}

/// Renders an error chain for storage in a result message.
pub fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_runs_once_and_keeps_label() {
        let command = Command::new("feed.load", || Message::Tick);
        assert_eq!(command.label(), "feed.load");
        assert!(format!("{command:?}").contains("feed.load"));
        assert!(matches!(command.run(), Message::Tick));
    }

    #[test]
    fn describe_includes_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("fetch tag page");
        assert_eq!(describe(&err), "fetch tag page: connection reset");
    }
}
