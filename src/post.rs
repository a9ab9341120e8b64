use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Gifv,
    Video,
    Audio,
    Unknown,
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Gifv => "gif",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Unknown => "media",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaAttachment {
    pub id: String,
    pub kind: MediaKind,
    pub url: String,
    pub preview_url: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
}

/// A status as delivered by the server. The engine only rewrites the like
/// overlay and content (during optimistic edits); everything else is taken
/// from the latest fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account_id: String,
    pub display_name: String,
    pub handle: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub liked: bool,
    pub likes_count: u64,
    pub replies_count: u64,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    #[serde(default)]
    pub is_mine: bool,
}

impl Post {
    pub fn parent_id(&self) -> Option<&str> {
        self.in_reply_to_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn author_label(&self) -> String {
        let name = self.display_name.trim();
        if name.is_empty() {
            format!("@{}", self.handle)
        } else {
            format!("{} @{}", name, self.handle)
        }
    }

    /// Flips the local like overlay, keeping the count consistent.
    pub fn toggle_like(&mut self) {
        if self.liked {
            self.liked = false;
            self.likes_count = self.likes_count.saturating_sub(1);
        } else {
            self.liked = true;
            self.likes_count = self.likes_count.saturating_add(1);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub handle: String,
    pub bio: String,
    pub avatar_url: String,
    pub followers_count: u64,
    pub following_count: u64,
    pub posts_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockedAccount {
    pub id: String,
    pub display_name: String,
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadContext {
    pub ancestors: Vec<Post>,
    pub descendants: Vec<Post>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;

    pub fn post(id: &str, minute: u32) -> Post {
        Post {
            id: id.to_string(),
            account_id: "acct-1".into(),
            display_name: "Ada".into(),
            handle: "ada@example.social".into(),
            content: format!("post {id}"),
            created_at: Utc
                .with_ymd_and_hms(2024, 5, 1, 12, minute, 0)
                .single()
                .unwrap_or_else(Utc::now),
            url: format!("https://example.social/@ada/{id}"),
            liked: false,
            likes_count: 0,
            replies_count: 0,
            in_reply_to_id: None,
            media: Vec::new(),
            is_mine: false,
        }
    }

    pub fn reply(id: &str, parent: &str, minute: u32) -> Post {
        Post {
            in_reply_to_id: Some(parent.to_string()),
            ..post(id, minute)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::post;

    #[test]
    fn toggle_like_twice_restores_count() {
        let mut item = post("1", 0);
        item.likes_count = 4;
        item.toggle_like();
        assert!(item.liked);
        assert_eq!(item.likes_count, 5);
        item.toggle_like();
        assert!(!item.liked);
        assert_eq!(item.likes_count, 4);
    }

    #[test]
    fn unlike_never_underflows() {
        let mut item = post("1", 0);
        item.liked = true;
        item.toggle_like();
        assert_eq!(item.likes_count, 0);
    }

    #[test]
    fn empty_parent_is_top_level() {
        let mut item = post("1", 0);
        item.in_reply_to_id = Some(String::new());
        assert_eq!(item.parent_id(), None);
    }
}
