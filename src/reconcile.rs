//! Matching rules that pair optimistic local items with the server's answer.
//!
//! Freshly created posts have no server id yet, so a success result is paired
//! with its placeholder by temp id first and by content second. The content
//! rule is a containment heuristic (the server may append required hashtags)
//! and can pair the wrong item when two pending posts share overlapping text.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

use crate::feed::{FeedItem, ItemStatus};
use crate::post::Post;

pub const TEMP_ID_PREFIX: &str = "local-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mints an id no server will ever issue: reserved prefix, process-wide
/// monotonic counter, random suffix.
pub fn mint_temp_id() -> String {
    let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{TEMP_ID_PREFIX}{sequence}-{suffix}")
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

pub fn content_overlaps(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(b) || b.contains(a)
}

/// Builds the placeholder shown while a create or reply is in flight.
pub fn local_post(
    temp_id: String,
    content: &str,
    author: &LocalAuthor,
    in_reply_to_id: Option<String>,
) -> Post {
    Post {
        id: temp_id,
        account_id: author.account_id.clone(),
        display_name: author.display_name.clone(),
        handle: author.handle.clone(),
        content: content.to_string(),
        created_at: Utc::now(),
        url: String::new(),
        liked: false,
        likes_count: 0,
        replies_count: 0,
        in_reply_to_id,
        media: Vec::new(),
        is_mine: true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAuthor {
    pub account_id: String,
    pub display_name: String,
    pub handle: String,
}

/// Finds the list entry a mutation result belongs to: exact id (local or
/// server) first, then, unless this was an edit, a pending create whose
/// content overlaps the server's.
pub fn find_feed_match(
    items: &[FeedItem],
    local_id: &str,
    server: Option<&Post>,
    is_edit: bool,
) -> Option<usize> {
    if let Some(index) = items.iter().position(|item| item.post.id == local_id) {
        return Some(index);
    }
    let server = server?;
    if let Some(index) = items.iter().position(|item| item.post.id == server.id) {
        return Some(index);
    }
    if is_edit {
        return None;
    }
    items.iter().position(|item| {
        matches!(item.status, ItemStatus::PendingCreate | ItemStatus::Failed)
            && is_temp_id(&item.post.id)
            && content_overlaps(&item.post.content, &server.content)
    })
}

/// Reply pairing: local temp id first, otherwise a reply with the same parent
/// and identical content created under some other local id.
pub fn find_reply_post(posts: &[Post], local_id: &str, server: &Post) -> Option<usize> {
    if let Some(index) = posts
        .iter()
        .position(|post| post.id == local_id || post.id == server.id)
    {
        return Some(index);
    }
    posts.iter().position(|post| {
        is_temp_id(&post.id)
            && post.parent_id() == server.parent_id()
            && post.content.trim() == server.content.trim()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Replaced,
    Appended,
    Removed,
    Missing,
}

/// Applies a successful create or edit. An unmatched server post is appended
/// rather than lost.
pub fn apply_saved(items: &mut Vec<FeedItem>, local_id: &str, server: Post, is_edit: bool) -> Outcome {
    match find_feed_match(items, local_id, Some(&server), is_edit) {
        Some(index) => {
            let item = &mut items[index];
            item.post = server;
            item.mark_normal();
            let id = item.post.id.clone();
            let mut position = 0;
            items.retain(|candidate| {
                let keep = position == index || candidate.post.id != id;
                position += 1;
                keep
            });
            Outcome::Replaced
        }
        None => {
            items.push(FeedItem::new(server));
            Outcome::Appended
        }
    }
}

/// Marks a failed create or edit. Edits get their previous content back.
pub fn apply_save_failed(items: &mut [FeedItem], local_id: &str, error: &str) -> Outcome {
    let Some(item) = items.iter_mut().find(|item| item.post.id == local_id) else {
        return Outcome::Missing;
    };
    if let Some(previous) = item.old_content.take() {
        item.post.content = previous;
    }
    item.mark_failed(error);
    Outcome::Replaced
}

pub fn apply_deleted(items: &mut Vec<FeedItem>, id: &str) -> Outcome {
    let before = items.len();
    items.retain(|item| item.post.id != id);
    if items.len() == before {
        Outcome::Missing
    } else {
        Outcome::Removed
    }
}

pub fn apply_delete_failed(items: &mut [FeedItem], id: &str, error: &str) -> Outcome {
    match items.iter_mut().find(|item| item.post.id == id) {
        Some(item) => {
            item.mark_failed(error);
            Outcome::Replaced
        }
        None => Outcome::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::fixtures::post;

    fn pending_create(id: &str, content: &str) -> FeedItem {
        let mut local = post(id, 10);
        local.content = content.into();
        FeedItem::pending(local, ItemStatus::PendingCreate)
    }

    #[test]
    fn temp_ids_are_unique_and_recognizable() {
        let a = mint_temp_id();
        let b = mint_temp_id();
        assert_ne!(a, b);
        assert!(is_temp_id(&a));
        assert!(!is_temp_id("109876543210"));
    }

    #[test]
    fn create_success_matches_by_content_containment() {
        let mut items = vec![FeedItem::new(post("1", 1)), pending_create("local-7-a", "hi there")];
        let mut server = post("55", 10);
        server.content = "hi there #rust".into();

        let outcome = apply_saved(&mut items, "local-unknown", server, false);
        assert_eq!(outcome, Outcome::Replaced);
        assert_eq!(items.len(), 2);
        let saved = items.iter().find(|item| item.post.id == "55").unwrap();
        assert_eq!(saved.status, ItemStatus::Normal);
    }

    #[test]
    fn edit_success_never_matches_by_content() {
        let mut items = vec![pending_create("local-7-a", "same text")];
        let mut server = post("55", 10);
        server.content = "same text".into();
        assert_eq!(find_feed_match(&items, "42", Some(&server), true), None);
        assert_eq!(apply_saved(&mut items, "42", server, true), Outcome::Appended);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn saved_result_collapses_duplicate_ids() {
        let mut items = vec![
            pending_create("local-7-a", "hello"),
            FeedItem::new({
                let mut p = post("55", 9);
                p.content = "hello".into();
                p
            }),
        ];
        let mut server = post("55", 9);
        server.content = "hello".into();
        apply_saved(&mut items, "local-7-a", server, false);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].post.id, "55");
    }

    #[test]
    fn failed_edit_restores_content() {
        let mut item = FeedItem::new(post("1", 1));
        item.old_content = Some("before".into());
        item.post.content = "after".into();
        item.status = ItemStatus::PendingUpdate;
        let mut items = vec![item];

        apply_save_failed(&mut items, "1", "timeout");
        assert_eq!(items[0].post.content, "before");
        assert_eq!(items[0].status, ItemStatus::Failed);
        assert_eq!(items[0].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn reply_matches_parent_and_content_under_other_local_id() {
        let mut local = post("local-3-q", 2);
        local.in_reply_to_id = Some("root".into());
        local.content = "agreed".into();
        let replies = vec![local];

        let mut server = post("77", 2);
        server.in_reply_to_id = Some("root".into());
        server.content = "agreed".into();
        assert_eq!(find_reply_post(&replies, "local-other", &server), Some(0));

        server.in_reply_to_id = Some("elsewhere".into());
        assert_eq!(find_reply_post(&replies, "local-other", &server), None);
    }

    #[test]
    fn overlap_ignores_empty_content() {
        assert!(!content_overlaps("", "anything"));
        assert!(content_overlaps("abc", "xabcx"));
    }
}
