use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::post::Post;
use crate::reconcile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedView {
    #[default]
    PrimaryTag,
    Trending,
    Following,
    CustomTag,
}

pub const FEED_VIEWS: [FeedView; 4] = [
    FeedView::PrimaryTag,
    FeedView::Trending,
    FeedView::Following,
    FeedView::CustomTag,
];

impl FeedView {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedView::PrimaryTag => "primary_tag",
            FeedView::Trending => "trending",
            FeedView::Following => "following",
            FeedView::CustomTag => "custom_tag",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        FEED_VIEWS
            .iter()
            .copied()
            .find(|view| view.as_str().eq_ignore_ascii_case(key.trim()))
    }

    pub fn title(&self) -> &'static str {
        match self {
            FeedView::PrimaryTag => "Hashtag",
            FeedView::Trending => "Trending",
            FeedView::Following => "Following",
            FeedView::CustomTag => "Custom tag",
        }
    }

    pub fn next(self) -> Self {
        let index = FEED_VIEWS.iter().position(|view| *view == self).unwrap_or(0);
        FEED_VIEWS[(index + 1) % FEED_VIEWS.len()]
    }

    /// Identifies what a load request was for. A result whose key differs from
    /// the current one belongs to a view or hashtag the user already left.
    pub fn query_key(&self, primary_tag: &str, custom_tag: &str) -> String {
        match self {
            FeedView::PrimaryTag => format!("tag:{}", normalize_tag(primary_tag)),
            FeedView::CustomTag => format!("custom:{}", normalize_tag(custom_tag)),
            FeedView::Trending => "trending".to_string(),
            FeedView::Following => "following".to_string(),
        }
    }
}

pub fn normalize_tag(raw: &str) -> String {
    raw.trim().trim_start_matches('#').trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    Normal,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Failed,
}

impl ItemStatus {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ItemStatus::PendingCreate | ItemStatus::PendingUpdate | ItemStatus::PendingDelete
        )
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ItemStatus::Normal => "",
            ItemStatus::PendingCreate => "posting…",
            ItemStatus::PendingUpdate => "saving…",
            ItemStatus::PendingDelete => "deleting…",
            ItemStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub post: Post,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub old_content: Option<String>,
}

impl FeedItem {
    pub fn new(post: Post) -> Self {
        Self {
            post,
            status: ItemStatus::Normal,
            error: None,
            old_content: None,
        }
    }

    pub fn pending(post: Post, status: ItemStatus) -> Self {
        Self {
            post,
            status,
            error: None,
            old_content: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.post.id
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ItemStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn mark_normal(&mut self) {
        self.status = ItemStatus::Normal;
        self.error = None;
        self.old_content = None;
    }
}

/// Newest first; identical timestamps fall back to the larger id so the order
/// is total and stable across reloads.
pub fn compare_newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

pub fn sort_items(items: &mut [FeedItem]) {
    items.sort_by(|a, b| compare_newest_first(&a.post, &b.post));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Initial,
    Older,
}

/// Combines a fetched page with the list currently on screen.
///
/// Initial loads replace the list but carry every local item that is still in
/// flight or failed: pending edits and deletes keep their overlay on the
/// fetched copy (matched by id), pending creates survive until a fetched post
/// with overlapping content shows the server already has them. Older pages
/// append, skipping ids already present. The result is sorted and holds one
/// item per id.
pub fn merge_fetched(existing: &[FeedItem], fetched: Vec<Post>, mode: LoadMode) -> Vec<FeedItem> {
    let mut merged: Vec<FeedItem> = match mode {
        LoadMode::Initial => Vec::with_capacity(fetched.len()),
        LoadMode::Older => existing.to_vec(),
    };
    let mut seen: HashSet<String> = merged.iter().map(|item| item.post.id.clone()).collect();

    for post in fetched {
        if !seen.insert(post.id.clone()) {
            continue;
        }
        merged.push(FeedItem::new(post));
    }

    if mode == LoadMode::Initial {
        for local in existing {
            match local.status {
                ItemStatus::PendingUpdate | ItemStatus::PendingDelete => {
                    if let Some(item) = merged.iter_mut().find(|item| item.post.id == local.post.id)
                    {
                        item.status = local.status;
                        item.old_content = local.old_content.clone();
                        item.post.content = local.post.content.clone();
                    } else {
                        merged.push(local.clone());
                    }
                }
                ItemStatus::PendingCreate | ItemStatus::Failed => {
                    if reconcile::is_temp_id(&local.post.id) {
                        let confirmed = merged.iter().any(|item| {
                            !reconcile::is_temp_id(&item.post.id)
                                && reconcile::content_overlaps(
                                    &item.post.content,
                                    &local.post.content,
                                )
                        });
                        if local.status == ItemStatus::PendingCreate && confirmed {
                            continue;
                        }
                        merged.push(local.clone());
                    } else if let Some(item) =
                        merged.iter_mut().find(|item| item.post.id == local.post.id)
                    {
                        item.status = local.status;
                        item.error = local.error.clone();
                    } else if local.status == ItemStatus::Failed {
                        merged.push(local.clone());
                    }
                }
                ItemStatus::Normal => {}
            }
        }
    }

    dedup_by_id(&mut merged);
    sort_items(&mut merged);
    merged
}

fn dedup_by_id(items: &mut Vec<FeedItem>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.post.id.clone()));
}

/// Oldest server-issued id in the list; local temp ids never page.
pub fn oldest_server_id(items: &[FeedItem]) -> Option<String> {
    items
        .iter()
        .filter(|item| !reconcile::is_temp_id(&item.post.id))
        .max_by(|a, b| compare_newest_first(&a.post, &b.post))
        .map(|item| item.post.id.clone())
}

pub fn position_of(items: &[FeedItem], id: &str) -> Option<usize> {
    items.iter().position(|item| item.post.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::fixtures::post;

    fn ids(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|item| item.post.id.as_str()).collect()
    }

    #[test]
    fn sorts_newest_first_with_id_tie_break() {
        let mut items = vec![
            FeedItem::new(post("a", 1)),
            FeedItem::new(post("c", 5)),
            FeedItem::new(post("b", 5)),
        ];
        sort_items(&mut items);
        assert_eq!(ids(&items), vec!["c", "b", "a"]);
    }

    #[test]
    fn initial_merge_keeps_pending_edit_overlay() {
        let mut edited = FeedItem::new(post("1", 1));
        edited.old_content = Some("post 1".into());
        edited.post.content = "edited locally".into();
        edited.status = ItemStatus::PendingUpdate;

        let merged = merge_fetched(&[edited], vec![post("1", 1), post("2", 2)], LoadMode::Initial);
        assert_eq!(ids(&merged), vec!["2", "1"]);
        assert_eq!(merged[1].status, ItemStatus::PendingUpdate);
        assert_eq!(merged[1].post.content, "edited locally");
        assert_eq!(merged[1].old_content.as_deref(), Some("post 1"));
    }

    #[test]
    fn initial_merge_drops_create_already_on_server() {
        let mut local = post("local-1-x", 30);
        local.content = "hello world".into();
        let pending = FeedItem::pending(local, ItemStatus::PendingCreate);

        let mut server = post("99", 30);
        server.content = "hello world #rust".into();

        let merged = merge_fetched(&[pending], vec![server], LoadMode::Initial);
        assert_eq!(ids(&merged), vec!["99"]);
    }

    #[test]
    fn initial_merge_keeps_unconfirmed_create() {
        let mut local = post("local-1-x", 30);
        local.content = "brand new".into();
        let pending = FeedItem::pending(local, ItemStatus::PendingCreate);

        let merged = merge_fetched(&[pending], vec![post("1", 1)], LoadMode::Initial);
        assert_eq!(ids(&merged), vec!["local-1-x", "1"]);
        assert_eq!(merged[0].status, ItemStatus::PendingCreate);
    }

    #[test]
    fn older_merge_appends_without_duplicates() {
        let existing = vec![FeedItem::new(post("3", 3)), FeedItem::new(post("2", 2))];
        let merged = merge_fetched(&existing, vec![post("2", 2), post("1", 1)], LoadMode::Older);
        assert_eq!(ids(&merged), vec!["3", "2", "1"]);
    }

    #[test]
    fn oldest_server_id_skips_local_items() {
        let items = vec![
            FeedItem::new(post("3", 3)),
            FeedItem::pending(post("local-9-z", 0), ItemStatus::PendingCreate),
            FeedItem::new(post("1", 1)),
        ];
        assert_eq!(oldest_server_id(&items).as_deref(), Some("1"));
    }

    #[test]
    fn query_keys_distinguish_views_and_tags() {
        let primary = FeedView::PrimaryTag.query_key("#Rust", "go");
        assert_eq!(primary, "tag:rust");
        assert_ne!(primary, FeedView::CustomTag.query_key("rust", "rust"));
        assert_eq!(FeedView::from_key("following"), Some(FeedView::Following));
    }
}
