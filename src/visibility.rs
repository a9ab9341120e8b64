use std::collections::{HashMap, HashSet};

use crate::feed::{FeedItem, FeedView};

/// Everything that decides whether a loaded item is displayable, independent
/// of what is loaded.
#[derive(Debug, Clone, Copy)]
pub struct Filter<'a> {
    pub hidden_posts: &'a HashSet<String>,
    pub hidden_authors: &'a HashSet<String>,
    pub show_hidden: bool,
    pub view: FeedView,
    pub relationships: &'a HashMap<String, bool>,
    pub current_account: Option<&'a str>,
}

impl Filter<'_> {
    pub fn is_visible(&self, item: &FeedItem) -> bool {
        let post = &item.post;
        let hidden = self.hidden_posts.contains(&post.id)
            || self.hidden_authors.contains(&post.account_id);
        if hidden && !self.show_hidden {
            return false;
        }
        if self.view != FeedView::Following {
            return true;
        }
        let mine = post.is_mine
            || self
                .current_account
                .map(|account| account == post.account_id)
                .unwrap_or(false);
        if mine {
            return false;
        }
        // Authors whose relationship has not been looked up yet stay visible.
        self.relationships
            .get(&post.account_id)
            .copied()
            .unwrap_or(true)
    }

    pub fn visible_indices(&self, items: &[FeedItem]) -> Vec<usize> {
        items
            .iter()
            .enumerate()
            .filter(|(_, item)| self.is_visible(item))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Steps `delta` visible items away from `cursor`, stopping at either end.
/// A cursor that is not itself visible starts from the nearest visible item.
pub fn move_cursor_visible(visible: &[usize], cursor: usize, delta: isize) -> usize {
    if visible.is_empty() {
        return 0;
    }
    let start = match visible.binary_search(&cursor) {
        Ok(position) => position,
        Err(insert) => insert.min(visible.len() - 1),
    };
    let target = if delta < 0 {
        start.saturating_sub(delta.unsigned_abs())
    } else {
        start
            .saturating_add(delta as usize)
            .min(visible.len() - 1)
    };
    visible[target]
}

/// The visible index closest to `cursor`, preferring the following item on a
/// tie. Returns 0 when nothing is visible.
pub fn nearest_visible(visible: &[usize], cursor: usize) -> usize {
    match visible.binary_search(&cursor) {
        Ok(_) => cursor,
        Err(insert) => {
            let after = visible.get(insert).copied();
            let before = insert.checked_sub(1).and_then(|i| visible.get(i)).copied();
            match (before, after) {
                (Some(before), Some(after)) => {
                    if after - cursor <= cursor - before {
                        after
                    } else {
                        before
                    }
                }
                (None, Some(after)) => after,
                (Some(before), None) => before,
                (None, None) => 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::fixtures::post;

    struct Sets {
        hidden_posts: HashSet<String>,
        hidden_authors: HashSet<String>,
        relationships: HashMap<String, bool>,
    }

    impl Sets {
        fn new() -> Self {
            Self {
                hidden_posts: HashSet::new(),
                hidden_authors: HashSet::new(),
                relationships: HashMap::new(),
            }
        }

        fn filter(&self, view: FeedView, show_hidden: bool) -> Filter<'_> {
            Filter {
                hidden_posts: &self.hidden_posts,
                hidden_authors: &self.hidden_authors,
                show_hidden,
                view,
                relationships: &self.relationships,
                current_account: Some("me"),
            }
        }
    }

    fn authored(id: &str, account: &str) -> FeedItem {
        let mut p = post(id, 1);
        p.account_id = account.into();
        FeedItem::new(p)
    }

    #[test]
    fn following_view_uses_relationship_map() {
        let mut sets = Sets::new();
        sets.relationships.insert("bob".into(), false);
        sets.relationships.insert("cat".into(), true);
        let items = vec![
            authored("1", "bob"),
            authored("2", "cat"),
            authored("3", "dan"),
            authored("4", "me"),
        ];
        let filter = sets.filter(FeedView::Following, false);
        assert_eq!(filter.visible_indices(&items), vec![1, 2]);

        let tag_view = sets.filter(FeedView::PrimaryTag, false);
        assert_eq!(tag_view.visible_indices(&items), vec![0, 1, 2, 3]);
    }

    #[test]
    fn hidden_items_return_when_toggled() {
        let mut sets = Sets::new();
        sets.hidden_posts.insert("1".into());
        sets.hidden_authors.insert("eve".into());
        let items = vec![authored("1", "bob"), authored("2", "eve"), authored("3", "cat")];
        assert_eq!(sets.filter(FeedView::Trending, false).visible_indices(&items), vec![2]);
        assert_eq!(
            sets.filter(FeedView::Trending, true).visible_indices(&items),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn cursor_moves_across_visible_and_stops_at_edges() {
        let visible = vec![1, 4, 6];
        assert_eq!(move_cursor_visible(&visible, 1, 1), 4);
        assert_eq!(move_cursor_visible(&visible, 4, 5), 6);
        assert_eq!(move_cursor_visible(&visible, 6, 1), 6);
        assert_eq!(move_cursor_visible(&visible, 1, -1), 1);
        assert_eq!(move_cursor_visible(&visible, 5, -1), 4);
        assert_eq!(move_cursor_visible(&[], 3, 1), 0);
    }

    #[test]
    fn nearest_visible_relocates_hidden_cursor() {
        let visible = vec![1, 4, 9];
        assert_eq!(nearest_visible(&visible, 4), 4);
        assert_eq!(nearest_visible(&visible, 3), 4);
        assert_eq!(nearest_visible(&visible, 2), 1);
        assert_eq!(nearest_visible(&visible, 12), 9);
        assert_eq!(nearest_visible(&[], 5), 0);
    }
}
