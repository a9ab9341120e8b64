use crate::feed::{FeedItem, FeedView};

pub const PAGE_SIZE: usize = 20;
/// Cursor distance from the last visible item that starts an older-page fetch.
pub const PREFETCH_DISTANCE: usize = 3;

/// Pagination bookkeeping owned by one feed view (or one profile).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Paging {
    pub oldest_id: Option<String>,
    pub has_more: bool,
    pub seq: u64,
    pub loading_initial: bool,
    pub loading_more: bool,
}

impl Paging {
    pub fn is_loading(&self) -> bool {
        self.loading_initial || self.loading_more
    }

    /// Starts an initial load or refresh and returns the sequence number the
    /// result must carry.
    pub fn begin_initial(&mut self) -> u64 {
        self.seq = self.seq.wrapping_add(1);
        self.oldest_id = None;
        self.has_more = false;
        self.loading_initial = true;
        self.loading_more = false;
        self.seq
    }

    pub fn begin_more(&mut self) -> u64 {
        self.seq = self.seq.wrapping_add(1);
        self.loading_more = true;
        self.seq
    }

    pub fn accepts(&self, seq: u64) -> bool {
        self.seq == seq
    }

    pub fn finish(&mut self) {
        self.loading_initial = false;
        self.loading_more = false;
    }
}

/// Trending is one snapshot; every other view keeps paging while pages come
/// back full. A short page means the server ran out.
pub fn has_more_after(view: FeedView, fetched: usize, limit: usize) -> bool {
    match view {
        FeedView::Trending => false,
        FeedView::Following => fetched >= limit,
        FeedView::PrimaryTag | FeedView::CustomTag => fetched >= limit && fetched > 0,
    }
}

/// True when the cursor sits within `PREFETCH_DISTANCE` of the last visible
/// item. `visible` holds list indices in display order.
pub fn near_end(visible: &[usize], cursor: usize) -> bool {
    let Some(position) = visible.iter().position(|&index| index == cursor) else {
        return false;
    };
    visible.len() - 1 - position <= PREFETCH_DISTANCE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoreDecision {
    Start,
    AlreadyLoading,
    Exhausted,
}

pub fn decide_more(paging: &Paging) -> MoreDecision {
    if paging.is_loading() {
        MoreDecision::AlreadyLoading
    } else if !paging.has_more {
        MoreDecision::Exhausted
    } else {
        MoreDecision::Start
    }
}

/// Viewport position expressed by identity: the item at the top of the view
/// (plus how many of its lines are scrolled off) and the selected item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Anchor {
    pub top_id: Option<String>,
    pub top_line: usize,
    pub selected_id: Option<String>,
}

/// `offset` is the position of the topmost (possibly partial) item within
/// the visible list.
pub fn capture_anchor(
    items: &[FeedItem],
    visible: &[usize],
    offset: usize,
    top_line: usize,
    cursor: usize,
) -> Anchor {
    let top_id = visible
        .get(offset)
        .and_then(|&index| items.get(index))
        .map(|item| item.post.id.clone());
    let selected_id = items.get(cursor).map(|item| item.post.id.clone());
    let top_line = if top_id.is_some() { top_line } else { 0 };
    Anchor {
        top_id,
        top_line,
        selected_id,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restored {
    pub offset: usize,
    pub top_line: usize,
    pub cursor: usize,
}

/// Relocates a captured anchor in a list that may have grown or reordered.
/// Ids that vanished fall back to clamped numeric positions.
pub fn restore_anchor(
    anchor: &Anchor,
    items: &[FeedItem],
    visible: &[usize],
    fallback: Restored,
) -> Restored {
    let located_top = anchor.top_id.as_deref().and_then(|id| {
        visible
            .iter()
            .position(|&index| items.get(index).map(|item| item.post.id == id).unwrap_or(false))
    });
    let (offset, top_line) = match located_top {
        Some(position) => (position, anchor.top_line),
        None => (fallback.offset.min(visible.len().saturating_sub(1)), 0),
    };

    let cursor = anchor
        .selected_id
        .as_deref()
        .and_then(|id| items.iter().position(|item| item.post.id == id))
        .unwrap_or_else(|| fallback.cursor.min(items.len().saturating_sub(1)));

    Restored {
        offset,
        top_line,
        cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{merge_fetched, LoadMode};
    use crate::post::fixtures::post;

    fn page(range: std::ops::Range<u32>) -> Vec<crate::post::Post> {
        range.rev().map(|n| post(&format!("{n:03}"), n)).collect()
    }

    #[test]
    fn initial_load_resets_and_bumps_sequence() {
        let mut paging = Paging {
            oldest_id: Some("1".into()),
            has_more: true,
            seq: 4,
            ..Paging::default()
        };
        let seq = paging.begin_initial();
        assert_eq!(seq, 5);
        assert!(paging.oldest_id.is_none());
        assert!(!paging.has_more);
        assert!(paging.loading_initial);
        assert!(!paging.accepts(4));
    }

    #[test]
    fn has_more_rules_per_view() {
        assert!(!has_more_after(FeedView::Trending, 20, 20));
        assert!(has_more_after(FeedView::Following, 20, 20));
        assert!(!has_more_after(FeedView::Following, 19, 20));
        assert!(has_more_after(FeedView::PrimaryTag, 20, 20));
        assert!(!has_more_after(FeedView::CustomTag, 5, 20));
    }

    #[test]
    fn prefetch_triggers_near_last_visible() {
        let visible: Vec<usize> = (0..20).collect();
        assert!(!near_end(&visible, 15));
        assert!(near_end(&visible, 16));
        assert!(near_end(&visible, 17));
        assert!(!near_end(&visible, 99));
    }

    #[test]
    fn prefetch_measures_against_visible_items_only() {
        let visible = vec![0, 1, 2, 3, 4, 5, 9];
        assert!(near_end(&visible, 3));
        assert!(!near_end(&visible, 2));
    }

    #[test]
    fn more_decisions() {
        let mut paging = Paging::default();
        assert_eq!(decide_more(&paging), MoreDecision::Exhausted);
        paging.has_more = true;
        assert_eq!(decide_more(&paging), MoreDecision::Start);
        paging.begin_more();
        assert_eq!(decide_more(&paging), MoreDecision::AlreadyLoading);
    }

    #[test]
    fn anchor_survives_append_by_identity() {
        let items = merge_fetched(&[], page(40..60), LoadMode::Initial);
        let visible: Vec<usize> = (0..items.len()).collect();
        let anchor = capture_anchor(&items, &visible, 12, 1, 17);

        let grown = merge_fetched(&items, page(35..40), LoadMode::Older);
        let visible: Vec<usize> = (0..grown.len()).collect();
        let restored = restore_anchor(
            &anchor,
            &grown,
            &visible,
            Restored {
                offset: 0,
                top_line: 0,
                cursor: 0,
            },
        );

        assert_eq!(grown.len(), 25);
        assert_eq!(grown[restored.offset].post.id, items[12].post.id);
        assert_eq!(restored.top_line, 1);
        assert_eq!(grown[restored.cursor].post.id, items[17].post.id);
    }

    #[test]
    fn anchor_tracks_head_insertions() {
        let items = merge_fetched(&[], page(10..15), LoadMode::Initial);
        let visible: Vec<usize> = (0..items.len()).collect();
        let anchor = capture_anchor(&items, &visible, 1, 0, 2);

        let mut grown = items.clone();
        grown.insert(0, crate::feed::FeedItem::new(post("999", 59)));
        let visible: Vec<usize> = (0..grown.len()).collect();
        let restored = restore_anchor(
            &anchor,
            &grown,
            &visible,
            Restored {
                offset: 0,
                top_line: 0,
                cursor: 0,
            },
        );
        assert_eq!(restored.offset, 2);
        assert_eq!(restored.cursor, 3);
    }
}
