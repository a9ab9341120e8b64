use std::collections::{HashMap, HashSet};

use crate::post::Post;

/// Replies beyond the second level are not nested further.
pub const MAX_DEPTH: usize = 2;

/// Orders a flat descendant list for display: each direct reply to `root_id`
/// is followed by its own direct replies, then every descendant whose parent
/// never resolved is appended in input order. Siblings keep their relative
/// input order and every id appears once.
pub fn assemble(root_id: &str, descendants: &[Post]) -> Vec<Post> {
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, post) in descendants.iter().enumerate() {
        if let Some(parent) = post.parent_id() {
            children.entry(parent).or_default().push(index);
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<Post> = Vec::with_capacity(descendants.len());

    let first_level = children.get(root_id).cloned().unwrap_or_default();
    for index in first_level {
        let reply = &descendants[index];
        if !placed.insert(reply.id.as_str()) {
            continue;
        }
        ordered.push(reply.clone());
        if let Some(nested) = children.get(reply.id.as_str()) {
            for &child in nested {
                let child = &descendants[child];
                if child.id == root_id || !placed.insert(child.id.as_str()) {
                    continue;
                }
                ordered.push(child.clone());
            }
        }
    }

    for post in descendants {
        if post.id == root_id || placed.contains(post.id.as_str()) {
            continue;
        }
        placed.insert(post.id.as_str());
        ordered.push(post.clone());
    }

    ordered
}

/// Display depth of an assembled reply relative to the thread root.
pub fn depth_of(root_id: &str, reply: &Post, replies: &[Post]) -> usize {
    match reply.parent_id() {
        Some(parent) if parent == root_id => 1,
        Some(parent) if replies.iter().any(|candidate| candidate.id == parent) => MAX_DEPTH,
        _ => 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadEntry {
    /// Root-to-parent order.
    pub ancestors: Vec<Post>,
    /// Assembled order.
    pub descendants: Vec<Post>,
}

impl ThreadEntry {
    pub fn contains(&self, id: &str) -> bool {
        self.ancestors.iter().any(|post| post.id == id)
            || self.descendants.iter().any(|post| post.id == id)
    }

    pub fn posts_mut(&mut self) -> impl Iterator<Item = &mut Post> {
        self.ancestors.iter_mut().chain(self.descendants.iter_mut())
    }
}

/// Previously fetched threads keyed by the focused post id. Entries are only
/// ever overwritten, never expired.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadCache {
    entries: HashMap<String, ThreadEntry>,
}

impl ThreadCache {
    pub fn get(&self, root_id: &str) -> Option<&ThreadEntry> {
        self.entries.get(root_id)
    }

    pub fn get_mut(&mut self, root_id: &str) -> Option<&mut ThreadEntry> {
        self.entries.get_mut(root_id)
    }

    pub fn insert(&mut self, root_id: impl Into<String>, entry: ThreadEntry) {
        self.entries.insert(root_id.into(), entry);
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ThreadEntry> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
