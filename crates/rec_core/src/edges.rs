//! Edge-list loading and in-memory interaction indexing
//!
//! Reads whitespace-delimited `user item` files into stream-ordered edges
//! plus adjacency and user/item sets. Ordered containers keep every
//! iteration deterministic.

use crate::types::{Interaction, ItemId, UserId};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::Path;

/// In-memory index over one edge-list file.
#[derive(Clone, Debug, Default)]
pub struct EdgeListStore {
    edges: Vec<Interaction>,
    positives: BTreeMap<UserId, BTreeSet<ItemId>>,
    users: BTreeSet<UserId>,
    items: BTreeSet<ItemId>,
}

impl EdgeListStore {
    /// Load an edge list from a whitespace/tab-delimited file.
    ///
    /// Each line is `user_id item_id [...]`; extra columns are ignored.
    /// Blank lines and `#` comments are skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read edge file {}", path.display()))?;

        let mut edges = Vec::new();
        for (line_idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut cols = line.split_whitespace();
            let user = cols
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing user column"))
                .and_then(|s| s.parse::<UserId>().map_err(Into::into))
                .with_context(|| format!("Line {}: invalid user id", line_idx + 1))?;
            let item = cols
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing item column"))
                .and_then(|s| s.parse::<ItemId>().map_err(Into::into))
                .with_context(|| format!("Line {}: invalid item id", line_idx + 1))?;

            edges.push(Interaction::new(user, item));
        }

        Ok(Self::from_edges(edges))
    }

    /// Build the index from an already ordered edge stream.
    pub fn from_edges(edges: Vec<Interaction>) -> Self {
        let mut positives: BTreeMap<UserId, BTreeSet<ItemId>> = BTreeMap::new();
        let mut users = BTreeSet::new();
        let mut items = BTreeSet::new();

        for edge in &edges {
            positives.entry(edge.user).or_default().insert(edge.item);
            users.insert(edge.user);
            items.insert(edge.item);
        }

        Self {
            edges,
            positives,
            users,
            items,
        }
    }

    /// All edges in stream order.
    pub fn edges(&self) -> &[Interaction] {
        &self.edges
    }

    /// A contiguous snapshot window of the stream. Out-of-range indices are
    /// clamped so a boundary past the stream end yields a short window.
    pub fn slice(&self, range: Range<usize>) -> &[Interaction] {
        let start = range.start.min(self.edges.len());
        let end = range.end.min(self.edges.len());
        &self.edges[start..end]
    }

    /// Positive items for one user, if the user appears in this store.
    pub fn positives(&self, user: UserId) -> Option<&BTreeSet<ItemId>> {
        self.positives.get(&user)
    }

    pub fn users(&self) -> &BTreeSet<UserId> {
        &self.users
    }

    pub fn items(&self) -> &BTreeSet<ItemId> {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Largest user id observed, if any.
    pub fn max_user(&self) -> Option<UserId> {
        self.users.iter().next_back().copied()
    }

    /// Largest item id observed, if any.
    pub fn max_item(&self) -> Option<ItemId> {
        self.items.iter().next_back().copied()
    }
}
