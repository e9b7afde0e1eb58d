//! Shared identifier types and snapshot boundary arithmetic

use crate::errors::{RecCoreError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// User identifier as it appears in edge-list files.
pub type UserId = u32;

/// Item identifier as it appears in edge-list files.
pub type ItemId = u32;

/// Sensitive-attribute label value.
pub type AttrValue = i64;

/// One directed user→item interaction; stream position is its timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub user: UserId,
    pub item: ItemId,
}

impl Interaction {
    pub fn new(user: UserId, item: ItemId) -> Self {
        Self { user, item }
    }
}

/// Ordered end-offsets partitioning the interaction stream into snapshots.
///
/// Snapshot 0 covers `[0, ends[0])` and is the pre-training partition;
/// snapshot `i > 0` covers `[ends[i-1], ends[i])`. Boundaries are strictly
/// increasing, so every stream index belongs to exactly one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBoundaries {
    ends: Vec<usize>,
}

impl SnapshotBoundaries {
    pub fn new(ends: Vec<usize>) -> Result<Self> {
        if ends.is_empty() {
            return Err(RecCoreError::Config(
                "snapshot boundaries must not be empty".to_string(),
            ));
        }
        for pair in ends.windows(2) {
            if pair[1] <= pair[0] {
                return Err(RecCoreError::Config(format!(
                    "snapshot boundaries must be strictly increasing: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self { ends })
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Stream index range covered by snapshot `idx`.
    pub fn range(&self, idx: usize) -> Option<Range<usize>> {
        if idx >= self.ends.len() {
            return None;
        }
        let start = if idx == 0 { 0 } else { self.ends[idx - 1] };
        Some(start..self.ends[idx])
    }

    pub fn ends(&self) -> &[usize] {
        &self.ends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_ranges() -> Result<()> {
        let bounds = SnapshotBoundaries::new(vec![100, 250, 400])?;

        assert_eq!(bounds.len(), 3);
        assert_eq!(bounds.range(0), Some(0..100));
        assert_eq!(bounds.range(1), Some(100..250));
        assert_eq!(bounds.range(2), Some(250..400));
        assert_eq!(bounds.range(3), None);

        Ok(())
    }

    #[test]
    fn test_boundaries_must_increase() {
        assert!(SnapshotBoundaries::new(vec![100, 100]).is_err());
        assert!(SnapshotBoundaries::new(vec![250, 100]).is_err());
        assert!(SnapshotBoundaries::new(vec![]).is_err());
    }
}
