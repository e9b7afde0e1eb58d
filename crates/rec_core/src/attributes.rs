//! Sensitive-attribute table for fairness partitioning
//!
//! Attribute files carry `user_id attr_0 [attr_1 ...]` integer lines. Only
//! the dimensions described at load time are consumed; by default a single
//! binary dimension. Users missing from the table are surfaced to callers
//! as lookups returning `None` and counted there, never panics.

use crate::types::{AttrValue, UserId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Description of one attribute dimension.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttrDimension {
    /// Human-readable name used in result files (e.g. `gender`).
    pub name: String,
    /// Group labels this dimension may take, in reporting order.
    pub groups: Vec<AttrValue>,
    /// Whether parity differences are reported. Ordinal dimensions such as
    /// age bands keep per-group results but are excluded from parity.
    pub parity_eligible: bool,
}

impl AttrDimension {
    /// The default binary sensitive attribute.
    pub fn binary(name: &str) -> Self {
        Self {
            name: name.to_string(),
            groups: vec![0, 1],
            parity_eligible: true,
        }
    }

    /// An ordinal dimension: reported per group, skipped for parity.
    pub fn ordinal(name: &str, groups: Vec<AttrValue>) -> Self {
        Self {
            name: name.to_string(),
            groups,
            parity_eligible: false,
        }
    }
}

/// Per-user attribute labels across the configured dimensions.
#[derive(Clone, Debug, Default)]
pub struct AttributeTable {
    dims: Vec<AttrDimension>,
    values: BTreeMap<UserId, Vec<AttrValue>>,
}

impl AttributeTable {
    pub fn new(dims: Vec<AttrDimension>) -> Self {
        Self {
            dims,
            values: BTreeMap::new(),
        }
    }

    /// Load the attribute file, consuming the first `dims.len()` attribute
    /// columns of each line.
    pub fn load<P: AsRef<Path>>(path: P, dims: Vec<AttrDimension>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read attribute file {}", path.display()))?;

        let mut values = BTreeMap::new();
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

            let mut labels = Vec::with_capacity(dims.len());
            for dim_idx in 0..dims.len() {
                let label = cols
                    .next()
                    .ok_or_else(|| {
                        anyhow::anyhow!("expected {} attribute columns", dims.len())
                    })
                    .and_then(|s| s.parse::<AttrValue>().map_err(Into::into))
                    .with_context(|| {
                        format!("Line {}: invalid attribute {}", line_idx + 1, dim_idx)
                    })?;
                labels.push(label);
            }

            values.insert(user, labels);
        }

        Ok(Self { dims, values })
    }

    pub fn insert(&mut self, user: UserId, labels: Vec<AttrValue>) {
        self.values.insert(user, labels);
    }

    /// Attribute labels for one user, one entry per dimension.
    pub fn get(&self, user: UserId) -> Option<&[AttrValue]> {
        self.values.get(&user).map(|v| v.as_slice())
    }

    pub fn dims(&self) -> &[AttrDimension] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
