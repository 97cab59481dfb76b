// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Redundant source resolution.
//!
//! When the same measurement arrives from two buses, one of them is
//! suppressed per path through a static exclusion table.

use std::collections::HashMap;

/// Per-path excluded source table.
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    excluded: HashMap<String, String>,
}

impl SourceResolver {
    /// Create a resolver from a `path -> excluded source` mapping.
    pub fn new(excluded: HashMap<String, String>) -> Self {
        Self { excluded }
    }

    /// Check whether a value for `path` from `source` should be kept.
    pub fn accept(&self, path: &str, source: &str) -> bool {
        match self.excluded.get(path) {
            Some(excluded) => excluded != source,
            None => true,
        }
    }

    /// Source excluded for `path`, if any.
    pub fn excluded_source(&self, path: &str) -> Option<&str> {
        self.excluded.get(path).map(String::as_str)
    }

    /// Number of paths with an exclusion.
    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    /// Check if no exclusions are configured.
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

impl FromIterator<(String, String)> for SourceResolver {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
