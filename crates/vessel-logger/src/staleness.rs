// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Staleness rejection for delayed or buffered updates.

use chrono::{DateTime, TimeDelta, Utc};

/// Rejects updates older than a fixed threshold.
#[derive(Debug, Clone, Copy)]
pub struct StalenessFilter {
    threshold: TimeDelta,
}

impl StalenessFilter {
    /// Create a filter with the given maximum age.
    pub fn new(threshold: TimeDelta) -> Self {
        Self { threshold }
    }

    /// Check whether an update taken at `timestamp` is fresh at `now`.
    ///
    /// Timestamps in the future are accepted.
    pub fn accept(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - timestamp <= self.threshold
    }
}
