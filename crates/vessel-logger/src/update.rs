// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoded measurement updates.

use chrono::{DateTime, Utc};

/// A single timestamped scalar measurement from one source.
///
/// Paths are dot-segmented (`navigation.position.latitude`) but the pipeline
/// treats them as opaque keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Time the measurement was taken, as reported by the source.
    pub timestamp: DateTime<Utc>,

    /// Originating source identifier (e.g. `can0.15`).
    pub source: String,

    /// Field path.
    pub path: String,

    /// Path of the object value this scalar was split out of
    /// (`navigation.position` for `navigation.position.latitude`).
    pub parent: Option<String>,

    /// Measured value.
    pub value: f64,
}

impl Update {
    /// Create a new update.
    pub fn new(
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        path: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            source: source.into(),
            path: path.into(),
            parent: None,
            value,
        }
    }

    /// Record the object path this update was flattened from.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}
