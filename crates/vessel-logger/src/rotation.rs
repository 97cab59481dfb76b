// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-based file rotation policy.
//!
//! Files are named `<prefix><timestamp>.<extension>` where the timestamp is
//! the UTC rotation start formatted as `%Y-%m-%dT%H%M%S`, so lexical order
//! matches creation order. Two rotations inside the same second get a
//! `-<n>` disambiguator before the extension.

use chrono::{DateTime, TimeDelta, Utc};

/// Timestamp format used in file names.
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H%M%S";

/// Rotation policy configuration.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Maximum age of a file before rotating.
    pub interval: TimeDelta,

    /// File name prefix (e.g. `signalk-`).
    pub prefix: String,

    /// File extension without the dot.
    pub extension: String,
}

impl RotationPolicy {
    /// Create a rotation policy with the default `signalk-*.log` naming.
    pub fn every(interval: TimeDelta) -> Self {
        Self {
            interval,
            prefix: "signalk-".to_string(),
            extension: "log".to_string(),
        }
    }

    /// Use a custom file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Use a custom file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Check if a file opened at `opened_at` is due for rotation at `now`.
    pub fn is_due(&self, opened_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - opened_at > self.interval
    }

    /// Generate the file name for a rotation starting at `at`.
    ///
    /// `attempt` 0 is the plain name; higher values add a disambiguator.
    pub fn generate_filename(&self, at: DateTime<Utc>, attempt: u32) -> String {
        let ts = at.format(FILENAME_TIMESTAMP_FORMAT);
        if attempt == 0 {
            format!("{}{}.{}", self.prefix, ts, self.extension)
        } else {
            format!("{}{}-{}.{}", self.prefix, ts, attempt, self.extension)
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::every(TimeDelta::minutes(5))
    }
}
