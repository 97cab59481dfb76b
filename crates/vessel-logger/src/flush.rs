// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flush timing.
//!
//! A record is flushed as soon as it is complete. If required fields stay
//! missing, a flush is forced once the missing-field timeout has elapsed
//! since the previous flush, so a dead sensor cannot stall output.

use crate::record::Record;
use chrono::{DateTime, TimeDelta, Utc};

/// Why a record is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Every required field is present.
    Complete,
    /// The missing-field timeout elapsed.
    Forced,
}

/// Completeness/timeout flush policy.
#[derive(Debug, Clone)]
pub struct FlushPolicy {
    missing_field_timeout: TimeDelta,
    last_flush_at: DateTime<Utc>,
}

impl FlushPolicy {
    /// Create a policy whose clock starts at `started_at`.
    pub fn new(missing_field_timeout: TimeDelta, started_at: DateTime<Utc>) -> Self {
        Self {
            missing_field_timeout,
            last_flush_at: started_at,
        }
    }

    /// Decide whether `record` should be flushed at `now`.
    pub fn evaluate(&self, record: &Record, now: DateTime<Utc>) -> Option<FlushReason> {
        if record.is_complete() {
            Some(FlushReason::Complete)
        } else if now - self.last_flush_at > self.missing_field_timeout {
            Some(FlushReason::Forced)
        } else {
            None
        }
    }

    /// Restart the flush clock. Called only after an actual flush.
    pub fn mark_flushed(&mut self, now: DateTime<Utc>) {
        self.last_flush_at = now;
    }

    /// Time of the last flush (or of construction).
    pub fn last_flush_at(&self) -> DateTime<Utc> {
        self.last_flush_at
    }
}
