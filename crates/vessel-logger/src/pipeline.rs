// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Update ingestion pipeline.
//!
//! ```text
//! Update --> SourceResolver --> StalenessFilter --> Record --> FlushPolicy --> RotatingSink
//! ```
//!
//! Updates must be fed serially; the pipeline holds no locks.

use crate::config::{ConfigError, LoggerConfig};
use crate::flush::{FlushPolicy, FlushReason};
use crate::record::Record;
use crate::rotation::RotationPolicy;
use crate::sink::{RotatingSink, SinkError};
use crate::source::SourceResolver;
use crate::staleness::StalenessFilter;
use crate::update::Update;
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// What happened to an ingested update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Dropped: the source is excluded for this path.
    RejectedSource,
    /// Dropped: older than the staleness threshold.
    RejectedStale,
    /// Merged into the record, no flush yet.
    Merged,
    /// Merged and the record was written.
    Flushed(FlushReason),
}

/// Pipeline statistics.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Updates passed to `ingest`.
    pub updates_received: u64,

    /// Updates dropped by source exclusion.
    pub rejected_source: u64,

    /// Updates dropped as stale.
    pub rejected_stale: u64,

    /// Updates merged into the record.
    pub merged: u64,

    /// Records successfully written.
    pub records_written: u64,

    /// Flushes triggered by the missing-field timeout.
    pub forced_flushes: u64,

    /// Flushes whose write failed.
    pub write_errors: u64,

    /// Output files opened.
    pub files_opened: u64,
}

/// Aggregation pipeline for one logging session.
pub struct Pipeline {
    resolver: SourceResolver,
    staleness: StalenessFilter,
    record: Record,
    flush: FlushPolicy,
    sink: RotatingSink,
    stats: PipelineStats,
}

impl Pipeline {
    /// Build a pipeline from configuration, starting the flush clock now.
    pub fn new(config: &LoggerConfig) -> Result<Self, PipelineError> {
        Self::with_start(config, Utc::now())
    }

    /// Build a pipeline whose flush clock starts at `started_at`.
    ///
    /// Validates the configuration and prepares the output directory.
    pub fn with_start(
        config: &LoggerConfig,
        started_at: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        config.prepare_output_dir()?;

        let rotation = RotationPolicy::every(config.rotation_interval()?)
            .with_prefix(config.file_prefix.clone())
            .with_extension(config.file_extension.clone());

        let resolver = config
            .excluded_sources
            .iter()
            .map(|(path, source)| (path.clone(), source.clone()))
            .collect();

        Ok(Self {
            resolver,
            staleness: StalenessFilter::new(config.stale_threshold()?),
            record: Record::new(config.required_fields.clone()),
            flush: FlushPolicy::new(config.missing_field_timeout()?, started_at),
            sink: RotatingSink::new(&config.output_dir, rotation),
            stats: PipelineStats::default(),
        })
    }

    /// Ingest one update using the current wall clock.
    pub fn ingest(&mut self, update: Update) -> Result<IngestOutcome, PipelineError> {
        self.ingest_at(update, Utc::now())
    }

    /// Ingest one update as of `now`.
    ///
    /// On a flush the record is cleared and the flush clock restarted even if
    /// the write fails, so a broken disk does not re-emit the same values.
    pub fn ingest_at(
        &mut self,
        update: Update,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, PipelineError> {
        self.stats.updates_received += 1;

        let parent_excluded = update
            .parent
            .as_deref()
            .is_some_and(|parent| !self.resolver.accept(parent, &update.source));
        if parent_excluded || !self.resolver.accept(&update.path, &update.source) {
            tracing::trace!("Ignoring {} from excluded source {}", update.path, update.source);
            self.stats.rejected_source += 1;
            return Ok(IngestOutcome::RejectedSource);
        }

        if !self.staleness.accept(update.timestamp, now) {
            tracing::debug!("Ignoring stale field: {} {}", update.path, update.timestamp);
            self.stats.rejected_stale += 1;
            return Ok(IngestOutcome::RejectedStale);
        }

        self.record.merge(update.path, update.value);
        self.stats.merged += 1;

        let Some(reason) = self.flush.evaluate(&self.record, now) else {
            return Ok(IngestOutcome::Merged);
        };

        if reason == FlushReason::Forced {
            let missing: Vec<&str> = self.record.missing().collect();
            tracing::debug!("Forcing flush with missing fields: {}", missing.join(", "));
            self.stats.forced_flushes += 1;
        }

        let result = self.sink.write_record(&self.record, now);
        self.record.clear();
        self.flush.mark_flushed(now);
        self.stats.files_opened = self.sink.files_opened();

        match result {
            Ok(()) => {
                self.stats.records_written += 1;
                Ok(IngestOutcome::Flushed(reason))
            }
            Err(e) => {
                self.stats.write_errors += 1;
                Err(e.into())
            }
        }
    }

    /// Release the open output file. Values not yet flushed are discarded.
    pub fn close(&mut self) -> Result<(), PipelineError> {
        if !self.record.is_empty() {
            tracing::debug!("Discarding {} unflushed values", self.record.len());
        }
        self.sink.close()?;
        Ok(())
    }

    /// Current statistics.
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Record being accumulated.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Currently open output file.
    pub fn current_path(&self) -> Option<&Path> {
        self.sink.current_path()
    }
}
