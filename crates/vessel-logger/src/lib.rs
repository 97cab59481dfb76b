// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Vessel Logger
//!
//! Aggregates timestamped SignalK measurements from redundant instrument
//! buses into one composite record and appends it to rotated CSV files.
//!
//! # Pipeline
//!
//! - **Source resolution**: per-path excluded source drops redundant readings
//! - **Staleness**: updates older than a threshold are ignored
//! - **Accumulation**: latest value per path until the next flush
//! - **Flush timing**: on completeness, or forced after a missing-field timeout
//! - **Rotation**: a new `signalk-<timestamp>.log` file per rotation window
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use vessel_logger::{LoggerConfig, Pipeline, Update};
//!
//! let config = LoggerConfig::default();
//! let mut pipeline = Pipeline::new(&config)?;
//! pipeline.ingest(Update::new(Utc::now(), "can0.20", "navigation.rateOfTurn", 0.01))?;
//! pipeline.close()?;
//! # Ok::<(), vessel_logger::PipelineError>(())
//! ```

pub mod config;
pub mod flush;
pub mod pipeline;
pub mod record;
pub mod rotation;
pub mod signalk;
pub mod sink;
pub mod source;
pub mod staleness;
pub mod update;

pub use config::{ConfigError, LoggerConfig, SignalKConfig};
pub use flush::{FlushPolicy, FlushReason};
pub use pipeline::{IngestOutcome, Pipeline, PipelineError, PipelineStats};
pub use record::Record;
pub use rotation::RotationPolicy;
pub use signalk::{decode_delta, Delta, LineBuffer, LineRead, Subscription};
pub use sink::{RotatingSink, SinkError};
pub use source::SourceResolver;
pub use staleness::StalenessFilter;
pub use update::Update;
