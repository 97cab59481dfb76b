// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rotating CSV sink.
//!
//! Each file starts with a `time,<required paths...>` header followed by one
//! row per flushed record. Rows are flushed to the OS as soon as they are
//! written so a crash loses at most the row in flight.

use crate::record::Record;
use crate::rotation::RotationPolicy;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Leading header column holding the emission timestamp.
pub const TIME_COLUMN: &str = "time";

/// Upper bound on `-<n>` suffixes tried when a file name is taken.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("error opening {} for writing: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("error writing to {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("error closing {} during rotation: {source}", .path.display())]
    Rotation { path: PathBuf, source: io::Error },

    #[error("no free file name for {base} after {} attempts", MAX_NAME_ATTEMPTS)]
    NameExhausted { base: String },
}

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    opened_at: DateTime<Utc>,
}

impl OpenFile {
    fn finish(mut self) -> Result<PathBuf, (PathBuf, io::Error)> {
        match self.writer.flush() {
            Ok(()) => Ok(self.path),
            Err(e) => Err((self.path, e)),
        }
    }
}

/// Owns the current output file and rotates it on a fixed interval.
pub struct RotatingSink {
    dir: PathBuf,
    policy: RotationPolicy,
    file: Option<OpenFile>,
    files_opened: u64,
}

impl RotatingSink {
    /// Create a sink writing into `dir`. No file is opened until the first write.
    pub fn new(dir: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
            file: None,
            files_opened: 0,
        }
    }

    /// Persist one record as a row stamped with `emitted_at`.
    ///
    /// Rotates first if the current file is older than the rotation
    /// interval. A failed open leaves the sink without a file; the next call
    /// tries again.
    pub fn write_record(
        &mut self,
        record: &Record,
        emitted_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let due = self
            .file
            .as_ref()
            .is_some_and(|f| self.policy.is_due(f.opened_at, emitted_at));
        if due {
            self.rotate()?;
        }

        let file = match self.file.take() {
            Some(file) => file,
            None => self.open_file(record.required(), emitted_at)?,
        };
        let file = self.file.insert(file);

        let row = format_row(record, emitted_at);
        file.writer
            .write_all(row.as_bytes())
            .and_then(|()| file.writer.flush())
            .map_err(|source| SinkError::Write {
                path: file.path.clone(),
                source,
            })
    }

    /// Flush and release the current file, if any.
    pub fn close(&mut self) -> Result<(), SinkError> {
        if let Some(file) = self.file.take() {
            let path = file
                .finish()
                .map_err(|(path, source)| SinkError::Write { path, source })?;
            tracing::debug!("Closed {}", path.display());
        }
        Ok(())
    }

    /// Path of the currently open file.
    pub fn current_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Number of files opened so far.
    pub fn files_opened(&self) -> u64 {
        self.files_opened
    }

    fn rotate(&mut self) -> Result<(), SinkError> {
        if let Some(file) = self.file.take() {
            let path = file
                .finish()
                .map_err(|(path, source)| SinkError::Rotation { path, source })?;
            tracing::info!("Rotated out {}", path.display());
        }
        Ok(())
    }

    fn open_file(&mut self, columns: &[String], at: DateTime<Utc>) -> Result<OpenFile, SinkError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(self.policy.generate_filename(at, attempt));
            let file = match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(SinkError::Open { path, source }),
            };

            tracing::info!("Writing to {}", path.display());
            let mut writer = BufWriter::new(file);
            let header = header_row(columns);
            if let Err(source) = writer
                .write_all(header.as_bytes())
                .and_then(|()| writer.flush())
            {
                return Err(SinkError::Write { path, source });
            }

            self.files_opened += 1;
            return Ok(OpenFile {
                path,
                writer,
                opened_at: at,
            });
        }

        Err(SinkError::NameExhausted {
            base: self.policy.generate_filename(at, 0),
        })
    }
}

/// Header row: `time` followed by the column paths.
pub fn header_row(columns: &[String]) -> String {
    csv_line(std::iter::once(TIME_COLUMN).chain(columns.iter().map(String::as_str)))
}

/// Data row: RFC 3339 timestamp, then each required value with six decimals
/// or an empty field when missing.
pub fn format_row(record: &Record, emitted_at: DateTime<Utc>) -> String {
    let time = emitted_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let values: Vec<String> = record
        .columns()
        .map(|v| v.map(|v| format!("{:.6}", v)).unwrap_or_default())
        .collect();
    csv_line(std::iter::once(time.as_str()).chain(values.iter().map(String::as_str)))
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::new();
    for (i, field) in fields.enumerate() {
        if i > 0 {
            line.push(',');
        }
        push_csv_field(&mut line, field);
    }
    line.push('\n');
    line
}

fn push_csv_field(out: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\r', '\n']) || field.starts_with([' ', '\t']);
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(values: &[(&str, f64)]) -> Record {
        let mut rec = Record::new(vec!["a".into(), "b".into()]);
        for (path, value) in values {
            rec.merge(*path, *value);
        }
        rec
    }

    #[test]
    fn test_header_row() {
        assert_eq!(header_row(&["a".into(), "b".into()]), "time,a,b\n");
    }

    #[test]
    fn test_format_row_complete() {
        let rec = record(&[("a", 1.0), ("b", 2.0)]);
        let at = t0() + TimeDelta::milliseconds(10);
        assert_eq!(
            format_row(&rec, at),
            "2024-06-01T12:00:00.010Z,1.000000,2.000000\n"
        );
    }

    #[test]
    fn test_format_row_missing_field_is_empty() {
        let rec = record(&[("a", -0.5)]);
        assert_eq!(format_row(&rec, t0()), "2024-06-01T12:00:00.000Z,-0.500000,\n");
    }

    #[test]
    fn test_csv_quoting() {
        let columns = vec!["plain".to_string(), "with,comma".into(), "say \"hi\"".into()];
        assert_eq!(
            header_row(&columns),
            "time,plain,\"with,comma\",\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_first_write_creates_file_with_header() {
        let dir = tempdir().expect("tempdir");
        let mut sink = RotatingSink::new(dir.path(), RotationPolicy::default());
        assert!(sink.current_path().is_none());

        sink.write_record(&record(&[("a", 1.0), ("b", 2.0)]), t0())
            .expect("write");

        let path = sink.current_path().expect("open file").to_path_buf();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("signalk-2024-06-01T120000.log")
        );
        sink.close().expect("close");

        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            content,
            "time,a,b\n2024-06-01T12:00:00.000Z,1.000000,2.000000\n"
        );
    }

    #[test]
    fn test_header_written_once_per_file() {
        let dir = tempdir().expect("tempdir");
        let mut sink = RotatingSink::new(dir.path(), RotationPolicy::default());

        for i in 0..3 {
            sink.write_record(&record(&[("a", i as f64)]), t0() + TimeDelta::seconds(i))
                .expect("write");
        }
        let path = sink.current_path().expect("open file").to_path_buf();
        sink.close().expect("close");

        let content = std::fs::read_to_string(path).expect("read");
        assert_eq!(content.lines().filter(|l| l.starts_with("time,")).count(), 1);
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_rows_visible_before_close() {
        let dir = tempdir().expect("tempdir");
        let mut sink = RotatingSink::new(dir.path(), RotationPolicy::default());
        sink.write_record(&record(&[("a", 1.0)]), t0()).expect("write");

        let path = sink.current_path().expect("open file");
        let content = std::fs::read_to_string(path).expect("read");
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_rotation_opens_new_file() {
        let dir = tempdir().expect("tempdir");
        let mut sink =
            RotatingSink::new(dir.path(), RotationPolicy::every(TimeDelta::minutes(5)));

        sink.write_record(&record(&[("a", 1.0)]), t0()).expect("write");
        let first = sink.current_path().expect("open").to_path_buf();

        // Exactly at the interval: same file
        sink.write_record(&record(&[("a", 2.0)]), t0() + TimeDelta::minutes(5))
            .expect("write");
        assert_eq!(sink.current_path(), Some(first.as_path()));

        let later = t0() + TimeDelta::minutes(5) + TimeDelta::milliseconds(1);
        sink.write_record(&record(&[("a", 3.0)]), later).expect("write");
        let second = sink.current_path().expect("open").to_path_buf();
        assert_ne!(first, second);
        assert_eq!(sink.files_opened(), 2);
        sink.close().expect("close");

        let old = std::fs::read_to_string(&first).expect("read");
        assert_eq!(old.lines().count(), 3);
        let new = std::fs::read_to_string(&second).expect("read");
        assert_eq!(new.lines().next(), Some("time,a,b"));
        assert_eq!(new.lines().count(), 2);
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("signalk-2024-06-01T120000.log"), "existing\n")
            .expect("seed");

        let mut sink = RotatingSink::new(dir.path(), RotationPolicy::default());
        sink.write_record(&record(&[("a", 1.0)]), t0()).expect("write");
        let path = sink.current_path().expect("open").to_path_buf();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("signalk-2024-06-01T120000-1.log")
        );

        let untouched =
            std::fs::read_to_string(dir.path().join("signalk-2024-06-01T120000.log")).expect("read");
        assert_eq!(untouched, "existing\n");
    }

    #[test]
    fn test_open_failure_leaves_sink_closed() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("does-not-exist");
        let mut sink = RotatingSink::new(&missing, RotationPolicy::default());

        let err = sink
            .write_record(&record(&[("a", 1.0)]), t0())
            .expect_err("directory is missing");
        assert!(matches!(err, SinkError::Open { .. }));
        assert!(sink.current_path().is_none());

        // Retries on the next write once the directory exists
        std::fs::create_dir_all(&missing).expect("mkdir");
        sink.write_record(&record(&[("a", 1.0)]), t0() + TimeDelta::seconds(1))
            .expect("write");
        assert!(sink.current_path().is_some());
    }

    #[test]
    fn test_open_failure_after_rotation_recovers() {
        let dir = tempdir().expect("tempdir");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).expect("mkdir");
        let mut sink = RotatingSink::new(&out, RotationPolicy::every(TimeDelta::minutes(5)));

        sink.write_record(&record(&[("a", 1.0)]), t0()).expect("write");
        assert!(sink.current_path().is_some());

        // Rotation closes the old file, then the new one cannot be created
        std::fs::remove_dir_all(&out).expect("rmdir");
        let due = t0() + TimeDelta::minutes(5) + TimeDelta::seconds(1);
        let err = sink
            .write_record(&record(&[("a", 2.0)]), due)
            .expect_err("directory is gone");
        assert!(matches!(err, SinkError::Open { .. }));
        assert!(sink.current_path().is_none());
        assert_eq!(sink.files_opened(), 1);

        std::fs::create_dir_all(&out).expect("mkdir");
        let retry = due + TimeDelta::seconds(1);
        sink.write_record(&record(&[("a", 3.0)]), retry).expect("write");
        let path = sink.current_path().expect("open").to_path_buf();
        assert_eq!(sink.files_opened(), 2);
        sink.close().expect("close");

        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(content.lines().next(), Some("time,a,b"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let mut sink = RotatingSink::new(dir.path(), RotationPolicy::default());
        sink.close().expect("close without file");
        sink.write_record(&record(&[("a", 1.0)]), t0()).expect("write");
        sink.close().expect("close");
        sink.close().expect("close again");
        assert!(sink.current_path().is_none());
    }
}
