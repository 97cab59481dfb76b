// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SignalK delta decoding.
//!
//! Flattens delta messages into scalar [`Update`]s:
//! - numeric values map to one update
//! - object values map to one update per numeric member (`path.member`)
//! - strings, booleans, arrays and nulls are skipped
//!
//! [`LineBuffer`] frames the newline-delimited stream the deltas arrive on.

use crate::update::Update;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};

/// A SignalK delta message. Server hello messages decode with no updates.
#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub updates: Vec<DeltaUpdate>,
}

/// One update block inside a delta.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaUpdate {
    #[serde(rename = "$source", default)]
    pub source_ref: Option<String>,

    #[serde(default)]
    pub source: Option<DeltaSource>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub values: Vec<PathValue>,
}

/// Source description attached to an update.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaSource {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub src: Option<String>,
}

/// A single path/value pair.
#[derive(Debug, Clone, Deserialize)]
pub struct PathValue {
    pub path: String,

    #[serde(default)]
    pub value: serde_json::Value,
}

impl DeltaUpdate {
    /// Source identifier used for exclusion matching.
    pub fn source_id(&self) -> String {
        if let Some(ref source_ref) = self.source_ref {
            return source_ref.clone();
        }
        match &self.source {
            Some(DeltaSource {
                label: Some(label),
                src: Some(src),
            }) => format!("{}.{}", label, src),
            Some(DeltaSource {
                label: Some(label), ..
            }) => label.clone(),
            _ => String::new(),
        }
    }
}

impl Delta {
    /// Flatten into scalar updates, in message order.
    pub fn into_updates(self) -> Vec<Update> {
        let mut out = Vec::new();

        for update in self.updates {
            let Some(timestamp) = update.timestamp else {
                tracing::warn!(
                    "Ignoring update without timestamp ({} values)",
                    update.values.len()
                );
                continue;
            };
            let source = update.source_id();

            for PathValue { path, value } in update.values {
                match value {
                    serde_json::Value::Number(n) => match n.as_f64() {
                        Some(v) => out.push(Update::new(timestamp, source.clone(), path, v)),
                        None => tracing::debug!("Ignoring unrepresentable number: {}={}", path, n),
                    },
                    serde_json::Value::Object(members) => {
                        for (key, member) in members {
                            match member.as_f64() {
                                Some(v) => out.push(
                                    Update::new(
                                        timestamp,
                                        source.clone(),
                                        format!("{}.{}", path, key),
                                        v,
                                    )
                                    .with_parent(path.as_str()),
                                ),
                                None => tracing::debug!(
                                    "Ignoring unknown map value: {}.{}={}",
                                    path,
                                    key,
                                    member
                                ),
                            }
                        }
                    }
                    other => tracing::debug!("Ignoring non-numeric value: {}={}", path, other),
                }
            }
        }

        out
    }
}

/// Decode one delta document into scalar updates.
pub fn decode_delta(line: &str) -> Result<Vec<Update>, serde_json::Error> {
    let delta: Delta = serde_json::from_str(line)?;
    Ok(delta.into_updates())
}

/// Subscription request sent to the server after connecting.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub context: String,
    pub subscribe: Vec<SubscribedPath>,
}

/// One subscribed path.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribedPath {
    pub path: String,
    pub period: u64,
}

impl Subscription {
    /// Subscribe to `paths` on the own vessel.
    pub fn for_paths<I, S>(paths: I, period_ms: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            context: "vessels.self".to_string(),
            subscribe: paths
                .into_iter()
                .map(|path| SubscribedPath {
                    path: path.into(),
                    period: period_ms,
                })
                .collect(),
        }
    }

    /// Serialize as a single JSON line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Result of one [`LineBuffer::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, without the trailing newline.
    Line(String),
    /// Input ended in the middle of a line; the bytes are kept.
    Pending,
    /// No more input.
    Eof,
}

/// Newline-delimited reader state that survives read timeouts.
///
/// Bytes are buffered raw and only decoded once the newline arrives, so a
/// timeout inside a multi-byte character loses nothing.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read until the next newline.
    ///
    /// On error (including `WouldBlock`/`TimedOut`) the bytes read so far are
    /// kept for the next call.
    pub fn read_line<R: BufRead>(&mut self, reader: &mut R) -> io::Result<LineRead> {
        if reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(LineRead::Eof);
        }
        if !self.buf.ends_with(b"\n") {
            return Ok(LineRead::Pending);
        }

        let line = String::from_utf8_lossy(&self.buf).trim_end().to_string();
        self.buf.clear();
        Ok(LineRead::Line(line))
    }

    /// Number of buffered bytes of an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::io::{BufReader, Read};

    /// Replays byte chunks, with `None` standing for a read timeout.
    struct ChunkedReader {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    out[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8_across_timeout() {
        let text = "{\"path\":\"wind \u{00b0}\"}\n";
        let bytes = text.as_bytes();
        let split = text.find('\u{00b0}').expect("degree sign") + 1;

        let mut reader = BufReader::new(ChunkedReader {
            chunks: VecDeque::from(vec![
                Some(bytes[..split].to_vec()),
                None,
                Some(bytes[split..].to_vec()),
            ]),
        });
        let mut lines = LineBuffer::new();

        let err = lines.read_line(&mut reader).expect_err("timeout");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(lines.pending_len(), split);

        assert_eq!(
            lines.read_line(&mut reader).expect("read"),
            LineRead::Line(text.trim_end().to_string())
        );
        assert_eq!(lines.pending_len(), 0);
        assert_eq!(lines.read_line(&mut reader).expect("read"), LineRead::Eof);
    }

    #[test]
    fn test_line_buffer_partial_line_at_eof() {
        let mut reader = io::Cursor::new(b"first\nsecond".to_vec());
        let mut lines = LineBuffer::new();
        assert_eq!(
            lines.read_line(&mut reader).expect("read"),
            LineRead::Line("first".to_string())
        );
        assert_eq!(lines.read_line(&mut reader).expect("read"), LineRead::Pending);
        assert_eq!(lines.read_line(&mut reader).expect("read"), LineRead::Eof);
    }

    #[test]
    fn test_decode_numeric_value() {
        let line = r#"{
            "context": "vessels.urn:mrn:imo:mmsi:230099999",
            "updates": [{
                "source": {"label": "can0", "type": "NMEA2000", "pgn": 130306, "src": "15"},
                "$source": "can0.15",
                "timestamp": "2024-06-01T12:00:00.000Z",
                "values": [{"path": "environment.wind.angleApparent", "value": 0.52}]
            }]
        }"#;
        let updates = decode_delta(line).expect("decode");
        assert_eq!(
            updates,
            vec![Update::new(
                Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
                "can0.15",
                "environment.wind.angleApparent",
                0.52
            )]
        );
    }

    #[test]
    fn test_decode_object_value_is_flattened() {
        let line = r#"{"updates": [{
            "$source": "can0.85",
            "timestamp": "2024-06-01T12:00:00Z",
            "values": [{"path": "navigation.position",
                        "value": {"latitude": 60.15, "longitude": 24.95, "name": "x"}}]
        }]}"#;
        let mut updates = decode_delta(line).expect("decode");
        updates.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].path, "navigation.position.latitude");
        assert_eq!(updates[0].value, 60.15);
        assert_eq!(updates[1].path, "navigation.position.longitude");
        assert_eq!(updates[1].source, "can0.85");
        assert!(updates
            .iter()
            .all(|u| u.parent.as_deref() == Some("navigation.position")));
    }

    #[test]
    fn test_non_numeric_values_are_skipped() {
        let line = r#"{"updates": [{
            "$source": "gps",
            "timestamp": "2024-06-01T12:00:00Z",
            "values": [
                {"path": "navigation.datetime", "value": "2024-06-01T12:00:00Z"},
                {"path": "navigation.state", "value": null},
                {"path": "notifications.x", "value": true},
                {"path": "navigation.rateOfTurn", "value": -0.01}
            ]
        }]}"#;
        let updates = decode_delta(line).expect("decode");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].path, "navigation.rateOfTurn");
    }

    #[test]
    fn test_hello_message_has_no_updates() {
        let hello = r#"{"name":"signalk-server","version":"2.5.0","self":"vessels.urn:mrn:imo:mmsi:230099999","roles":["master","main"],"timestamp":"2024-06-01T12:00:00.000Z"}"#;
        assert!(decode_delta(hello).expect("decode").is_empty());
    }

    #[test]
    fn test_update_without_timestamp_is_skipped() {
        let line = r#"{"updates": [{"$source": "a", "values": [{"path": "p", "value": 1}]}]}"#;
        assert!(decode_delta(line).expect("decode").is_empty());
    }

    #[test]
    fn test_source_id_fallback() {
        let line = r#"{"updates": [{
            "source": {"label": "can0", "src": "20"},
            "timestamp": "2024-06-01T12:00:00Z",
            "values": [{"path": "p", "value": 1}]
        }]}"#;
        let updates = decode_delta(line).expect("decode");
        assert_eq!(updates[0].source, "can0.20");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(decode_delta("{not json").is_err());
    }

    #[test]
    fn test_subscription_message() {
        let sub = Subscription::for_paths(["navigation.position"], 1000);
        assert_eq!(
            sub.to_json_line().expect("serialize"),
            "{\"context\":\"vessels.self\",\"subscribe\":[{\"path\":\"navigation.position\",\"period\":1000}]}\n"
        );
    }
}
