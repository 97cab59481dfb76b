// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Composite vessel state accumulated between flushes.

use std::collections::HashMap;
use std::sync::Arc;

/// Latest value per field path, plus the session's required columns.
///
/// Values are last-write-wins within a flush cycle. The required paths are
/// fixed for the lifetime of the record and define the output column order.
#[derive(Debug, Clone)]
pub struct Record {
    values: HashMap<String, f64>,
    required: Arc<[String]>,
}

impl Record {
    /// Create an empty record for the given required paths.
    pub fn new(required: Vec<String>) -> Self {
        Self {
            values: HashMap::new(),
            required: required.into(),
        }
    }

    /// Store `value` for `path`, replacing any earlier value.
    pub fn merge(&mut self, path: impl Into<String>, value: f64) {
        self.values.insert(path.into(), value);
    }

    /// Check if every required path has a value.
    pub fn is_complete(&self) -> bool {
        self.required.iter().all(|p| self.values.contains_key(p))
    }

    /// Required paths still missing a value, in column order.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .filter(|p| !self.values.contains_key(p.as_str()))
            .map(String::as_str)
    }

    /// Drop all values. The required paths are kept.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Stored value for `path`.
    pub fn get(&self, path: &str) -> Option<f64> {
        self.values.get(path).copied()
    }

    /// Required paths in column order.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Values for each required path in column order.
    pub fn columns(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.required.iter().map(|p| self.get(p))
    }

    /// Number of stored values, required or not.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
