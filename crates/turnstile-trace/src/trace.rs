//! The append-only record of scheduling decisions for one run.
//!
//! A [`TraceLog`] holds one [`TraceEntry`] per scheduling point, in the
//! order the points were reached. Feeding the same log back through the
//! replay strategy reproduces the run exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Kind of scheduling point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Which enabled machine runs next. Value: machine id.
    Schedule,
    /// Nondeterministic boolean. Value: 0 or 1.
    Bool,
    /// Nondeterministic integer in `0..bound`. Value: the integer.
    Integer,
    /// Machine creation. Value: id of the new machine.
    Create,
    /// Machine halted. Value: its id.
    Completed,
}

impl PointKind {
    pub fn label(self) -> &'static str {
        match self {
            PointKind::Schedule => "schedule",
            PointKind::Bool => "bool",
            PointKind::Integer => "integer",
            PointKind::Create => "create",
            PointKind::Completed => "completed",
        }
    }

    /// Points whose value is chosen by a strategy rather than forced by
    /// the program.
    pub fn is_choice(self) -> bool {
        matches!(self, PointKind::Schedule | PointKind::Bool | PointKind::Integer)
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One decision: what kind of point, and the value taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: PointKind,
    pub value: u64,
}

impl TraceEntry {
    pub fn new(kind: PointKind, value: u64) -> Self {
        Self { kind, value }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PointKind::Schedule | PointKind::Create | PointKind::Completed => {
                write!(f, "{:<9} m{}", self.kind.label(), self.value)
            }
            PointKind::Bool => write!(f, "{:<9} {}", self.kind.label(), self.value != 0),
            PointKind::Integer => write!(f, "{:<9} {}", self.kind.label(), self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<TraceEntry>) -> Self {
        Self { entries }
    }

    pub fn record(&mut self, kind: PointKind, value: u64) {
        self.entries.push(TraceEntry { kind, value });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TraceEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// Count of entries per point kind.
    pub fn summary(&self) -> BTreeMap<PointKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> Result<String, SerializeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SerializeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SerializeError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SerializeError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl<'a> IntoIterator for &'a TraceLog {
    type Item = &'a TraceEntry;
    type IntoIter = std::slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> TraceLog {
        let mut log = TraceLog::new();
        log.record(PointKind::Create, 0);
        log.record(PointKind::Schedule, 0);
        log.record(PointKind::Bool, 1);
        log.record(PointKind::Integer, 4);
        log.record(PointKind::Schedule, 0);
        log.record(PointKind::Completed, 0);
        log
    }

    #[test]
    fn records_in_order() {
        let log = sample();
        assert_eq!(log.len(), 6);
        assert_eq!(log.get(0), Some(&TraceEntry::new(PointKind::Create, 0)));
        assert_eq!(log.get(3), Some(&TraceEntry::new(PointKind::Integer, 4)));
        assert!(log.get(6).is_none());
    }

    #[test]
    fn summary_counts_kinds() {
        let summary = sample().summary();
        assert_eq!(summary[&PointKind::Schedule], 2);
        assert_eq!(summary[&PointKind::Create], 1);
        assert_eq!(summary.get(&PointKind::Bool), Some(&1));
    }

    #[test]
    fn save_and_load_preserve_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.json");
        let log = sample();
        log.save(&path).unwrap();
        assert_eq!(TraceLog::load(&path).unwrap(), log);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = TraceLog::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SerializeError::Io(_)));
    }

    #[test]
    fn kinds_serialize_in_snake_case() {
        let json = serde_json::to_string(&TraceEntry::new(PointKind::Completed, 3)).unwrap();
        assert_eq!(json, r#"{"kind":"completed","value":3}"#);
    }

    #[test]
    fn entry_display() {
        assert_eq!(TraceEntry::new(PointKind::Bool, 1).to_string(), "bool      true");
        assert_eq!(TraceEntry::new(PointKind::Schedule, 2).to_string(), "schedule  m2");
    }
}
