// src/storage/checkpoint.rs
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::StorageError;

/// Earlier versions wrote the no-report set under a year-specific key.
const LEGACY_NO_REPORT_KEY: &str = "skipped_no_2024_report";

/// Terminal outcome recorded for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointState {
    Completed,
    SkippedNoReport,
    FailedBusinessContent,
    SkippedLookupError,
}

impl CheckpointState {
    /// Precedence used when a loaded file lists an identifier in several sets.
    pub const PRECEDENCE: [CheckpointState; 4] = [
        CheckpointState::Completed,
        CheckpointState::SkippedLookupError,
        CheckpointState::SkippedNoReport,
        CheckpointState::FailedBusinessContent,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            CheckpointState::Completed => "completed",
            CheckpointState::SkippedNoReport => "skipped_no_report",
            CheckpointState::FailedBusinessContent => "failed_business_content",
            CheckpointState::SkippedLookupError => "skipped_lookup_error",
        }
    }

    /// Resolved states are never revisited. Extraction failures are retried every run.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, CheckpointState::FailedBusinessContent)
    }
}

/// Four disjoint identifier sets. Fields are declared in key order so the
/// serialized object has sorted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    completed: BTreeSet<String>,
    failed_business_content: BTreeSet<String>,
    skipped_lookup_error: BTreeSet<String>,
    skipped_no_report: BTreeSet<String>,
}

impl CheckpointRecord {
    pub fn set(&self, state: CheckpointState) -> &BTreeSet<String> {
        match state {
            CheckpointState::Completed => &self.completed,
            CheckpointState::SkippedNoReport => &self.skipped_no_report,
            CheckpointState::FailedBusinessContent => &self.failed_business_content,
            CheckpointState::SkippedLookupError => &self.skipped_lookup_error,
        }
    }

    fn set_mut(&mut self, state: CheckpointState) -> &mut BTreeSet<String> {
        match state {
            CheckpointState::Completed => &mut self.completed,
            CheckpointState::SkippedNoReport => &mut self.skipped_no_report,
            CheckpointState::FailedBusinessContent => &mut self.failed_business_content,
            CheckpointState::SkippedLookupError => &mut self.skipped_lookup_error,
        }
    }

    pub fn state_of(&self, code: &str) -> Option<CheckpointState> {
        CheckpointState::PRECEDENCE
            .into_iter()
            .find(|state| self.set(*state).contains(code))
    }

    pub fn is_resolved(&self, code: &str) -> bool {
        self.state_of(code).map(|s| s.is_resolved()).unwrap_or(false)
    }

    /// Moves `code` into `state`, removing it from every other set.
    pub fn mark(&mut self, code: &str, state: CheckpointState) {
        for other in CheckpointState::PRECEDENCE {
            if other != state {
                self.set_mut(other).remove(code);
            }
        }
        self.set_mut(state).insert(code.to_string());
    }

    pub fn clear(&mut self, state: CheckpointState) -> usize {
        let set = self.set_mut(state);
        let cleared = set.len();
        set.clear();
        cleared
    }

    pub fn len(&self, state: CheckpointState) -> usize {
        self.set(state).len()
    }

    /// Builds a record from a parsed checkpoint document, repairing what it can:
    /// missing or non-list keys become empty sets, non-string items are dropped,
    /// and duplicates across sets keep only the highest-precedence state.
    fn from_value(value: &serde_json::Value) -> Result<Self, StorageError> {
        let object = value
            .as_object()
            .ok_or_else(|| StorageError::InvalidCheckpoint("top level is not an object".to_string()))?;

        let read = |key: &str| -> Vec<String> {
            object
                .get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str())
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut record = Self::default();
        for state in CheckpointState::PRECEDENCE {
            let mut codes = read(state.key());
            if state == CheckpointState::SkippedNoReport {
                codes.extend(read(LEGACY_NO_REPORT_KEY));
            }
            for code in codes {
                if record.state_of(&code).is_none() {
                    record.set_mut(state).insert(code);
                }
            }
        }
        Ok(record)
    }
}

/// JSON file holding the [`CheckpointRecord`] between runs.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, or an empty one if no checkpoint exists yet.
    pub fn load(&self) -> Result<CheckpointRecord, StorageError> {
        if !self.path.exists() {
            tracing::info!("No checkpoint at {}, starting fresh", self.path.display());
            return Ok(CheckpointRecord::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| StorageError::InvalidCheckpoint(format!("{}: {}", self.path.display(), e)))?;
        CheckpointRecord::from_value(&value)
    }

    /// Overwrites the checkpoint with `record`. The new content is written to a
    /// sibling temp file and renamed over the old one.
    pub fn save(&self, record: &CheckpointRecord) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
