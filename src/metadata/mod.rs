// Metadata store
// Maps index slots back to the text and source record they were built from


use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info};

use crate::artifacts::write_atomic;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata slot {found} out of order, expected slot {expected}")]
    IndexMetadataMismatch { expected: usize, found: usize },

    #[error("Slot {slot} not found, store holds {count} entries")]
    SlotNotFound { slot: usize, count: usize },

    #[error("Failed to persist metadata at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt metadata file {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// One indexed record: its slot, the encoded text and the full source row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub slot: usize,
    pub text: String,
    pub source: Map<String, JsonValue>,
}

/// Slot-ordered metadata, persisted as JSON Lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    entries: Vec<MetadataEntry>,
}

impl MetadataStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append an entry. Slots must arrive as 0, 1, 2, ... with no gaps or repeats.
    #[inline]
    pub fn record(
        &mut self,
        slot: usize,
        text: impl Into<String>,
        source: Map<String, JsonValue>,
    ) -> Result<(), MetadataError> {
        self.push(MetadataEntry {
            slot,
            text: text.into(),
            source,
        })
    }

    fn push(&mut self, entry: MetadataEntry) -> Result<(), MetadataError> {
        let expected = self.entries.len();
        if entry.slot != expected {
            return Err(MetadataError::IndexMetadataMismatch {
                expected,
                found: entry.slot,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    #[inline]
    pub fn lookup(&self, slot: usize) -> Result<&MetadataEntry, MetadataError> {
        self.entries.get(slot).ok_or(MetadataError::SlotNotFound {
            slot,
            count: self.entries.len(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries.iter()
    }

    /// Write one JSON object per line, replacing any existing file atomically
    #[inline]
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), MetadataError> {
        let path = path.as_ref();

        write_atomic(path, |writer| {
            for entry in &self.entries {
                serde_json::to_writer(&mut *writer, entry)?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })
        .map_err(|source| MetadataError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Persisted {} metadata entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let persistence_error = |source| MetadataError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let file = std::fs::File::open(path).map_err(persistence_error)?;
        let mut store = Self::new();

        for (line_index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(persistence_error)?;
            if line.trim().is_empty() {
                continue;
            }

            let entry: MetadataEntry =
                serde_json::from_str(&line).map_err(|e| MetadataError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_index + 1,
                    reason: e.to_string(),
                })?;
            store.push(entry)?;
        }

        debug!(
            "Loaded {} metadata entries from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }
}
