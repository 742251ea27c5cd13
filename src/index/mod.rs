// Vector index
// Exact nearest-neighbour search over a flat, contiguous vector store


use std::cmp::Ordering;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::artifacts::write_atomic;

/// File signature of a persisted index
pub const INDEX_MAGIC: &[u8; 4] = b"DSVI";
pub const INDEX_FORMAT_VERSION: u32 = 1;
/// magic + version + dimension + count
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Cannot build an index from zero vectors")]
    EmptyIndex,

    #[error("Vector dimension must be greater than zero")]
    InvalidDimension,

    #[error("Vector at slot {slot} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        slot: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Query has dimension {actual}, index dimension is {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },

    #[error("Vector at slot {slot} has a non-finite value at component {component}")]
    InvalidValue { slot: usize, component: usize },

    #[error("Failed to persist index at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt index file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// One search result: slot in the index and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub slot: usize,
    pub distance: f32,
}

/// Flat index over vectors of one fixed dimension.
///
/// Slots are assigned in insertion order, `0..len`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build a fresh index holding exactly `vectors`, in order.
    ///
    /// The first vector fixes the dimension; any other length is an error.
    #[inline]
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimension = vectors.first().ok_or(IndexError::EmptyIndex)?.len();
        if dimension == 0 {
            return Err(IndexError::InvalidDimension);
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (slot, vector) in vectors.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    slot,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if let Some(component) = vector.iter().position(|value| !value.is_finite()) {
                return Err(IndexError::InvalidValue { slot, component });
            }
            data.extend(vector);
        }

        let index = Self { dimension, data };
        debug!(
            "Built flat index with {} vectors of dimension {}",
            index.len(),
            dimension
        );
        Ok(index)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn vector(&self, slot: usize) -> Option<&[f32]> {
        let start = slot.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// The `k` nearest vectors by squared Euclidean distance.
    ///
    /// Ordered by distance, then by slot. Asking for more than `len()`
    /// results returns all of them.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(slot, vector)| SearchHit {
                slot,
                distance: squared_euclidean(query, vector),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k, compare_hits);
            hits.truncate(k);
        }
        hits.sort_unstable_by(compare_hits);

        Ok(hits)
    }

    /// Write the index to `path`, replacing any existing file atomically
    #[inline]
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexError> {
        let path = path.as_ref();
        let persistence_error = |source| IndexError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let dimension = u32::try_from(self.dimension).map_err(|_| {
            persistence_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "dimension does not fit in u32",
            ))
        })?;

        write_atomic(path, |writer| {
            writer.write_all(INDEX_MAGIC)?;
            writer.write_all(&INDEX_FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&dimension.to_le_bytes())?;
            writer.write_all(&(self.len() as u64).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            Ok(())
        })
        .map_err(persistence_error)?;

        info!(
            "Persisted index with {} vectors to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| IndexError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;

        let index = Self::from_bytes(&bytes).map_err(|reason| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason,
        })?;

        debug!(
            "Loaded index with {} vectors of dimension {} from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("file is {} bytes, shorter than header", bytes.len()));
        }

        let (header, payload) = bytes.split_at(HEADER_LEN);
        if &header[0..4] != INDEX_MAGIC {
            return Err("missing index file signature".to_string());
        }

        let version = u32::from_le_bytes(read_array(&header[4..8])?);
        if version != INDEX_FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }

        let dimension = u32::from_le_bytes(read_array(&header[8..12])?) as usize;
        let count = usize::try_from(u64::from_le_bytes(read_array(&header[12..20])?))
            .map_err(|_| "vector count does not fit in memory".to_string())?;

        if dimension == 0 {
            return Err("dimension is zero".to_string());
        }
        if count == 0 {
            return Err("index holds no vectors".to_string());
        }

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| "vector payload size overflows".to_string())?;
        if payload.len() != expected_len {
            return Err(format!(
                "expected {} payload bytes for {} vectors, found {}",
                expected_len,
                count,
                payload.len()
            ));
        }

        let mut data = Vec::with_capacity(count * dimension);
        for (position, chunk) in payload.chunks_exact(4).enumerate() {
            let value = f32::from_le_bytes(read_array(chunk)?);
            if !value.is_finite() {
                return Err(format!(
                    "non-finite value at slot {} component {}",
                    position / dimension,
                    position % dimension
                ));
            }
            data.push(value);
        }

        Ok(Self { dimension, data })
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], String> {
    bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes, found {}", N, bytes.len()))
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.slot.cmp(&b.slot))
}

#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
