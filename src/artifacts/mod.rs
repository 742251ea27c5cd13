// Artifact store
// Versioned generations of (index, metadata) pairs behind an atomically swapped pointer

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::{IndexError, VectorIndex};
use crate::metadata::{MetadataError, MetadataStore};

pub const CURRENT_POINTER: &str = "CURRENT";
pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.jsonl";
const LOCK_FILE: &str = ".commit.lock";
const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(60);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Index holds {index_count} vectors but metadata holds {metadata_count} entries")]
    CountMismatch {
        index_count: usize,
        metadata_count: usize,
    },

    #[error("No artifacts have been written under {0}")]
    NoArtifacts(PathBuf),

    #[error("Invalid generation pointer: {0:?}")]
    InvalidPointer(String),

    #[error("Timed out waiting for commit lock {0}")]
    LockTimeout(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a file through a sibling temporary file and a rename, so readers
/// see either the old content or the complete new content.
#[inline]
pub fn write_atomic<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    ));

    let result = (|| {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        write(&mut writer)?;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Where one generation of artifacts lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLocations {
    pub generation: String,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// The current generation, loaded
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub locations: ArtifactLocations,
    pub index: VectorIndex,
    pub metadata: MetadataStore,
}

/// Consistency check results between the index and metadata of one generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub generation: String,
    pub index_vectors: usize,
    pub metadata_entries: usize,
    pub dimension: usize,
    /// Index slots with no metadata entry
    pub missing_in_metadata: Vec<usize>,
    /// Metadata slots with no index vector
    pub orphaned_in_metadata: Vec<usize>,
    pub is_consistent: bool,
}

/// Persists index and metadata together under a root directory.
///
/// Every commit writes a new `gen-*` directory and then swaps the `CURRENT`
/// pointer file, so a reader always resolves a matching pair. Commits are
/// serialized through a lock file.
///
/// Only the current and the previous generation survive a commit. A reader
/// still holding an older generation can lose it to pruning; `load` and
/// `verify` then retry once against the new `CURRENT`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    lock_timeout: Duration,
    lock_stale_after: Duration,
}

impl ArtifactStore {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
        }
    }

    #[inline]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[inline]
    pub fn with_lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.lock_stale_after = stale_after;
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a new generation and make it current.
    ///
    /// Nothing visible changes unless both files were written completely.
    #[inline]
    pub fn commit(
        &self,
        index: &VectorIndex,
        metadata: &MetadataStore,
    ) -> Result<ArtifactLocations, ArtifactError> {
        if index.len() != metadata.len() {
            return Err(ArtifactError::CountMismatch {
                index_count: index.len(),
                metadata_count: metadata.len(),
            });
        }

        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let _lock = CommitLock::acquire(
            self.root.join(LOCK_FILE),
            self.lock_timeout,
            self.lock_stale_after,
        )?;
        let previous = self.current_generation()?;

        let staging = self
            .root
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));
        if let Err(e) = Self::write_generation(&staging, index, metadata) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let generation = format!(
            "{}{:013}-{}",
            GENERATION_PREFIX,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let generation_dir = self.root.join(&generation);
        if let Err(source) = fs::rename(&staging, &generation_dir) {
            let _ = fs::remove_dir_all(&staging);
            return Err(ArtifactError::Io {
                path: generation_dir,
                source,
            });
        }

        let pointer = self.root.join(CURRENT_POINTER);
        write_atomic(&pointer, |writer| writeln!(writer, "{generation}"))
            .map_err(io_error(&pointer))?;

        info!(
            "Committed artifact generation {} ({} vectors)",
            generation,
            index.len()
        );

        self.prune(&generation, previous.as_deref());

        Ok(self.locations(generation))
    }

    fn write_generation(
        dir: &Path,
        index: &VectorIndex,
        metadata: &MetadataStore,
    ) -> Result<(), ArtifactError> {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
        index.persist(dir.join(INDEX_FILE))?;
        metadata.persist(dir.join(METADATA_FILE))?;
        Ok(())
    }

    /// Remove generations other than the current one and the one it replaced,
    /// plus staging directories left behind by interrupted commits
    fn prune(&self, current: &str, previous: Option<&str>) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not list {} for pruning: {}", self.root.display(), e);
                return;
            }
        };

        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_generation = name.starts_with(GENERATION_PREFIX);
            let is_staging = name.starts_with(STAGING_PREFIX);
            if !(is_generation || is_staging) || name == current || Some(name.as_str()) == previous
            {
                continue;
            }

            match fs::remove_dir_all(entry.path()) {
                Ok(()) => debug!("Pruned artifact directory {}", name),
                Err(e) => warn!("Failed to prune artifact directory {}: {}", name, e),
            }
        }
    }

    fn locations(&self, generation: String) -> ArtifactLocations {
        let dir = self.root.join(&generation);
        ArtifactLocations {
            index_path: dir.join(INDEX_FILE),
            metadata_path: dir.join(METADATA_FILE),
            generation,
        }
    }

    fn current_generation(&self) -> Result<Option<String>, ArtifactError> {
        let pointer = self.root.join(CURRENT_POINTER);
        let content = match fs::read_to_string(&pointer) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: pointer,
                    source,
                });
            }
        };

        let generation = content.trim();
        let valid = generation.starts_with(GENERATION_PREFIX)
            && generation
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ArtifactError::InvalidPointer(generation.to_string()));
        }

        Ok(Some(generation.to_string()))
    }

    /// Locations of the current generation, if any commit has happened
    #[inline]
    pub fn current(&self) -> Result<Option<ArtifactLocations>, ArtifactError> {
        Ok(self.current_generation()?.map(|g| self.locations(g)))
    }

    /// Read the current generation with `read`.
    ///
    /// If the read fails and `CURRENT` has moved on meanwhile, the generation
    /// may have been pruned mid-read; the new current generation is read once.
    fn read_current<T, F>(&self, mut read: F) -> Result<T, ArtifactError>
    where
        F: FnMut(&ArtifactLocations) -> Result<T, ArtifactError>,
    {
        let locations = self
            .current()?
            .ok_or_else(|| ArtifactError::NoArtifacts(self.root.clone()))?;

        match read(&locations) {
            Ok(value) => Ok(value),
            Err(e) => match self.current()? {
                Some(latest) if latest.generation != locations.generation => {
                    warn!(
                        "Generation {} was replaced by {} while reading ({}), retrying",
                        locations.generation, latest.generation, e
                    );
                    read(&latest)
                }
                _ => Err(e),
            },
        }
    }

    fn read_pair(
        locations: &ArtifactLocations,
    ) -> Result<(VectorIndex, MetadataStore), ArtifactError> {
        let index = VectorIndex::load(&locations.index_path)?;
        let metadata = MetadataStore::load(&locations.metadata_path)?;
        Ok((index, metadata))
    }

    /// Load the current generation and check that index and metadata agree
    #[inline]
    pub fn load(&self) -> Result<LoadedArtifacts, ArtifactError> {
        self.read_current(|locations| {
            let (index, metadata) = Self::read_pair(locations)?;
            if index.len() != metadata.len() {
                return Err(ArtifactError::CountMismatch {
                    index_count: index.len(),
                    metadata_count: metadata.len(),
                });
            }

            Ok(LoadedArtifacts {
                locations: locations.clone(),
                index,
                metadata,
            })
        })
    }

    /// Compare the current index against its metadata slot by slot
    #[inline]
    pub fn verify(&self) -> Result<ConsistencyReport, ArtifactError> {
        let (locations, index, metadata) = self.read_current(|locations| {
            let (index, metadata) = Self::read_pair(locations)?;
            Ok((locations.clone(), index, metadata))
        })?;

        let missing_in_metadata: Vec<usize> = (0..index.len())
            .filter(|&slot| metadata.lookup(slot).is_err())
            .collect();
        let orphaned_in_metadata: Vec<usize> = metadata
            .iter()
            .map(|entry| entry.slot)
            .filter(|&slot| index.vector(slot).is_none())
            .collect();

        let is_consistent = missing_in_metadata.is_empty() && orphaned_in_metadata.is_empty();
        if is_consistent {
            info!("Artifact generation {} is consistent", locations.generation);
        } else {
            warn!(
                "Artifact generation {} has {} slots without metadata and {} orphaned entries",
                locations.generation,
                missing_in_metadata.len(),
                orphaned_in_metadata.len()
            );
        }

        Ok(ConsistencyReport {
            generation: locations.generation,
            index_vectors: index.len(),
            metadata_entries: metadata.len(),
            dimension: index.dimension(),
            missing_in_metadata,
            orphaned_in_metadata,
            is_consistent,
        })
    }
}

/// Exclusive commit lock held for the lifetime of the guard.
///
/// The lock file carries a per-holder token; a guard only ever removes the
/// file while it still holds its own token.
#[derive(Debug)]
struct CommitLock {
    path: PathBuf,
    token: String,
}

impl CommitLock {
    fn acquire(
        path: PathBuf,
        timeout: Duration,
        stale_after: Duration,
    ) -> Result<Self, ArtifactError> {
        let started = Instant::now();
        let token = Uuid::new_v4().simple().to_string();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(
                        file,
                        "{} {} {}",
                        token,
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    )
                    .and_then(|()| file.sync_all())
                    .map_err(|source| {
                        let _ = fs::remove_file(&path);
                        ArtifactError::Io {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    debug!("Acquired commit lock {}", path.display());
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path, stale_after)
                        && Self::take_if(&path, |aside, _| Self::is_stale(aside, stale_after))
                    {
                        warn!("Removed stale commit lock {}", path.display());
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(ArtifactError::LockTimeout(path));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(source) => return Err(ArtifactError::Io { path, source }),
            }
        }
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    }

    fn holder(content: &str) -> Option<&str> {
        content.split_whitespace().next()
    }

    /// Move the lock file aside and delete it if `accept` agrees.
    ///
    /// A rejected file is linked back into place unless a new lock already
    /// exists there. Returns whether the lock was removed.
    fn take_if<F>(path: &Path, accept: F) -> bool
    where
        F: FnOnce(&Path, &str) -> bool,
    {
        let aside = path.with_file_name(format!("{LOCK_FILE}.{}", Uuid::new_v4().simple()));
        if fs::rename(path, &aside).is_err() {
            return false;
        }

        let content = fs::read_to_string(&aside).unwrap_or_default();
        let removed = accept(&aside, &content);
        let restored = if removed {
            Ok(())
        } else {
            fs::hard_link(&aside, path)
        };
        if let Err(e) = restored {
            warn!("Could not restore commit lock {}: {}", path.display(), e);
        }
        let _ = fs::remove_file(&aside);
        removed
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        let owned = fs::read_to_string(&self.path)
            .is_ok_and(|content| Self::holder(&content) == Some(self.token.as_str()));
        if !owned {
            warn!(
                "Commit lock {} was taken over by another committer, leaving it in place",
                self.path.display()
            );
            return;
        }

        let token = self.token.as_str();
        if Self::take_if(&self.path, |_, content| Self::holder(content) == Some(token)) {
            debug!("Released commit lock {}", self.path.display());
        } else {
            warn!("Failed to release commit lock {}", self.path.display());
        }
    }
}
