use super::*;
use serde_json::Map;
use tempfile::TempDir;

fn index_and_metadata(texts: &[&str]) -> (VectorIndex, MetadataStore) {
    let vectors = texts
        .iter()
        .enumerate()
        .map(|(i, _)| vec![i as f32, 1.0])
        .collect();
    let index = VectorIndex::build(vectors).expect("index should build");

    let mut metadata = MetadataStore::new();
    for (slot, text) in texts.iter().enumerate() {
        metadata
            .record(slot, *text, Map::new())
            .expect("slot should record");
    }
    (index, metadata)
}

fn generation_dirs(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .expect("should list root")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(GENERATION_PREFIX))
        .collect();
    names.sort();
    names
}

#[test]
fn write_atomic_replaces_content() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("data.txt");

    write_atomic(&path, |w| w.write_all(b"first")).expect("first write should succeed");
    write_atomic(&path, |w| w.write_all(b"second")).expect("second write should succeed");

    assert_eq!(fs::read_to_string(&path).expect("should read"), "second");
}

#[test]
fn failed_write_keeps_previous_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("data.txt");
    write_atomic(&path, |w| w.write_all(b"original")).expect("write should succeed");

    let result = write_atomic(&path, |w| {
        w.write_all(b"partial")?;
        Err(io::Error::other("disk full"))
    });

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&path).expect("should read"), "original");
    let entries = fs::read_dir(temp_dir.path()).expect("should list").count();
    assert_eq!(entries, 1, "temporary file should be removed");
}

#[test]
fn empty_store_has_no_current_generation() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path().join("artifacts"));

    assert_eq!(store.current().expect("current should succeed"), None);
    assert!(matches!(store.load(), Err(ArtifactError::NoArtifacts(_))));
    assert!(matches!(store.verify(), Err(ArtifactError::NoArtifacts(_))));
}

#[test]
fn commit_then_load_returns_same_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());
    let (index, metadata) = index_and_metadata(&["alpha", "beta", "gamma"]);

    let locations = store.commit(&index, &metadata).expect("commit should succeed");
    assert!(locations.generation.starts_with(GENERATION_PREFIX));
    assert!(locations.index_path.exists());
    assert!(locations.metadata_path.exists());
    assert_eq!(store.current().expect("current"), Some(locations.clone()));

    let loaded = store.load().expect("load should succeed");
    assert_eq!(loaded.locations, locations);
    assert_eq!(loaded.index, index);
    assert_eq!(loaded.metadata, metadata);
}

#[test]
fn commit_rejects_count_mismatch() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());
    let (index, _) = index_and_metadata(&["a", "b"]);
    let (_, metadata) = index_and_metadata(&["a", "b", "c"]);

    assert!(matches!(
        store.commit(&index, &metadata),
        Err(ArtifactError::CountMismatch {
            index_count: 2,
            metadata_count: 3
        })
    ));
    assert_eq!(store.current().expect("current"), None);
    assert!(generation_dirs(temp_dir.path()).is_empty());
}

#[test]
fn second_commit_replaces_and_keeps_one_previous() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());

    let (first_index, first_metadata) = index_and_metadata(&["a", "b", "c"]);
    let first = store
        .commit(&first_index, &first_metadata)
        .expect("first commit");
    let (second_index, second_metadata) = index_and_metadata(&["x"]);
    let second = store
        .commit(&second_index, &second_metadata)
        .expect("second commit");
    let (third_index, third_metadata) = index_and_metadata(&["p", "q"]);
    let third = store
        .commit(&third_index, &third_metadata)
        .expect("third commit");

    let loaded = store.load().expect("load should succeed");
    assert_eq!(loaded.locations, third);
    assert_eq!(loaded.index.len(), 2);
    assert_eq!(loaded.metadata.len(), 2);

    let dirs = generation_dirs(temp_dir.path());
    assert_eq!(dirs.len(), 2);
    assert!(dirs.contains(&second.generation));
    assert!(dirs.contains(&third.generation));
    assert!(!dirs.contains(&first.generation));
}

#[test]
fn verify_reports_consistent_generation() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());
    let (index, metadata) = index_and_metadata(&["a", "b"]);
    let locations = store.commit(&index, &metadata).expect("commit");

    let report = store.verify().expect("verify should succeed");
    assert_eq!(
        report,
        ConsistencyReport {
            generation: locations.generation,
            index_vectors: 2,
            metadata_entries: 2,
            dimension: 2,
            missing_in_metadata: Vec::new(),
            orphaned_in_metadata: Vec::new(),
            is_consistent: true,
        }
    );
}

#[test]
fn verify_detects_tampered_metadata() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());
    let (index, metadata) = index_and_metadata(&["a", "b", "c"]);
    let locations = store.commit(&index, &metadata).expect("commit");

    let (_, shorter) = index_and_metadata(&["a"]);
    shorter
        .persist(&locations.metadata_path)
        .expect("overwrite metadata");

    let report = store.verify().expect("verify should succeed");
    assert!(!report.is_consistent);
    assert_eq!(report.missing_in_metadata, [1, 2]);
    assert!(report.orphaned_in_metadata.is_empty());

    assert!(matches!(
        store.load(),
        Err(ArtifactError::CountMismatch {
            index_count: 3,
            metadata_count: 1
        })
    ));
}

#[test]
fn invalid_pointer_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join(CURRENT_POINTER), "../../etc\n").expect("write pointer");

    let store = ArtifactStore::new(temp_dir.path());
    assert!(matches!(
        store.current(),
        Err(ArtifactError::InvalidPointer(_))
    ));
}

#[test]
fn held_lock_times_out() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path()).with_lock_timeout(Duration::from_millis(100));
    let _held = CommitLock::acquire(
        temp_dir.path().join(LOCK_FILE),
        Duration::from_secs(1),
        Duration::from_secs(60),
    )
    .expect("lock should be acquired");

    let (index, metadata) = index_and_metadata(&["a"]);
    assert!(matches!(
        store.commit(&index, &metadata),
        Err(ArtifactError::LockTimeout(_))
    ));
    assert_eq!(store.current().expect("current"), None);
}

#[test]
fn stale_lock_is_broken() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join(LOCK_FILE), "12345 stale").expect("write lock");

    let store = ArtifactStore::new(temp_dir.path())
        .with_lock_timeout(Duration::from_millis(200))
        .with_lock_stale_after(Duration::ZERO);
    let (index, metadata) = index_and_metadata(&["a"]);

    std::thread::sleep(Duration::from_millis(20));
    store
        .commit(&index, &metadata)
        .expect("commit should break stale lock");
    assert!(!temp_dir.path().join(LOCK_FILE).exists());
}

#[test]
fn concurrent_commits_never_mix_generations() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let root = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = ArtifactStore::new(root.clone());
            std::thread::spawn(move || {
                let texts: Vec<String> = (0..=worker).map(|i| format!("w{worker}-{i}")).collect();
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                let (index, metadata) = index_and_metadata(&refs);
                store.commit(&index, &metadata).expect("commit should succeed");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    let loaded = ArtifactStore::new(&root).load().expect("load should succeed");
    assert_eq!(loaded.index.len(), loaded.metadata.len());
    let prefix: String = loaded
        .metadata
        .lookup(0)
        .expect("slot 0")
        .text
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string();
    assert!(loaded.metadata.iter().all(|e| e.text.starts_with(&prefix)));
}

#[test]
fn dropping_a_broken_lock_keeps_the_new_holder() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join(LOCK_FILE);

    let first = CommitLock::acquire(
        path.clone(),
        Duration::from_millis(200),
        Duration::from_millis(20),
    )
    .expect("first lock should be acquired");
    std::thread::sleep(Duration::from_millis(60));

    let second = CommitLock::acquire(
        path.clone(),
        Duration::from_millis(200),
        Duration::from_millis(20),
    )
    .expect("stale lock should be broken");
    assert_ne!(first.token, second.token);

    drop(first);
    let content = fs::read_to_string(&path).expect("second holder's lock should remain");
    assert_eq!(CommitLock::holder(&content), Some(second.token.as_str()));

    let third = CommitLock::acquire(
        path.clone(),
        Duration::from_millis(100),
        Duration::from_secs(60),
    );
    assert!(matches!(third, Err(ArtifactError::LockTimeout(_))));

    drop(second);
    assert!(!path.exists());
    CommitLock::acquire(path, Duration::from_millis(100), Duration::from_secs(60))
        .expect("released lock can be acquired again");
}

#[test]
fn live_lock_is_not_taken_as_stale() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join(LOCK_FILE);
    let held = CommitLock::acquire(path.clone(), Duration::from_secs(1), Duration::from_secs(60))
        .expect("lock should be acquired");

    let removed = CommitLock::take_if(&path, |aside, _| {
        CommitLock::is_stale(aside, Duration::from_secs(60))
    });

    assert!(!removed);
    let content = fs::read_to_string(&path).expect("lock should be restored");
    assert_eq!(CommitLock::holder(&content), Some(held.token.as_str()));
}

#[test]
fn invalid_pointer_aborts_commit_before_writing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join(CURRENT_POINTER), "bogus\n").expect("write pointer");

    let store = ArtifactStore::new(temp_dir.path());
    let (index, metadata) = index_and_metadata(&["a"]);
    assert!(matches!(
        store.commit(&index, &metadata),
        Err(ArtifactError::InvalidPointer(_))
    ));

    let leftovers: Vec<String> = fs::read_dir(temp_dir.path())
        .expect("should list root")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != CURRENT_POINTER)
        .collect();
    assert!(leftovers.is_empty(), "unexpected entries: {leftovers:?}");
}

#[test]
fn read_retries_when_generation_is_pruned_mid_read() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());
    let (index, metadata) = index_and_metadata(&["old"]);
    store.commit(&index, &metadata).expect("first commit");

    let writer = store.clone();
    let mut first_read = true;
    let (index, metadata) = store
        .read_current(|locations| {
            if first_read {
                first_read = false;
                let (index, metadata) = index_and_metadata(&["new", "newer"]);
                writer.commit(&index, &metadata).expect("second commit");
                fs::remove_dir_all(temp_dir.path().join(&locations.generation))
                    .expect("remove read generation");
            }
            ArtifactStore::read_pair(locations)
        })
        .expect("read should retry against the new generation");

    assert!(!first_read);
    assert_eq!(index.len(), 2);
    assert_eq!(metadata.lookup(0).expect("slot 0").text, "new");
}

#[test]
fn read_failure_without_new_generation_is_returned() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path());
    let (index, metadata) = index_and_metadata(&["a"]);
    let locations = store.commit(&index, &metadata).expect("commit");
    fs::remove_file(&locations.index_path).expect("remove index");

    assert!(matches!(
        store.load(),
        Err(ArtifactError::Index(IndexError::Persistence { .. }))
    ));
}
