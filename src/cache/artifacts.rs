//! Temporary artifact store with time-to-live reclamation.
//!
//! Every file produced by generation or transcription is registered here
//! and owned by the store until it is evicted. Entries are kept in
//! insertion order and a sweep runs on every registration: it walks from
//! the oldest entry, deletes expired files, and stops at the first entry
//! that is still young. Insertion order is assumed to match age order, so
//! an entry registered out of time order can shield older ones behind it.
//!
//! Reclamation is best effort. Files outlive their lifetime when nothing
//! else gets registered, and deletion failures are only logged.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::error::{DaemonError, Result};
use crate::types::ArtifactKind;

/// Default lifetime of a temporary artifact (one hour).
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Prefix used for every artifact file name.
const FILE_PREFIX: &str = "tunecraft-";

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A registered file and when it was registered.
#[derive(Debug)]
struct Entry {
    added_at: SystemTime,
    path: PathBuf,
}

/// Tracks temporary files and deletes them once they exceed their lifetime.
pub struct ArtifactStore {
    /// Directory new artifacts are created in.
    dir: PathBuf,
    /// Age after which an entry is eligible for eviction.
    lifetime: Duration,
    /// Registered files, oldest first.
    entries: Mutex<VecDeque<Entry>>,
    clock: Arc<dyn Clock>,
}

impl ArtifactStore {
    /// Creates a store using wall-clock time.
    pub fn new(dir: impl Into<PathBuf>, lifetime: Duration) -> Self {
        Self::with_clock(dir, lifetime, Arc::new(SystemClock))
    }

    /// Creates a store with a custom clock.
    pub fn with_clock(dir: impl Into<PathBuf>, lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            lifetime,
            entries: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    /// Returns the directory new artifacts are created in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the configured lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Creates a new, empty, uniquely named file for an artifact.
    ///
    /// The file is not registered; callers register it once it has been
    /// written.
    pub fn create_path(&self, kind: ArtifactKind) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            DaemonError::artifact_io(
                format!("Failed to create artifact directory {}", self.dir.display()),
                e,
            )
        })?;

        let file = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .suffix(kind.suffix())
            .tempfile_in(&self.dir)
            .map_err(|e| DaemonError::artifact_io("Failed to create artifact file", e))?;

        file.into_temp_path()
            .keep()
            .map_err(|e| DaemonError::artifact_io("Failed to keep artifact file", e.error))
    }

    /// Registers a file, sweeping expired entries first.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut entries = self.lock();
        let now = self.clock.now();
        Self::sweep_locked(&mut entries, now, self.lifetime);
        debug!(path = %path.display(), "Registered artifact");
        entries.push_back(Entry {
            added_at: now,
            path,
        });
    }

    /// Evicts expired entries without registering anything.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.lock();
        let now = self.clock.now();
        Self::sweep_locked(&mut entries, now, self.lifetime)
    }

    /// Returns true if the path is currently tracked.
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().iter().any(|e| e.path == path)
    }

    /// Returns the number of tracked files.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no files are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep_locked(entries: &mut VecDeque<Entry>, now: SystemTime, lifetime: Duration) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = entries.front() {
            // A clock that went backwards counts as zero age.
            let age = now.duration_since(oldest.added_at).unwrap_or(Duration::ZERO);
            if age <= lifetime {
                break;
            }
            if let Some(entry) = entries.pop_front() {
                if entry.path.exists() {
                    if let Err(e) = std::fs::remove_file(&entry.path) {
                        debug!(path = %entry.path.display(), error = %e, "Failed to delete artifact");
                    }
                }
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, "Swept expired artifacts");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Clock that only moves when told to.
    struct ManualClock {
        now: Mutex<SystemTime>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            })
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.now.lock().unwrap()
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn create_path_makes_unique_files() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"), DEFAULT_LIFETIME);

        let a = store.create_path(ArtifactKind::Audio).unwrap();
        let b = store.create_path(ArtifactKind::Audio).unwrap();

        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
        assert_eq!(a.extension().unwrap(), "wav");
        assert!(a.file_name().unwrap().to_string_lossy().starts_with(FILE_PREFIX));
    }

    #[test]
    fn nothing_evicted_before_lifetime() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new();
        let store = ArtifactStore::with_clock(dir.path(), Duration::from_secs(60), clock.clone());

        let paths: Vec<_> = (0..3).map(|i| touch(dir.path(), &format!("{}.wav", i))).collect();
        for path in &paths {
            store.register(path);
        }

        clock.advance(Duration::from_secs(59));
        store.register(touch(dir.path(), "late.wav"));

        assert_eq!(store.len(), 4);
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn expired_entries_evicted_on_register() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new();
        let store = ArtifactStore::with_clock(dir.path(), Duration::from_secs(60), clock.clone());

        let paths: Vec<_> = (0..5).map(|i| touch(dir.path(), &format!("{}.wav", i))).collect();
        for path in &paths {
            store.register(path);
        }

        clock.advance(Duration::from_secs(61));
        let fresh = touch(dir.path(), "fresh.wav");
        store.register(&fresh);

        assert_eq!(store.len(), 1);
        assert!(store.contains(&fresh));
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn sweep_stops_at_first_young_entry() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new();
        let store = ArtifactStore::with_clock(dir.path(), Duration::from_secs(60), clock.clone());

        let old = touch(dir.path(), "old.wav");
        store.register(&old);
        clock.advance(Duration::from_secs(30));
        let middle = touch(dir.path(), "middle.wav");
        store.register(&middle);
        clock.advance(Duration::from_secs(31));

        assert_eq!(store.sweep(), 1);
        assert!(!old.exists());
        assert!(middle.exists());
        assert!(store.contains(&middle));
    }

    #[test]
    fn missing_files_are_ignored() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new();
        let store = ArtifactStore::with_clock(dir.path(), Duration::from_secs(1), clock.clone());

        let gone = touch(dir.path(), "gone.wav");
        store.register(&gone);
        std::fs::remove_file(&gone).unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }
}
