//! The ready-lock protocol for tenant database creation.
//!
//! A tenant database is "ready" only when its data file exists *and* no
//! creation or migration is in flight. The in-flight window is guarded by a
//! sibling lock file (`<database>.ready_lock`) held under an exclusive flock
//! for the duration of the critical section, which makes creation
//! at-most-once across threads *and* processes sharing the filesystem.
//!
//! The lock file is unlinked before the flock is released on every exit
//! path, so a lingering lock file is only ever the residue of a crashed
//! holder. A lock file that exists but is not flocked does *not* report as
//! locked; readiness recovers on its own after a crash.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::StorageResult;

/// Extension appended to the database filename to form the lock file.
const LOCK_SUFFIX: &str = ".ready_lock";

/// File-based mutex guarding one tenant database's creation window.
#[derive(Debug, Clone)]
pub struct ReadyLock {
    database: PathBuf,
}

impl ReadyLock {
    pub fn for_database(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// The sibling lock file path for this database.
    pub fn lock_file_path(&self) -> PathBuf {
        let mut name = self.database.as_os_str().to_owned();
        name.push(LOCK_SUFFIX);
        PathBuf::from(name)
    }

    /// Run `f` while holding the exclusive creation lock.
    ///
    /// Blocks until the lock is acquired; there is no timeout. Parent
    /// directories are created as needed. The lock file is unlinked before
    /// release whether `f` succeeds or fails, and `f`'s result is
    /// propagated either way.
    pub fn lock<R>(&self, f: impl FnOnce() -> StorageResult<R>) -> StorageResult<R> {
        let lock_path = self.lock_file_path();
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        file.lock_exclusive()?;

        tracing::debug!(lock = %lock_path.display(), "acquired creation lock");

        // Unlinked while the flock is still held, then released on drop.
        let _guard = UnlinkOnRelease {
            path: &lock_path,
            file,
        };

        f()
    }

    /// Whether a creation or migration is currently in flight.
    ///
    /// A missing lock file means unlocked. An existing lock file is probed
    /// with a non-blocking shared flock: if the probe succeeds nobody holds
    /// the exclusive lock (crash residue), so the database is not locked. A
    /// file that vanishes between the existence check and the probe also
    /// counts as unlocked.
    pub fn is_locked(&self) -> bool {
        let lock_path = self.lock_file_path();
        let file = match File::open(&lock_path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return false,
            // unreadable lock file: assume a holder we cannot observe
            Err(_) => return true,
        };

        match file.try_lock_shared() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    /// The readiness oracle: data file present and no creation in flight.
    pub fn database_ready(&self) -> bool {
        self.database.exists() && !self.is_locked()
    }

    /// The guarded database path.
    pub fn database(&self) -> &Path {
        &self.database
    }
}

struct UnlinkOnRelease<'a> {
    path: &'a Path,
    file: File,
}

impl Drop for UnlinkOnRelease<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path);
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    fn lock_for(dir: &tempfile::TempDir, name: &str) -> ReadyLock {
        ReadyLock::for_database(dir.path().join(name))
    }

    #[test]
    fn test_lock_file_path() {
        let lock = ReadyLock::for_database("db/acme.sqlite3");
        assert_eq!(
            lock.lock_file_path(),
            PathBuf::from("db/acme.sqlite3.ready_lock")
        );
    }

    #[test]
    fn test_unlocked_when_no_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_for(&dir, "acme.sqlite3");
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_locked_during_critical_section() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_for(&dir, "acme.sqlite3");

        lock.lock(|| {
            assert!(lock.is_locked());
            Ok(())
        })
        .unwrap();

        assert!(!lock.is_locked());
        assert!(!lock.lock_file_path().exists());
    }

    #[test]
    fn test_stale_lock_file_is_not_locked() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_for(&dir, "acme.sqlite3");

        // crash residue: a lock file nobody holds
        fs::write(lock.lock_file_path(), b"").unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lock_file_unlinked_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_for(&dir, "acme.sqlite3");

        let result: StorageResult<()> = lock.lock(|| Err(StorageError::pool("boom")));
        assert!(result.is_err());
        assert!(!lock.lock_file_path().exists());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_lock_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ReadyLock::for_database(dir.path().join("nested/deep/acme.sqlite3"));
        lock.lock(|| Ok(())).unwrap();
        assert!(dir.path().join("nested/deep").is_dir());
    }

    #[test]
    fn test_readiness_requires_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_for(&dir, "acme.sqlite3");
        assert!(!lock.database_ready());

        fs::write(lock.database(), b"").unwrap();
        assert!(lock.database_ready());

        lock.lock(|| {
            assert!(!lock.database_ready());
            Ok(())
        })
        .unwrap();
        assert!(lock.database_ready());
    }

    #[test]
    fn test_lock_excludes_other_threads() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let lock = Arc::new(lock_for(&dir, "acme.sqlite3"));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    lock.lock(|| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
