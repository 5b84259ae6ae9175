//! Unique on-disk working directories for browser sessions.
//!
//! Several instances of the process may run side by side (scaling, rolling
//! deploys), and a crashed instance may leave its directory behind. Names are
//! built from the process id, the allocation timestamp and a random token, and
//! the directory is created with an exclusive `create_dir` so an existing path
//! is never reused.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

const DIR_PREFIX: &str = "session";
const MAX_NAME_ATTEMPTS: usize = 8;

/// Build a directory name from its three uniqueness components.
pub fn work_dir_name(pid: u32, timestamp_micros: i64, token: &Uuid) -> String {
    format!("{}-{}-{}-{}", DIR_PREFIX, pid, timestamp_micros, token.simple())
}

/// Allocates and removes per-session working directories under a root.
#[derive(Debug, Clone)]
pub struct WorkDirAllocator {
    root: PathBuf,
    pid: u32,
}

impl WorkDirAllocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pid: std::process::id(),
        }
    }

    /// Override the process id component (simulates a sibling process).
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Candidate path for a fresh directory. Does not touch the filesystem.
    pub fn next_path(&self) -> PathBuf {
        let name = work_dir_name(self.pid, Utc::now().timestamp_micros(), &Uuid::new_v4());
        self.root.join(name)
    }

    /// Create a brand-new directory that no other session has used.
    pub async fn allocate(&self) -> SessionResult<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.next_path();
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    debug!(work_dir = %path.display(), "allocated session work dir");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(work_dir = %path.display(), "work dir already exists, drawing a new name");
                    continue;
                }
                Err(e) => return Err(SessionError::WorkDir(e)),
            }
        }

        Err(SessionError::WorkDir(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not find an unused session directory name",
        )))
    }

    /// Delete a session directory. Missing directories are not an error.
    pub async fn remove(&self, path: &Path) -> SessionResult<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::WorkDir(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("workdir-test-{}", Uuid::new_v4().simple()))
    }

    #[test]
    fn test_name_components() {
        let token = Uuid::nil();
        let name = work_dir_name(42, 1_700_000_000_000_000, &token);
        assert_eq!(
            name,
            "session-42-1700000000000000-00000000000000000000000000000000"
        );
    }

    #[test]
    fn test_paths_are_unique_across_processes() {
        let root = scratch_root();
        let here = WorkDirAllocator::new(&root);
        // A restarted process can be handed the same pid
        let restarted = WorkDirAllocator::new(&root).with_pid(here.pid);
        let sibling = WorkDirAllocator::new(&root).with_pid(here.pid.wrapping_add(1));

        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(here.next_path()));
            assert!(seen.insert(restarted.next_path()));
            assert!(seen.insert(sibling.next_path()));
        }
    }

    #[tokio::test]
    async fn test_allocate_creates_and_remove_deletes() {
        let root = scratch_root();
        let alloc = WorkDirAllocator::new(&root);

        let a = alloc.allocate().await.unwrap();
        let b = alloc.allocate().await.unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir());
        assert!(b.is_dir());

        alloc.remove(&a).await.unwrap();
        assert!(!a.exists());
        // Removing twice is fine
        alloc.remove(&a).await.unwrap();

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_allocate_never_reuses_leftover_directories() {
        let root = scratch_root();
        let alloc = WorkDirAllocator::new(&root);

        // Leftovers from a crashed instance with the same pid
        let mut leftovers = HashSet::new();
        for _ in 0..5 {
            leftovers.insert(alloc.allocate().await.unwrap());
        }

        let fresh = alloc.allocate().await.unwrap();
        assert!(!leftovers.contains(&fresh));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
