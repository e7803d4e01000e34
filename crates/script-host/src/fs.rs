//! Engine-private filesystem
//!
//! Host files never reach the engine as live handles; they are mounted into
//! this filesystem and the script addresses them by path.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use quay_protocol::FileBlob;
use thiserror::Error;

/// Filesystem errors
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Filesystem view the script engine reads mounted content through
pub trait EngineFs: Send + Sync {
    /// Create a directory
    fn mkdir(&self, path: &str) -> Result<(), FsError>;

    /// Mount a read-only view exposing exactly `files` under `path`
    fn mount(&self, files: Vec<FileBlob>, path: &str) -> Result<(), FsError>;

    /// Read a file's bytes
    fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Whether a file or directory exists at `path`
    fn exists(&self, path: &str) -> bool;
}

/// In-memory [`EngineFs`].
///
/// Mounted files are immutable; there is no write or unlink operation.
#[derive(Default)]
pub struct MemoryFs {
    state: Mutex<FsState>,
}

#[derive(Default)]
struct FsState {
    dirs: HashSet<String>,
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Absolute path, no trailing slash (except the root itself)
fn normalize(path: &str) -> Result<String, FsError> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidPath(path.to_owned()));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_owned())
    } else {
        Ok(trimmed.to_owned())
    }
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => path[..idx].to_owned(),
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

impl EngineFs for MemoryFs {
    fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let path = normalize(path)?;
        if path == "/" {
            return Err(FsError::AlreadyExists(path));
        }

        let mut state = self.locked();
        let parent = parent(&path);
        if parent != "/" && !state.dirs.contains(&parent) {
            return Err(FsError::NotFound(parent));
        }
        if state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        state.dirs.insert(path);
        Ok(())
    }

    fn mount(&self, files: Vec<FileBlob>, path: &str) -> Result<(), FsError> {
        let path = normalize(path)?;

        let mut state = self.locked();
        if state.files.contains_key(&path) {
            return Err(FsError::NotADirectory(path));
        }
        if path != "/" && !state.dirs.contains(&path) {
            return Err(FsError::NotFound(path));
        }

        for file in &files {
            if file.name.is_empty() || file.name.contains('/') {
                return Err(FsError::InvalidPath(file.name.clone()));
            }
            let target = join(&path, &file.name);
            if state.dirs.contains(&target) || state.files.contains_key(&target) {
                return Err(FsError::AlreadyExists(target));
            }
        }
        for file in files {
            let target = join(&path, &file.name);
            state.files.insert(target, file.bytes);
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = normalize(path)?;
        let state = self.locked();
        if let Some(bytes) = state.files.get(&path) {
            return Ok(bytes.clone());
        }
        if path == "/" || state.dirs.contains(&path) {
            return Err(FsError::IsADirectory(path));
        }
        Err(FsError::NotFound(path))
    }

    fn exists(&self, path: &str) -> bool {
        let Ok(path) = normalize(path) else {
            return false;
        };
        if path == "/" {
            return true;
        }
        let state = self.locked();
        state.dirs.contains(&path) || state.files.contains_key(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdir_mount_read() {
        let fs = MemoryFs::new();
        fs.mkdir("/file-input-0").unwrap();
        fs.mount(
            vec![FileBlob::new("notes.txt", b"hello".to_vec())],
            "/file-input-0",
        )
        .unwrap();

        assert_eq!(fs.read("/file-input-0/notes.txt").unwrap(), b"hello");
        assert!(fs.exists("/file-input-0"));
        assert!(fs.exists("/file-input-0/notes.txt"));
        assert!(!fs.exists("/file-input-1"));
    }

    #[test]
    fn mkdir_existing_directory_fails() {
        let fs = MemoryFs::new();
        fs.mkdir("/data").unwrap();
        assert!(matches!(
            fs.mkdir("/data"),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn mkdir_without_parent_fails() {
        let fs = MemoryFs::new();
        assert!(matches!(fs.mkdir("/a/b"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn mount_into_missing_directory_fails() {
        let fs = MemoryFs::new();
        let result = fs.mount(vec![FileBlob::new("f", b"x".to_vec())], "/nope");
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[test]
    fn relative_paths_are_rejected() {
        let fs = MemoryFs::new();
        assert!(matches!(
            fs.mkdir("file-input-0"),
            Err(FsError::InvalidPath(_))
        ));
        assert!(!fs.exists("file-input-0"));
    }

    #[test]
    fn read_on_directory_fails() {
        let fs = MemoryFs::new();
        fs.mkdir("/data").unwrap();
        assert!(matches!(fs.read("/data"), Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.read("/gone"), Err(FsError::NotFound(_))));
    }
}
