//! File-system access used by the compiler.
//!
//! Two questions are asked of the disk: does a file still exist (tag
//! reclamation) and what does a sibling template contain. Both go through
//! [`FileSystem`] so hosts and tests can supply their own view.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory file tree, for hosts with virtual files and for tests.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<PathBuf, String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), content.into());
        }
    }

    pub fn remove(&self, path: &Path) {
        if let Ok(mut files) = self.files.write() {
            files.remove(path);
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().map(|f| f.contains_key(path)).unwrap_or(false)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "file table poisoned"))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_file_system_round_trip() {
        let fs = MemoryFileSystem::new();
        let path = Path::new("src/App.template");
        assert!(!fs.exists(path));
        fs.write(path, "<div/>");
        assert!(fs.exists(path));
        assert_eq!(fs.read_to_string(path).unwrap(), "<div/>");
        fs.remove(path);
        assert_eq!(
            fs.read_to_string(path).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_os_file_system_sees_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Card.template");
        assert!(!OsFileSystem.exists(&path));
        std::fs::write(&path, "<p>hi</p>").unwrap();
        assert!(OsFileSystem.exists(&path));
        assert_eq!(OsFileSystem.read_to_string(&path).unwrap(), "<p>hi</p>");
    }
}
