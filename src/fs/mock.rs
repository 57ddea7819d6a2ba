// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem. Clones share state, so a test can keep one handle
/// and inspect what the code under test did with another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    failing: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap();
        files.insert(path.as_ref().to_path_buf(), MockEntry::File(content.into()));
    }

    /// Make every removal of `path` fail.
    pub fn fail_removal_of(&self, path: impl AsRef<Path>) {
        self.failing.lock().unwrap().push(path.as_ref().to_path_buf());
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<MockEntry> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn check_removable(&self, path: &Path) -> Result<()> {
        if self.failing.lock().unwrap().iter().any(|p| p == path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        Ok(())
    }
}

impl FileSystem for MockFileSystem {
    fn temp_dir(&self) -> PathBuf {
        PathBuf::from("/tmp")
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        files.insert(path.to_path_buf(), MockEntry::Dir);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.check_removable(path)?;
        let mut files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File(_)) => {
                files.remove(path);
                Ok(())
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.check_removable(path)?;
        let mut files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::Dir) => {
                files.retain(|p, _| !p.starts_with(path));
                Ok(())
            }
            Some(MockEntry::File(_)) => Err(anyhow!("Not a directory: {:?}", path)),
            None => Err(anyhow!("Directory not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }
}
