//! Filesystem-backed content store

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::store::{ContentStore, StoreError, normalize_path};

/// A content store rooted at a directory on the host filesystem
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The host directory backing this store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let normalized = normalize_path(path)?;
        let mut host = self.root.clone();
        host.extend(normalized.split('/').filter(|segment| !segment.is_empty()));
        Ok(host)
    }
}

fn not_found_or_io(err: std::io::Error, path: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Io(err)
    }
}

impl ContentStore for FileStore {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let host = self.host_path(path)?;
        let file = File::open(&host).map_err(|e| not_found_or_io(e, path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, StoreError> {
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&host)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).is_ok_and(|host| host.is_file())
    }

    fn create_directory(&self, path: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.host_path(path)?)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        let host = self.host_path(path)?;
        fs::remove_file(&host).map_err(|e| not_found_or_io(e, path))
    }
}
