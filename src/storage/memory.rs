//! In-memory content store

use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::store::{ContentStore, StoreError, normalize_path};

#[derive(Debug, Default)]
struct MemoryFiles {
    files: FxHashMap<String, Arc<[u8]>>,
    directories: FxHashSet<String>,
}

/// A content store that keeps everything in memory.
///
/// Clones share the same storage, so several object databases or managers can
/// observe each other's writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryFiles>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().files.len()
    }

    /// Check if the store holds no files
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().files.is_empty()
    }

    /// All stored file paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.read().files.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ContentStore for MemoryStore {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let path = normalize_path(path)?;
        let data = self
            .inner
            .read()
            .files
            .get(&path)
            .cloned()
            .ok_or(StoreError::NotFound(path))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, StoreError> {
        let path = normalize_path(path)?;
        Ok(Box::new(MemoryWriter {
            path,
            buffer: Vec::new(),
            dirty: true,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn exists(&self, path: &str) -> bool {
        normalize_path(path).is_ok_and(|path| self.inner.read().files.contains_key(&path))
    }

    fn create_directory(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        self.inner.write().directories.insert(path);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        match self.inner.write().files.remove(&path) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(path)),
        }
    }
}

/// Buffers written bytes and publishes them on flush or drop
struct MemoryWriter {
    path: String,
    buffer: Vec<u8>,
    dirty: bool,
    inner: Arc<RwLock<MemoryFiles>>,
}

impl MemoryWriter {
    fn publish(&mut self) {
        if self.dirty {
            let data: Arc<[u8]> = Arc::from(self.buffer.as_slice());
            self.inner.write().files.insert(self.path.clone(), data);
            self.dirty = false;
        }
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.publish();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let store = MemoryStore::new();
        {
            let mut writer = store.open_write("/data/a").unwrap();
            writer.write_all(b"content").unwrap();
        }

        let mut text = String::new();
        store
            .open_read("data/a")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "content");
        assert!(store.exists("/data/a"));
    }

    #[test]
    fn test_missing_path() {
        let store = MemoryStore::new();
        assert!(matches!(store.open_read("/nope"), Err(StoreError::NotFound(_))));
        assert!(!store.exists("/nope"));
    }

    #[test]
    fn test_clones_share_storage() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.open_write("/x").unwrap().write_all(b"1").unwrap();
        assert!(other.exists("/x"));

        other.remove("/x").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_write_creates_file() {
        let store = MemoryStore::new();
        drop(store.open_write("/empty").unwrap());
        assert_eq!(store.paths(), vec!["/empty".to_string()]);
    }
}
