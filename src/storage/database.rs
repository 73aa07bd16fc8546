//! Content-addressed object database
//!
//! Blobs are stored once per distinct content under `<root>/objects/<id>`.
//! A location index maps human-readable locations to blob ids and is persisted
//! as `location id` lines in `<root>/index`.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::object_id::ObjectId;
use super::store::{ContentStore, StoreError, join_path, normalize_path};

/// Name of the index file inside the database root
const INDEX_NAME: &str = "index";

/// Location-indexed blob storage shared by asset managers
pub struct ObjectDatabase {
    store: Arc<dyn ContentStore>,
    root: String,
    index: RwLock<FxHashMap<String, ObjectId>>,
}

impl ObjectDatabase {
    /// Open (or create) a database rooted at `root` inside `store`.
    ///
    /// An existing index is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or parsed
    pub fn open(store: Arc<dyn ContentStore>, root: &str) -> Result<Self, StoreError> {
        let root = normalize_path(root)?;
        store.create_directory(&root)?;

        let index_path = join_path(&root, INDEX_NAME)?;
        let mut index = FxHashMap::default();
        if store.exists(&index_path) {
            let reader = BufReader::new(store.open_read(&index_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let (location, id) = parse_index_line(&line)?;
                index.insert(location, id);
            }
            log::debug!("Loaded {} index entries from {index_path}", index.len());
        }

        Ok(Self {
            store,
            root,
            index: RwLock::new(index),
        })
    }

    /// The virtual root of this database
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The id of the blob currently indexed at `location`
    #[must_use]
    pub fn object_id(&self, location: &str) -> Option<ObjectId> {
        self.index.read().get(location).copied()
    }

    /// Check whether `location` is indexed
    #[must_use]
    pub fn exists(&self, location: &str) -> bool {
        self.index.read().contains_key(location)
    }

    /// All indexed locations, sorted
    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.index.read().keys().cloned().collect();
        locations.sort();
        locations
    }

    /// Open the blob indexed at `location`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the location is not indexed
    pub fn open_read(&self, location: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let id = self
            .object_id(location)
            .ok_or_else(|| StoreError::NotFound(location.to_string()))?;
        self.store.open_read(&self.object_path(id)?)
    }

    /// Start writing a new blob for `location`.
    ///
    /// Nothing is stored until [`BlobWriter::commit`] is called.
    #[must_use]
    pub fn open_write(&self, location: &str) -> BlobWriter<'_> {
        BlobWriter {
            database: self,
            location: location.to_string(),
            buffer: Vec::new(),
        }
    }

    /// Remove `location` from the index. The blob itself is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is unknown or the index cannot be written
    pub fn remove_location(&self, location: &str) -> Result<(), StoreError> {
        let mut index = self.index.write();
        if index.remove(location).is_none() {
            return Err(StoreError::NotFound(location.to_string()));
        }
        self.persist_index(&index)
    }

    fn object_path(&self, id: ObjectId) -> Result<String, StoreError> {
        join_path(&self.root, &format!("objects/{id}"))
    }

    /// Write the in-memory index to the store
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written
    pub fn flush_index(&self) -> Result<(), StoreError> {
        let index = self.index.write();
        self.persist_index(&index)
    }

    fn commit(&self, location: String, bytes: &[u8], persist: bool) -> Result<ObjectId, StoreError> {
        let id = ObjectId::from_content(bytes);
        let path = self.object_path(id)?;

        if !self.store.exists(&path) {
            let mut writer = self.store.open_write(&path)?;
            writer.write_all(bytes)?;
            writer.flush()?;
        }

        let mut index = self.index.write();
        index.insert(location, id);
        if persist {
            self.persist_index(&index)?;
        }

        Ok(id)
    }

    fn persist_index(&self, index: &FxHashMap<String, ObjectId>) -> Result<(), StoreError> {
        let mut entries: Vec<_> = index.iter().collect();
        entries.sort();

        let mut writer = self.store.open_write(&join_path(&self.root, INDEX_NAME)?)?;
        for (location, id) in entries {
            writeln!(writer, "{location} {id}")?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_index_line(line: &str) -> Result<(String, ObjectId), StoreError> {
    let corrupt = || StoreError::CorruptIndex(line.to_string());
    let (location, id) = line.rsplit_once(' ').ok_or_else(corrupt)?;
    let id = id.parse::<ObjectId>().map_err(|_| corrupt())?;
    Ok((location.to_string(), id))
}

impl std::fmt::Debug for ObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDatabase")
            .field("root", &self.root)
            .field("locations", &self.index.read().len())
            .finish()
    }
}

/// Pending blob write for one location
pub struct BlobWriter<'a> {
    database: &'a ObjectDatabase,
    location: String,
    buffer: Vec<u8>,
}

impl BlobWriter<'_> {
    /// Store the written bytes and index them at the location
    ///
    /// # Errors
    ///
    /// Returns an error if the blob or the index cannot be written
    pub fn commit(self) -> Result<ObjectId, StoreError> {
        self.database.commit(self.location, &self.buffer, true)
    }

    /// Store the written bytes and index them in memory only.
    ///
    /// The location is readable right away but survives a reopen only after
    /// [`ObjectDatabase::flush_index`].
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written
    pub fn stage(self) -> Result<ObjectId, StoreError> {
        self.database.commit(self.location, &self.buffer, false)
    }
}

impl Write for BlobWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn write(db: &ObjectDatabase, location: &str, bytes: &[u8]) -> ObjectId {
        let mut writer = db.open_write(location);
        writer.write_all(bytes).unwrap();
        writer.commit().unwrap()
    }

    #[test]
    fn test_write_and_read_location() {
        let db = ObjectDatabase::open(Arc::new(MemoryStore::new()), "/data/db").unwrap();
        let id = write(&db, "characters/c1", b"hero");

        assert_eq!(db.object_id("characters/c1"), Some(id));
        let mut read = Vec::new();
        db.open_read("characters/c1")
            .unwrap()
            .read_to_end(&mut read)
            .unwrap();
        assert_eq!(read, b"hero");
    }

    #[test]
    fn test_identical_content_is_stored_once() {
        let store = MemoryStore::new();
        let db = ObjectDatabase::open(Arc::new(store.clone()), "/data/db").unwrap();

        let a = write(&db, "a", b"same");
        let b = write(&db, "b", b"same");

        assert_eq!(a, b);
        // one blob plus the index
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_index_survives_reopen() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let id = {
            let db = ObjectDatabase::open(Arc::clone(&store), "/data/db").unwrap();
            write(&db, "folder/with space", b"x")
        };

        let reopened = ObjectDatabase::open(store, "/data/db").unwrap();
        assert_eq!(reopened.object_id("folder/with space"), Some(id));
        assert_eq!(reopened.locations(), vec!["folder/with space".to_string()]);
    }

    #[test]
    fn test_missing_location() {
        let db = ObjectDatabase::open(Arc::new(MemoryStore::new()), "/db").unwrap();
        assert!(matches!(db.open_read("nothing"), Err(StoreError::NotFound(_))));
        assert!(!db.exists("nothing"));
    }

    #[test]
    fn test_uncommitted_write_is_discarded() {
        let db = ObjectDatabase::open(Arc::new(MemoryStore::new()), "/db").unwrap();
        {
            let mut writer = db.open_write("pending");
            writer.write_all(b"never").unwrap();
        }
        assert!(!db.exists("pending"));
    }

    #[test]
    fn test_staged_writes_persist_on_flush() {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
        let db = ObjectDatabase::open(Arc::clone(&store), "/db").unwrap();
        let mut writer = db.open_write("staged");
        writer.write_all(b"later").unwrap();
        let id = writer.stage().unwrap();
        assert_eq!(db.object_id("staged"), Some(id));

        let before = ObjectDatabase::open(Arc::clone(&store), "/db").unwrap();
        assert!(!before.exists("staged"));

        db.flush_index().unwrap();
        let after = ObjectDatabase::open(store, "/db").unwrap();
        assert_eq!(after.object_id("staged"), Some(id));
    }

    #[test]
    fn test_remove_location() {
        let db = ObjectDatabase::open(Arc::new(MemoryStore::new()), "/db").unwrap();
        write(&db, "gone", b"1");

        db.remove_location("gone").unwrap();
        assert!(!db.exists("gone"));
        assert!(db.remove_location("gone").is_err());
    }
}
