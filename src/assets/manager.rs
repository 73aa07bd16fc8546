//! Asset manager
//!
//! The asset manager is the public entry point for storing and retrieving
//! object graphs:
//! - `save` writes an object and every in-memory object it references,
//!   assigning locations to references that have none
//! - `load` reads an object, resolves its content references and deduplicates
//!   every instance through the shared [`ObjectRegistry`]
//! - `unload` releases a root load and reclaims what is no longer held
//!
//! Several managers may share one registry (and one database) to observe the
//! same instances and reference counts.

use std::any::{TypeId, type_name};
use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::asset::{Asset, downcast_arc, object_key, references_of};
use super::error::AssetError;
use super::reference::{ContentReference, UntypedReference};
use super::registry::{InstanceKey, ObjectRegistry, RegistryError, RegistryState};
use super::settings::{AssetManagerConfig, AssetManagerLoaderSettings, ReferenceInfo};
use super::stats::AssetManagerStats;
use crate::serialization::{
    ArchiveMode, ChunkHeader, ChunkReference, SerializerContext, SerializerRegistry,
};
use crate::storage::{ObjectDatabase, ObjectId, StoreError};

/// Type a load asks for
#[derive(Clone, Copy)]
struct Requested {
    type_id: TypeId,
    type_name: &'static str,
}

impl Requested {
    fn of<T: Asset>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// An object written during a save pass
struct SavedObject {
    key: InstanceKey,
    object: Arc<dyn Asset>,
    type_name: String,
}

/// State of one depth-first save
struct SavePass<'a> {
    manager: &'a AssetManager,
    registry: &'a RegistryState,
    /// Location of every object visited so far, including ancestors in progress
    locations: FxHashMap<usize, String>,
    /// Content ids of completed objects
    ids: FxHashMap<usize, ObjectId>,
    /// Completed objects, children before parents
    saved: Vec<SavedObject>,
}

impl<'a> SavePass<'a> {
    fn new(manager: &'a AssetManager, registry: &'a RegistryState) -> Self {
        Self {
            manager,
            registry,
            locations: FxHashMap::default(),
            ids: FxHashMap::default(),
            saved: Vec::new(),
        }
    }

    fn save(&mut self, location: &str, object: &Arc<dyn Asset>) -> Result<ObjectId, AssetError> {
        let manager = self.manager;
        let type_id = object.concrete_type();
        let serializer = manager
            .serializers
            .find(type_id)
            .ok_or_else(|| AssetError::NoSerializer {
                type_name: object.concrete_type_name().to_string(),
            })?;

        // Refuse before anything is written over a live instance's content
        let key = InstanceKey::new(location, type_id);
        if let Some(live) = self.registry.resolve(&key)
            && !Arc::ptr_eq(&live, object)
        {
            return Err(RegistryError::LocationConflict {
                location: location.to_string(),
                type_name: serializer.type_name().to_string(),
            }
            .into());
        }

        let identity = object_key(object);
        self.locations.insert(identity, location.to_string());

        let mut header = ChunkHeader::new(serializer.type_name(), manager.config.format);
        for (index, edge) in references_of(object.as_ref()).into_iter().enumerate() {
            if let Some(child) = edge.object() {
                self.save_child(location, index, edge, &child)?;
            }
            if let Some(child_location) = edge.location() {
                let type_name = manager
                    .serializers
                    .name_of(edge.target_type())
                    .unwrap_or_else(|| edge.target_type_name());
                header.references.push(ChunkReference {
                    location: child_location,
                    id: edge.id(),
                    type_name: type_name.to_string(),
                });
            }
        }

        let context = SerializerContext::new(location, ArchiveMode::Serialize, manager.config.format);
        let mut writer = manager.database.open_write(location);
        header
            .write(&mut writer)
            .map_err(|e| AssetError::serialization(location, e))?;
        serializer
            .save(&context, &mut writer, object.as_ref())
            .map_err(|e| AssetError::serialization(location, e))?;
        let id = writer.stage()?;
        log::debug!("Saved {location} ({}) as {id}", serializer.type_name());

        self.ids.insert(identity, id);
        self.saved.push(SavedObject {
            key,
            object: Arc::clone(object),
            type_name: serializer.type_name().to_string(),
        });
        Ok(id)
    }

    fn save_child(
        &mut self,
        parent: &str,
        index: usize,
        edge: &dyn UntypedReference,
        child: &Arc<dyn Asset>,
    ) -> Result<(), AssetError> {
        let identity = object_key(child);

        // Already visited in this pass: shared child, or a back-edge to an
        // ancestor whose id is not known yet
        if let Some(location) = self.locations.get(&identity) {
            edge.set_location(location.clone());
            if let Some(id) = self.ids.get(&identity) {
                edge.set_id(Some(*id));
            }
            return Ok(());
        }

        // Tracked instances keep their location and are not written again
        let tracked = self
            .registry
            .key_of(child)
            .map(|key| key.location().to_string());
        if let Some(location) = &tracked
            && let Some(id) = self.manager.database.object_id(location)
        {
            edge.set_location(location.clone());
            edge.set_id(Some(id));
            return Ok(());
        }

        let location = tracked
            .or_else(|| edge.location())
            .unwrap_or_else(|| format!("{parent}/{index}"));
        edge.set_location(location.clone());
        let id = self.save(&location, child)?;
        edge.set_id(Some(id));
        Ok(())
    }
}

/// Saves, loads and unloads object graphs
pub struct AssetManager {
    database: Arc<ObjectDatabase>,
    registry: Arc<ObjectRegistry>,
    serializers: Arc<SerializerRegistry>,
    config: AssetManagerConfig,
}

impl AssetManager {
    /// Create a manager sharing `registry` with other managers
    #[must_use]
    pub fn new(
        database: Arc<ObjectDatabase>,
        registry: Arc<ObjectRegistry>,
        serializers: Arc<SerializerRegistry>,
        config: AssetManagerConfig,
    ) -> Self {
        Self {
            database,
            registry,
            serializers,
            config,
        }
    }

    /// Create a manager with its own registry and the default configuration
    #[must_use]
    pub fn with_database(database: Arc<ObjectDatabase>, serializers: Arc<SerializerRegistry>) -> Self {
        Self::new(
            database,
            Arc::new(ObjectRegistry::new()),
            serializers,
            AssetManagerConfig::default(),
        )
    }

    /// The database objects are stored in
    #[must_use]
    pub fn database(&self) -> &Arc<ObjectDatabase> {
        &self.database
    }

    /// The registry tracking loaded instances
    #[must_use]
    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    /// The serializers used for saving and loading
    #[must_use]
    pub fn serializers(&self) -> &Arc<SerializerRegistry> {
        &self.serializers
    }

    /// Manager configuration
    #[must_use]
    pub fn config(&self) -> &AssetManagerConfig {
        &self.config
    }

    /// Save `object` at `location`, along with every resolved content
    /// reference it holds that is not stored yet.
    ///
    /// The saved object counts as loaded by this call until it is unloaded;
    /// saving the same instance again does not add another count.
    ///
    /// # Errors
    ///
    /// Returns an error if a type has no serializer, writing fails, or another
    /// instance is already loaded at one of the locations
    pub fn save<T: Asset>(&self, location: &str, object: &Arc<T>) -> Result<ObjectId, AssetError> {
        let object: Arc<dyn Asset> = Arc::clone(object) as Arc<dyn Asset>;
        self.save_untyped(location, &object)
    }

    /// Save a type-erased object
    ///
    /// # Errors
    ///
    /// See [`Self::save`]
    pub fn save_untyped(&self, location: &str, object: &Arc<dyn Asset>) -> Result<ObjectId, AssetError> {
        let mut state = self.registry.lock();

        let mut pass = SavePass::new(self, &state);
        let result = pass.save(location, object);
        let saved = pass.saved;

        // Staged blobs are indexed once per pass, even when it failed part way
        self.database.flush_index()?;
        let id = result?;

        register_saved(&mut state, object, saved)?;
        Ok(id)
    }

    /// Load the object at `location`, resolving its content references
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is stored at `location`, `T` has no
    /// serializer, or reading fails
    pub fn load<T: Asset>(&self, location: &str) -> Result<Arc<T>, AssetError> {
        self.load_with(location, &AssetManagerLoaderSettings::default())
    }

    /// Load the object at `location` as `T` with explicit settings.
    ///
    /// `T` may differ from the type that was saved as long as its serializer
    /// understands the stored payload.
    ///
    /// # Errors
    ///
    /// See [`Self::load`]
    pub fn load_with<T: Asset>(
        &self,
        location: &str,
        settings: &AssetManagerLoaderSettings,
    ) -> Result<Arc<T>, AssetError> {
        let object = self.load_object(location, Some(Requested::of::<T>()), settings)?;
        let found = object.concrete_type_name();
        downcast_arc::<T>(object).ok_or_else(|| AssetError::TypeMismatch {
            location: location.to_string(),
            expected: type_name::<T>().to_string(),
            found: found.to_string(),
        })
    }

    /// Load the object at `location` as the type recorded in its chunk header
    ///
    /// # Errors
    ///
    /// See [`Self::load`]
    pub fn load_untyped(
        &self,
        location: &str,
        settings: &AssetManagerLoaderSettings,
    ) -> Result<Arc<dyn Asset>, AssetError> {
        self.load_object(location, None, settings)
    }

    fn load_object(
        &self,
        location: &str,
        requested: Option<Requested>,
        settings: &AssetManagerLoaderSettings,
    ) -> Result<Arc<dyn Asset>, AssetError> {
        let mut state = self.registry.lock();

        let loaded = match requested {
            Some(requested) => {
                let key = InstanceKey::new(location, requested.type_id);
                state.resolve(&key).map(|object| (key, object))
            }
            None => state.resolve_location(location),
        };
        if let Some((key, object)) = loaded {
            let count = state.increment(&key)?;
            log::debug!("{location} is already loaded, reference count {count}");
            return Ok(object);
        }

        let (key, object, type_name) = self.read_object(location, requested, settings)?;
        state.register(&key, Arc::clone(&object), &type_name)?;
        state.increment(&key)?;

        if let Err(error) = self.resolve_references(&mut state, &key, &object, settings) {
            // Release the partially resolved graph
            if let Err(release) = state.decrement(&key) {
                log::error!("Failed to release {location}: {release}");
            }
            return Err(error);
        }
        Ok(object)
    }

    /// Resolve content references breadth-first from a freshly read object
    fn resolve_references(
        &self,
        state: &mut RegistryState,
        root_key: &InstanceKey,
        root: &Arc<dyn Asset>,
        settings: &AssetManagerLoaderSettings,
    ) -> Result<(), AssetError> {
        let mut queue = VecDeque::from([(root_key.clone(), Arc::clone(root))]);

        while let Some((parent_key, parent)) = queue.pop_front() {
            for edge in references_of(parent.as_ref()) {
                let Some(location) = edge.location() else {
                    continue;
                };
                let info = ReferenceInfo {
                    location,
                    type_id: edge.target_type(),
                    type_name: edge.target_type_name(),
                };
                if !settings.should_resolve(&info) {
                    continue;
                }

                let child_key = InstanceKey::new(info.location.as_str(), info.type_id);
                let child = match state.resolve(&child_key) {
                    Some(child) => child,
                    None => {
                        let requested = Requested {
                            type_id: info.type_id,
                            type_name: info.type_name,
                        };
                        match self.read_object(&info.location, Some(requested), settings) {
                            Ok((_, child, type_name)) => {
                                state.register(&child_key, Arc::clone(&child), &type_name)?;
                                queue.push_back((child_key.clone(), Arc::clone(&child)));
                                child
                            }
                            Err(AssetError::NotFound(missing)) => {
                                log::error!(
                                    "{missing} referenced by {} is missing",
                                    parent_key.location()
                                );
                                continue;
                            }
                            Err(error) => return Err(error),
                        }
                    }
                };

                if edge.set_object(child) {
                    state.add_reference(&parent_key, &child_key)?;
                }
            }
        }
        Ok(())
    }

    /// Read and deserialize one object without touching the registry
    fn read_object(
        &self,
        location: &str,
        requested: Option<Requested>,
        settings: &AssetManagerLoaderSettings,
    ) -> Result<(InstanceKey, Arc<dyn Asset>, String), AssetError> {
        let mut reader = BufReader::new(self.open(location)?);
        let header =
            ChunkHeader::read(&mut reader).map_err(|e| AssetError::serialization(location, e))?;

        let serializer = match requested {
            Some(requested) => self.serializers.find(requested.type_id).ok_or_else(|| {
                AssetError::NoSerializer {
                    type_name: requested.type_name.to_string(),
                }
            })?,
            None => self
                .serializers
                .find_by_name(&header.type_name)
                .ok_or_else(|| AssetError::NoSerializer {
                    type_name: header.type_name.clone(),
                })?,
        };

        let context = SerializerContext::new(location, ArchiveMode::Deserialize, header.format)
            .with_load_content_references(settings.load_content_references);
        let object = serializer
            .load(&context, &mut reader)
            .map_err(|e| AssetError::serialization(location, e))?;
        log::debug!(
            "Read {location} ({}) as {}",
            header.type_name,
            serializer.type_name()
        );

        Ok((
            InstanceKey::new(location, serializer.target_type()),
            object,
            serializer.type_name().to_string(),
        ))
    }

    fn open(&self, location: &str) -> Result<Box<dyn Read + Send>, AssetError> {
        self.database.open_read(location).map_err(|error| match error {
            StoreError::NotFound(location) => AssetError::NotFound(location),
            other => AssetError::Store(other),
        })
    }

    /// Release one root load of `object`. Returns its remaining reference
    /// count, zero once it has been reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NotLoaded`] if the object is not tracked, or a
    /// registry error if it is only held through content references
    pub fn unload<T: Asset + ?Sized>(&self, object: &Arc<T>) -> Result<usize, AssetError> {
        let mut state = self.registry.lock();
        let Some(key) = state.key_of_identity(object_key(object)).cloned() else {
            log::warn!("Unload called on a {} that is not loaded", type_name::<T>());
            return Err(AssetError::NotLoaded(type_name::<T>().to_string()));
        };
        release(&mut state, &key)
    }

    /// Release one root load of whatever is loaded at `location`
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NotLoaded`] if nothing at `location` is held by a root load
    pub fn unload_location(&self, location: &str) -> Result<usize, AssetError> {
        let mut state = self.registry.lock();
        let Some(key) = state.root_key(location) else {
            log::warn!("Unload called on {location}, which is not loaded");
            return Err(AssetError::NotLoaded(location.to_string()));
        };
        release(&mut state, &key)
    }

    /// Load the target of `reference` and store it in the reference.
    ///
    /// Counts as a root load, to be released with [`Self::unload`].
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NotFound`] if the reference has no location, or
    /// any error of [`Self::load`]
    pub fn resolve<T: Asset>(&self, reference: &ContentReference<T>) -> Result<Arc<T>, AssetError> {
        let location = reference.location().ok_or_else(|| {
            AssetError::NotFound(
                reference
                    .id()
                    .map_or_else(|| "unnamed reference".to_string(), |id| id.to_string()),
            )
        })?;
        let object = self.load::<T>(&location)?;
        reference.set(Arc::clone(&object));
        Ok(object)
    }

    /// Re-read the content stored for `object` and swap the result in.
    ///
    /// The new instance takes over the record of `object` along with its
    /// reference count. Children still referenced are reused, and loaded
    /// parents are pointed at the new instance. Holders of the old `Arc` keep
    /// the old content.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NotLoaded`] if `object` is not tracked, or any
    /// error of [`Self::load`]. A failed reload leaves the registry unchanged.
    pub fn reload<T: Asset>(
        &self,
        object: &Arc<T>,
        settings: &AssetManagerLoaderSettings,
    ) -> Result<Arc<T>, AssetError> {
        let mut state = self.registry.lock();
        let Some(key) = state.key_of_identity(object_key(object)).cloned() else {
            log::warn!("Reload called on a {} that is not loaded", type_name::<T>());
            return Err(AssetError::NotLoaded(type_name::<T>().to_string()));
        };

        let (_, fresh, _) = self.read_object(key.location(), Some(Requested::of::<T>()), settings)?;
        let typed = downcast_arc::<T>(Arc::clone(&fresh)).ok_or_else(|| AssetError::TypeMismatch {
            location: key.location().to_string(),
            expected: type_name::<T>().to_string(),
            found: fresh.concrete_type_name().to_string(),
        })?;

        let previous_children = state.children(&key);
        let previous = state.replace(&key, Arc::clone(&fresh))?;

        if let Err(error) = self.resolve_references(&mut state, &key, &fresh, settings) {
            if let Err(restore) = state
                .set_references(&key, previous_children)
                .and_then(|()| state.replace(&key, previous).map(drop))
            {
                log::error!("Failed to restore {}: {restore}", key.location());
            }
            return Err(error);
        }

        // Children the new content no longer resolves are released
        let children: Vec<InstanceKey> = references_of(fresh.as_ref())
            .iter()
            .filter_map(|edge| edge.object())
            .filter_map(|child| state.key_of(&child).cloned())
            .collect();
        state.set_references(&key, children)?;

        // Loaded parents, and the old instance's own self edges, move over
        for holder in state.parents(&key).into_iter().chain([Arc::clone(&previous)]) {
            for edge in references_of(holder.as_ref()) {
                if edge
                    .object()
                    .is_some_and(|current| Arc::ptr_eq(&current, &previous))
                {
                    edge.set_object(Arc::clone(&fresh));
                }
            }
        }

        log::debug!(
            "Reloaded {}, reference count {}",
            key.location(),
            state.reference_count(&key)
        );
        Ok(typed)
    }

    /// Check whether anything is stored at `location`
    #[must_use]
    pub fn exists(&self, location: &str) -> bool {
        self.database.exists(location)
    }

    /// The instance of `T` loaded at `location`, without taking a count
    #[must_use]
    pub fn get<T: Asset>(&self, location: &str) -> Option<Arc<T>> {
        let object = self
            .registry
            .lock()
            .resolve(&InstanceKey::new(location, TypeId::of::<T>()))?;
        downcast_arc::<T>(object)
    }

    /// Check whether anything is loaded at `location`.
    ///
    /// With `loaded_manually_only`, instances only held through content
    /// references do not count.
    #[must_use]
    pub fn is_loaded(&self, location: &str, loaded_manually_only: bool) -> bool {
        self.registry
            .lock()
            .is_loaded(location, loaded_manually_only)
    }

    /// Location `object` was loaded from or saved to
    #[must_use]
    pub fn location_of<T: Asset + ?Sized>(&self, object: &Arc<T>) -> Option<String> {
        self.registry
            .lock()
            .key_of_identity(object_key(object))
            .map(|key| key.location().to_string())
    }

    /// Current reference count of `object`, zero if it is not loaded
    #[must_use]
    pub fn reference_count<T: Asset + ?Sized>(&self, object: &Arc<T>) -> usize {
        let state = self.registry.lock();
        state
            .key_of_identity(object_key(object))
            .map_or(0, |key| state.reference_count(key))
    }

    /// Read only the chunk header stored at `location`
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is stored there or the header is invalid
    pub fn read_header(&self, location: &str) -> Result<ChunkHeader, AssetError> {
        let mut reader = BufReader::new(self.open(location)?);
        ChunkHeader::read(&mut reader).map_err(|e| AssetError::serialization(location, e))
    }

    /// Content references recorded for `location`, without loading it
    ///
    /// # Errors
    ///
    /// See [`Self::read_header`]
    pub fn dependencies(&self, location: &str) -> Result<Vec<ChunkReference>, AssetError> {
        Ok(self.read_header(location)?.references)
    }

    /// Snapshot of the shared registry
    #[must_use]
    pub fn stats(&self) -> AssetManagerStats {
        self.registry.stats()
    }
}

/// Track every saved object and the edges between them
fn register_saved(
    state: &mut RegistryState,
    root: &Arc<dyn Asset>,
    saved: Vec<SavedObject>,
) -> Result<(), AssetError> {
    let mut keys: FxHashMap<usize, InstanceKey> = FxHashMap::default();
    for entry in &saved {
        let key = match state.key_of(&entry.object) {
            Some(existing) => {
                if existing != &entry.key {
                    log::warn!(
                        "{} is already loaded from {}, keeping that location",
                        entry.key.location(),
                        existing.location()
                    );
                }
                existing.clone()
            }
            None if state.resolve(&entry.key).is_some() => {
                return Err(RegistryError::LocationConflict {
                    location: entry.key.location().to_string(),
                    type_name: entry.type_name.clone(),
                }
                .into());
            }
            None => entry.key.clone(),
        };
        keys.insert(object_key(&entry.object), key);
    }

    for entry in &saved {
        let key = &keys[&object_key(&entry.object)];
        state.register(key, Arc::clone(&entry.object), &entry.type_name)?;
    }

    // The root completes last
    let root_key = keys[&object_key(root)].clone();
    let root_name = saved.last().map_or("", |entry| entry.type_name.as_str());
    let count = state.register_or_increment(&root_key, Arc::clone(root), root_name, false)?;

    // Parents first, so every record is held before edges are replaced
    for entry in saved.iter().rev() {
        let children: Vec<InstanceKey> = references_of(entry.object.as_ref())
            .iter()
            .filter_map(|edge| edge.object())
            .filter_map(|child| {
                keys.get(&object_key(&child))
                    .or_else(|| state.key_of(&child))
                    .cloned()
            })
            .collect();
        state.set_references(&keys[&object_key(&entry.object)], children)?;
    }

    log::debug!(
        "Registered {} saved object(s), {} reference count {count}",
        saved.len(),
        root_key.location()
    );
    Ok(())
}

fn release(state: &mut RegistryState, key: &InstanceKey) -> Result<usize, AssetError> {
    let remaining = state
        .decrement(key)
        .inspect_err(|error| log::warn!("Cannot unload {}: {error}", key.location()))?;
    log::debug!("Unloaded {}, reference count {remaining}", key.location());
    Ok(remaining)
}

impl std::fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("database", &self.database.root())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Barrier;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::assets::{ContentFilter, ReferenceVisitor};
    use crate::serialization::{
        ChunkFormat, ContentSerializer, SerializeError, read_payload, write_payload,
    };
    use crate::storage::{FileStore, MemoryStore};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct A {
        i: i32,
    }

    impl Asset for A {}

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct B {
        a: ContentReference<A>,
    }

    impl Asset for B {
        fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
            visitor.visit(&self.a);
        }
    }

    /// Same stored shape as `B`, loaded as a separate type
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct BData {
        a: ContentReference<A>,
    }

    impl Asset for BData {
        fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
            visitor.visit(&self.a);
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct C {
        name: String,
        child: ContentReference<C>,
    }

    impl Asset for C {
        fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
            visitor.visit(&self.child);
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Pair {
        a: ContentReference<A>,
        b: ContentReference<B>,
    }

    impl Asset for Pair {
        fn visit_references<'a>(&'a self, visitor: &mut ReferenceVisitor<'a>) {
            visitor.visit(&self.a);
            visitor.visit(&self.b);
        }
    }

    /// Only constructible through `Seeded::new`
    #[derive(Debug)]
    struct Seeded {
        seed: u64,
        label: String,
    }

    impl Seeded {
        fn new(seed: u64) -> Self {
            Self {
                seed,
                label: format!("seed-{seed}"),
            }
        }
    }

    impl Asset for Seeded {}

    struct SeededSerializer;

    impl ContentSerializer<Seeded> for SeededSerializer {
        fn serialize(
            &self,
            context: &SerializerContext,
            writer: &mut dyn Write,
            object: &Seeded,
        ) -> Result<(), SerializeError> {
            write_payload(context, writer, &object.seed)
        }

        fn construct(&self, _context: &SerializerContext) -> Result<Seeded, SerializeError> {
            Ok(Seeded::new(0))
        }

        fn deserialize(
            &self,
            context: &SerializerContext,
            reader: &mut dyn Read,
            object: &mut Seeded,
        ) -> Result<(), SerializeError> {
            *object = Seeded::new(read_payload(context, reader)?);
            Ok(())
        }
    }

    struct Unregistered;

    impl Asset for Unregistered {}

    fn serializers() -> Arc<SerializerRegistry> {
        let mut registry = SerializerRegistry::new();
        registry
            .register_serde::<A>()
            .register_serde::<B>()
            .register_serde::<BData>()
            .register_serde::<C>()
            .register_serde::<Pair>()
            .register::<Seeded, _>(SeededSerializer);
        Arc::new(registry)
    }

    fn database() -> Arc<ObjectDatabase> {
        Arc::new(ObjectDatabase::open(Arc::new(MemoryStore::new()), "/data/db").unwrap())
    }

    fn manager(database: &Arc<ObjectDatabase>) -> AssetManager {
        AssetManager::with_database(Arc::clone(database), serializers())
    }

    fn b_with_a(i: i32) -> Arc<B> {
        Arc::new(B {
            a: ContentReference::from_value(Arc::new(A { i })),
        })
    }

    #[test]
    fn test_example_scenario() {
        let db = database();
        let b1 = b_with_a(18);
        manager(&db).save("test", &b1).unwrap();

        let assigned = b1.a.location().unwrap();
        assert_eq!(assigned, "test/0");
        assert_eq!(b1.a.id(), db.object_id("test/0"));

        let other = manager(&db);
        let b2 = other.load::<B>("test").unwrap();
        assert!(!Arc::ptr_eq(&b1, &b2));
        assert_eq!(b2.a.get().unwrap().i, 18);

        let b3 = other.load::<BData>("test").unwrap();
        assert_eq!(b3.a.get().unwrap().i, 18);
        assert_eq!(b3.a.location(), Some(assigned));

        // both projections share the loaded child
        assert!(Arc::ptr_eq(&b2.a.get().unwrap(), &b3.a.get().unwrap()));
        assert_eq!(other.reference_count(&b2.a.get().unwrap()), 2);
    }

    #[test]
    fn test_round_trip_is_a_fresh_graph() {
        let db = database();
        let a = Arc::new(A { i: 5 });
        manager(&db).save("a", &a).unwrap();

        let loaded = manager(&db).load::<A>("a").unwrap();
        assert!(!Arc::ptr_eq(&a, &loaded));
        assert_eq!(*loaded, *a);
    }

    #[test]
    fn test_same_manager_returns_saved_instance() {
        let db = database();
        let manager = manager(&db);
        let a = Arc::new(A { i: 1 });
        manager.save("a", &a).unwrap();
        manager.save("a", &a).unwrap();
        assert_eq!(manager.reference_count(&a), 1);

        let loaded = manager.load::<A>("a").unwrap();
        assert!(Arc::ptr_eq(&a, &loaded));
        assert_eq!(manager.reference_count(&a), 2);

        assert_eq!(manager.unload(&a).unwrap(), 1);
        assert_eq!(manager.unload(&loaded).unwrap(), 0);
        assert!(!manager.is_loaded("a", false));
    }

    #[test]
    fn test_shared_child_is_stored_once() {
        let db = database();
        let a = Arc::new(A { i: 3 });
        let b1 = Arc::new(B {
            a: ContentReference::from_value(Arc::clone(&a)),
        });
        let b2 = Arc::new(B {
            a: ContentReference::from_value(Arc::clone(&a)),
        });

        let saver = manager(&db);
        saver.save("b1", &b1).unwrap();
        saver.save("b2", &b2).unwrap();
        assert_eq!(db.locations(), vec!["b1", "b1/0", "b2"]);
        assert_eq!(b2.a.location().as_deref(), Some("b1/0"));
        assert_eq!(saver.reference_count(&a), 2);

        let loader = manager(&db);
        let l1 = loader.load::<B>("b1").unwrap();
        let l2 = loader.load::<B>("b2").unwrap();
        assert!(!Arc::ptr_eq(&l1, &l2));
        assert!(Arc::ptr_eq(&l1.a.get().unwrap(), &l2.a.get().unwrap()));
    }

    #[test]
    fn test_reference_counts_follow_holders() {
        let db = database();
        let a = Arc::new(A { i: 3 });
        let saver = manager(&db);
        for location in ["b1", "b2"] {
            let b = Arc::new(B {
                a: ContentReference::from_value(Arc::clone(&a)),
            });
            saver.save(location, &b).unwrap();
        }

        let loader = manager(&db);
        let b1 = loader.load::<B>("b1").unwrap();
        let child = b1.a.get().unwrap();
        assert_eq!(loader.reference_count(&b1), 1);
        assert_eq!(loader.reference_count(&child), 1);

        let b2 = loader.load::<B>("b2").unwrap();
        assert_eq!(loader.reference_count(&child), 2);

        assert_eq!(loader.unload(&b1).unwrap(), 0);
        assert_eq!(loader.reference_count(&child), 1);
        assert!(loader.is_loaded("b1/0", false));
        assert!(!loader.is_loaded("b1/0", true));

        assert_eq!(loader.unload(&b2).unwrap(), 0);
        assert_eq!(loader.reference_count(&child), 0);
        assert!(loader.stats().is_empty());
    }

    #[test]
    fn test_cycle_save_and_unload() {
        let db = database();
        let c1 = Arc::new(C {
            name: "c1".to_string(),
            child: ContentReference::default(),
        });
        let c2 = Arc::new(C {
            name: "c2".to_string(),
            child: ContentReference::from_value(Arc::clone(&c1)),
        });
        c1.child.set(Arc::clone(&c2));

        let saver = manager(&db);
        saver.save("c1", &c1).unwrap();
        assert_eq!(c1.child.location().as_deref(), Some("c1/0"));
        assert_eq!(c2.child.location().as_deref(), Some("c1"));
        assert_eq!(saver.reference_count(&c1), 2);
        assert_eq!(saver.reference_count(&c2), 1);

        assert_eq!(saver.unload(&c1).unwrap(), 0);
        assert_eq!(saver.reference_count(&c2), 0);
        assert_eq!(Arc::strong_count(&c1), 1);
        assert_eq!(Arc::strong_count(&c2), 1);
    }

    #[test]
    fn test_cycle_load_and_unload() {
        let db = database();
        let c1 = Arc::new(C {
            name: "c1".to_string(),
            child: ContentReference::default(),
        });
        let c2 = Arc::new(C {
            name: "c2".to_string(),
            child: ContentReference::from_value(Arc::clone(&c1)),
        });
        c1.child.set(Arc::clone(&c2));
        manager(&db).save("c1", &c1).unwrap();

        let loader = manager(&db);
        let l1 = loader.load::<C>("c1").unwrap();
        let l2 = l1.child.get().unwrap();
        assert_eq!(l2.name, "c2");
        assert!(Arc::ptr_eq(&l2.child.get().unwrap(), &l1));
        assert_eq!(loader.reference_count(&l1), 2);
        assert_eq!(loader.reference_count(&l2), 1);

        assert_eq!(loader.unload(&l1).unwrap(), 0);
        assert_eq!(loader.reference_count(&l1), 0);
        assert_eq!(loader.reference_count(&l2), 0);
        assert!(loader.stats().is_empty());
        assert!(loader.unload(&l1).is_err());
    }

    #[test]
    fn test_partial_load_leaves_references_unresolved() {
        let db = database();
        manager(&db).save("test", &b_with_a(18)).unwrap();

        let loader = manager(&db);
        let data = loader
            .load_with::<BData>("test", &AssetManagerLoaderSettings::without_references())
            .unwrap();
        assert!(data.a.get().is_none());
        assert_eq!(data.a.location().as_deref(), Some("test/0"));
        assert_eq!(loader.stats().len(), 1);
    }

    #[test]
    fn test_content_filter_selects_references() {
        let db = database();
        let pair = Arc::new(Pair {
            a: ContentReference::from_value(Arc::new(A { i: 1 })),
            b: ContentReference::from_value(b_with_a(2)),
        });
        manager(&db).save("pair", &pair).unwrap();

        let loader = manager(&db);
        let settings = AssetManagerLoaderSettings::default()
            .with_content_filter(ContentFilter::only_type::<A>());
        let loaded = loader.load_with::<Pair>("pair", &settings).unwrap();

        assert_eq!(loaded.a.get().unwrap().i, 1);
        assert!(loaded.b.get().is_none());
        assert_eq!(loaded.b.location().as_deref(), Some("pair/1"));
        assert!(!loader.is_loaded("pair/1", false));
    }

    #[test]
    fn test_custom_constructed_type_round_trip() {
        let db = database();
        manager(&db).save("seeded", &Arc::new(Seeded::new(99))).unwrap();

        let loaded = manager(&db).load::<Seeded>("seeded").unwrap();
        assert_eq!(loaded.seed, 99);
        assert_eq!(loaded.label, "seed-99");
    }

    #[test]
    fn test_missing_child_is_left_unresolved() {
        let db = database();
        manager(&db).save("test", &b_with_a(1)).unwrap();
        db.remove_location("test/0").unwrap();

        let loader = manager(&db);
        let b = loader.load::<B>("test").unwrap();
        assert!(!b.a.is_resolved());
        assert_eq!(b.a.location().as_deref(), Some("test/0"));
        assert_eq!(loader.stats().len(), 1);
    }

    #[test]
    fn test_missing_root_and_serializers() {
        let db = database();
        let manager = manager(&db);
        assert!(matches!(
            manager.load::<A>("nowhere"),
            Err(AssetError::NotFound(_))
        ));
        assert!(matches!(
            manager.save("x", &Arc::new(Unregistered)),
            Err(AssetError::NoSerializer { .. })
        ));
        assert!(!manager.exists("x"));

        manager.save("a", &Arc::new(A { i: 1 })).unwrap();
        assert!(matches!(
            manager.load::<Unregistered>("a"),
            Err(AssetError::NoSerializer { .. })
        ));
    }

    #[test]
    fn test_registry_shared_between_managers() {
        let db = database();
        manager(&db).save("a", &Arc::new(A { i: 4 })).unwrap();

        let registry = Arc::new(ObjectRegistry::new());
        let first = AssetManager::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            serializers(),
            AssetManagerConfig::default(),
        );
        let second = AssetManager::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            serializers(),
            AssetManagerConfig::default(),
        );

        let a1 = first.load::<A>("a").unwrap();
        let a2 = second.load::<A>("a").unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(second.reference_count(&a1), 2);

        assert_eq!(first.unload(&a1).unwrap(), 1);
        assert_eq!(second.unload(&a2).unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unload_errors() {
        let db = database();
        manager(&db).save("test", &b_with_a(1)).unwrap();
        let manager = manager(&db);

        assert!(matches!(
            manager.unload(&Arc::new(A::default())),
            Err(AssetError::NotLoaded(_))
        ));

        let b = manager.load::<B>("test").unwrap();
        let child = b.a.get().unwrap();
        assert!(matches!(
            manager.unload(&child),
            Err(AssetError::Registry(RegistryError::NotHeld(_)))
        ));
        assert_eq!(manager.reference_count(&child), 1);
    }

    #[test]
    fn test_conflicting_instance_is_rejected() {
        let db = database();
        let saver = manager(&db);
        saver.save("a", &Arc::new(A { i: 1 })).unwrap();
        let stored = db.object_id("a");

        let result = saver.save("a", &Arc::new(A { i: 2 }));
        assert!(matches!(
            result,
            Err(AssetError::Registry(RegistryError::LocationConflict { .. }))
        ));
        assert_eq!(saver.get::<A>("a").unwrap().i, 1);

        // the stored content still matches the live instance
        assert_eq!(db.object_id("a"), stored);
        assert_eq!(manager(&db).load::<A>("a").unwrap().i, 1);
    }

    #[test]
    fn test_back_edge_keeps_known_id() {
        let db = database();
        let c1 = Arc::new(C {
            name: "c1".to_string(),
            child: ContentReference::default(),
        });
        let c2 = Arc::new(C {
            name: "c2".to_string(),
            child: ContentReference::from_value(Arc::clone(&c1)),
        });
        c1.child.set(Arc::clone(&c2));

        manager(&db).save("c1", &c1).unwrap();
        // the ancestor's id is not known while its children are written
        assert!(c2.child.id().is_none());

        let previous = db.object_id("c1");
        c2.child.set_id(previous);
        manager(&db).save("c1", &c1).unwrap();
        assert_eq!(c2.child.id(), previous);
        assert_eq!(c2.child.location().as_deref(), Some("c1"));
    }

    #[test]
    fn test_reload_picks_up_new_content() {
        let db = database();
        manager(&db).save("a", &Arc::new(A { i: 1 })).unwrap();

        let loader = manager(&db);
        let first = loader.load::<A>("a").unwrap();
        let second = loader.load::<A>("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // another writer replaces the stored content
        manager(&db).save("a", &Arc::new(A { i: 2 })).unwrap();

        let reloaded = loader
            .reload(&first, &AssetManagerLoaderSettings::default())
            .unwrap();
        assert_eq!(reloaded.i, 2);
        assert_eq!(first.i, 1);
        assert_eq!(loader.reference_count(&reloaded), 2);
        assert_eq!(loader.reference_count(&first), 0);
        assert!(Arc::ptr_eq(&loader.get::<A>("a").unwrap(), &reloaded));
        assert!(matches!(
            loader.unload(&first),
            Err(AssetError::NotLoaded(_))
        ));

        assert_eq!(loader.unload(&reloaded).unwrap(), 1);
        assert_eq!(loader.unload(&reloaded).unwrap(), 0);
        assert!(loader.stats().is_empty());
        assert!(matches!(
            loader.reload(&reloaded, &AssetManagerLoaderSettings::default()),
            Err(AssetError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_reload_updates_parents_and_children() {
        let db = database();
        let pair = Arc::new(Pair {
            a: ContentReference::from_value(Arc::new(A { i: 1 })),
            b: ContentReference::from_value(b_with_a(2)),
        });
        manager(&db).save("pair", &pair).unwrap();

        let loader = manager(&db);
        let loaded = loader.load::<Pair>("pair").unwrap();
        let old_b = loaded.b.get().unwrap();
        assert_eq!(old_b.a.get().unwrap().i, 2);

        // point the stored child at the pair's own `A`
        let rewritten = Arc::new(B {
            a: ContentReference::with_location(Arc::new(A { i: 1 }), "pair/0"),
        });
        manager(&db).save("pair/1", &rewritten).unwrap();

        let new_b = loader
            .reload(&old_b, &AssetManagerLoaderSettings::default())
            .unwrap();
        let shared = loaded.a.get().unwrap();
        assert!(Arc::ptr_eq(&loaded.b.get().unwrap(), &new_b));
        assert!(Arc::ptr_eq(&new_b.a.get().unwrap(), &shared));
        assert!(!loader.is_loaded("pair/1/0", false));
        assert_eq!(loader.reference_count(&new_b), 1);
        assert_eq!(loader.reference_count(&shared), 2);

        assert_eq!(loader.unload(&loaded).unwrap(), 0);
        assert!(loader.stats().is_empty());
    }

    #[test]
    fn test_concurrent_managers_share_counts() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let db = database();
        let a = Arc::new(A { i: 3 });
        let saver = manager(&db);
        for location in ["b1", "b2"] {
            let b = Arc::new(B {
                a: ContentReference::from_value(Arc::clone(&a)),
            });
            saver.save(location, &b).unwrap();
        }

        let registry = Arc::new(ObjectRegistry::new());
        let serializers = serializers();
        let barrier = Barrier::new(THREADS);
        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    let manager = AssetManager::new(
                        Arc::clone(&db),
                        Arc::clone(&registry),
                        Arc::clone(&serializers),
                        AssetManagerConfig::default(),
                    );
                    for _ in 0..ROUNDS {
                        let b1 = manager.load::<B>("b1").unwrap();
                        let b2 = manager.load::<B>("b2").unwrap();
                        assert!(Arc::ptr_eq(&b1.a.get().unwrap(), &b2.a.get().unwrap()));
                        manager.unload(&b1).unwrap();
                        manager.unload(&b2).unwrap();
                    }

                    let b1 = manager.load::<B>("b1").unwrap();
                    let b2 = manager.load::<B>("b2").unwrap();
                    barrier.wait();
                    assert_eq!(manager.reference_count(&b1), THREADS);
                    assert_eq!(manager.reference_count(&b2), THREADS);
                    assert_eq!(manager.reference_count(&b1.a.get().unwrap()), 2);
                    barrier.wait();
                    manager.unload(&b1).unwrap();
                    manager.unload(&b2).unwrap();
                });
            }
        });

        assert!(registry.is_empty());
    }

    #[test]
    fn test_explicit_resolution_and_lookups() {
        let db = database();
        manager(&db).save("test", &b_with_a(7)).unwrap();

        let manager = manager(&db);
        let b = manager
            .load_with::<B>("test", &AssetManagerLoaderSettings::without_references())
            .unwrap();
        assert!(manager.get::<A>("test/0").is_none());

        let a = manager.resolve(&b.a).unwrap();
        assert_eq!(a.i, 7);
        assert!(b.a.is_resolved());
        assert!(manager.is_loaded("test/0", true));
        assert_eq!(manager.location_of(&a).as_deref(), Some("test/0"));
        assert!(Arc::ptr_eq(&manager.get::<A>("test/0").unwrap(), &a));

        assert_eq!(manager.unload_location("test/0").unwrap(), 0);
        assert!(matches!(
            manager.unload_location("test/0"),
            Err(AssetError::NotLoaded(_))
        ));
        assert!(manager.resolve(&ContentReference::<A>::default()).is_err());
    }

    #[test]
    fn test_untyped_load_uses_header_type() {
        let db = database();
        manager(&db).save("test", &b_with_a(2)).unwrap();

        let manager = manager(&db);
        let loaded = manager
            .load_untyped("test", &AssetManagerLoaderSettings::default())
            .unwrap();
        assert!(loaded.is::<B>());
        assert_eq!(manager.location_of(&loaded).as_deref(), Some("test"));
    }

    #[test]
    fn test_headers_list_dependencies() {
        let db = database();
        let saver = AssetManager::new(
            Arc::clone(&db),
            Arc::new(ObjectRegistry::new()),
            serializers(),
            AssetManagerConfig::new().with_format(ChunkFormat::Json),
        );
        saver.save("test", &b_with_a(3)).unwrap();

        let header = saver.read_header("test").unwrap();
        assert_eq!(header.format, ChunkFormat::Json);
        assert_eq!(header.type_name, type_name::<B>());

        let dependencies = saver.dependencies("test").unwrap();
        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].location, "test/0");
        assert_eq!(dependencies[0].id, db.object_id("test/0"));
        assert_eq!(dependencies[0].type_name, type_name::<A>());

        // the reader follows the stored format, not its own configuration
        let loaded = manager(&db).load::<B>("test").unwrap();
        assert_eq!(loaded.a.get().unwrap().i, 3);
    }

    #[test]
    fn test_file_backed_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(FileStore::new(dir.path()).unwrap());
            let db = Arc::new(ObjectDatabase::open(store, "/db").unwrap());
            manager(&db).save("test", &b_with_a(11)).unwrap();
        }

        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let db = Arc::new(ObjectDatabase::open(store, "/db").unwrap());
        let loaded = manager(&db).load::<B>("test").unwrap();
        assert_eq!(loaded.a.get().unwrap().i, 11);
    }
}
