//! Reference-counted registry of loaded objects
//!
//! The registry is the single owner of the location-to-instance mapping. It is
//! shared (through an `Arc`) by every asset manager that should deduplicate
//! loads, and all count changes go through its lock.
//!
//! Each record keeps two counts:
//! - a public count, raised by every root load or save of the location
//! - a private count, raised once per distinct parent whose content reference
//!   resolved to the record
//!
//! A record is reclaimed when nothing outside the unloaded subgraph holds it
//! any more, which also reclaims reference cycles.

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use thiserror::Error;

use super::asset::{Asset, object_key, references_of};
use super::stats::{AssetManagerStats, LoadedAssetStats};

/// Errors raised when registry bookkeeping would become inconsistent
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A different live instance of the same type is already registered here
    #[error("location `{location}` already holds another live `{type_name}` instance")]
    LocationConflict {
        /// Conflicting location
        location: String,
        /// Registered type name of the live instance
        type_name: String,
    },
    /// The record is not held by any root load
    #[error("`{0}` is not held by a root load")]
    NotHeld(String),
    /// No record exists for the location
    #[error("nothing is loaded at `{0}`")]
    NotLoaded(String),
}

/// Identifies one live instance: a location and the runtime type loaded there
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    location: String,
    type_id: TypeId,
}

impl InstanceKey {
    /// Create a key
    #[must_use]
    pub fn new(location: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            location: location.into(),
            type_id,
        }
    }

    /// Location of the instance
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Runtime type of the instance
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// Result of [`RegistryState::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new record was created
    Created,
    /// The same instance was already registered; nothing changed
    AlreadyRegistered,
}

/// Bookkeeping for one loaded instance
struct LoadedInstance {
    type_id: TypeId,
    type_name: String,
    object: Arc<dyn Asset>,
    public_count: usize,
    private_count: usize,
    /// Distinct children this instance holds a private count on
    references: FxHashSet<InstanceKey>,
}

impl LoadedInstance {
    fn count(&self) -> usize {
        self.public_count + self.private_count
    }
}

/// Registry contents, accessed through [`ObjectRegistry::lock`]
#[derive(Default)]
pub struct RegistryState {
    /// Live instances per location; several only when loaded as different types
    by_location: FxHashMap<String, SmallVec<[LoadedInstance; 1]>>,
    /// Reverse lookup from object identity to its key
    by_object: FxHashMap<usize, InstanceKey>,
}

impl RegistryState {
    fn record(&self, key: &InstanceKey) -> Option<&LoadedInstance> {
        self.by_location
            .get(&key.location)?
            .iter()
            .find(|record| record.type_id == key.type_id)
    }

    fn record_mut(&mut self, key: &InstanceKey) -> Option<&mut LoadedInstance> {
        self.by_location
            .get_mut(&key.location)?
            .iter_mut()
            .find(|record| record.type_id == key.type_id)
    }

    /// The live instance for `key`. Does not change any count.
    #[must_use]
    pub fn resolve(&self, key: &InstanceKey) -> Option<Arc<dyn Asset>> {
        self.record(key).map(|record| Arc::clone(&record.object))
    }

    /// Any live instance at `location`, preferring the oldest
    #[must_use]
    pub fn resolve_location(&self, location: &str) -> Option<(InstanceKey, Arc<dyn Asset>)> {
        self.by_location.get(location)?.first().map(|record| {
            (
                InstanceKey::new(location, record.type_id),
                Arc::clone(&record.object),
            )
        })
    }

    /// Key of the instance at `location` held by a root load, if any
    #[must_use]
    pub fn root_key(&self, location: &str) -> Option<InstanceKey> {
        self.by_location
            .get(location)?
            .iter()
            .find(|record| record.public_count > 0)
            .map(|record| InstanceKey::new(location, record.type_id))
    }

    /// Key of a registered object, looked up by identity
    #[must_use]
    pub fn key_of(&self, object: &Arc<dyn Asset>) -> Option<&InstanceKey> {
        self.by_object.get(&object_key(object))
    }

    /// Key of a registered object given its identity
    #[must_use]
    pub fn key_of_identity(&self, identity: usize) -> Option<&InstanceKey> {
        self.by_object.get(&identity)
    }

    /// Total reference count of `key`, zero if it is not loaded
    #[must_use]
    pub fn reference_count(&self, key: &InstanceKey) -> usize {
        self.record(key).map_or(0, LoadedInstance::count)
    }

    /// Public (root) count of `key`, zero if it is not loaded
    #[must_use]
    pub fn public_count(&self, key: &InstanceKey) -> usize {
        self.record(key).map_or(0, |record| record.public_count)
    }

    /// Check whether anything is loaded at `location`
    #[must_use]
    pub fn is_loaded(&self, location: &str, loaded_manually_only: bool) -> bool {
        self.by_location.get(location).is_some_and(|records| {
            records
                .iter()
                .any(|record| !loaded_manually_only || record.public_count > 0)
        })
    }

    /// Record `object` at `key` with no holders yet.
    ///
    /// Registering the same instance twice is a no-op. Callers must follow up
    /// with [`Self::increment`] or [`Self::add_reference`] before releasing the
    /// lock, otherwise the record is never reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LocationConflict`] if another instance is live at `key`
    pub fn register(
        &mut self,
        key: &InstanceKey,
        object: Arc<dyn Asset>,
        type_name: &str,
    ) -> Result<Registration, RegistryError> {
        if let Some(existing) = self.record(key) {
            if Arc::ptr_eq(&existing.object, &object) {
                return Ok(Registration::AlreadyRegistered);
            }
            return Err(RegistryError::LocationConflict {
                location: key.location.clone(),
                type_name: existing.type_name.clone(),
            });
        }

        self.by_object.insert(object_key(&object), key.clone());
        self.by_location
            .entry(key.location.clone())
            .or_default()
            .push(LoadedInstance {
                type_id: key.type_id,
                type_name: type_name.to_string(),
                object,
                public_count: 0,
                private_count: 0,
                references: FxHashSet::default(),
            });
        Ok(Registration::Created)
    }

    /// Register `object` and take a public count on it.
    ///
    /// Re-registering the same instance only takes a count when `count_again`
    /// is set; saving the same object twice leaves its count unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LocationConflict`] if another instance is live at `key`
    pub fn register_or_increment(
        &mut self,
        key: &InstanceKey,
        object: Arc<dyn Asset>,
        type_name: &str,
        count_again: bool,
    ) -> Result<usize, RegistryError> {
        match self.register(key, object, type_name)? {
            Registration::Created => self.increment(key),
            Registration::AlreadyRegistered if count_again || self.public_count(key) == 0 => {
                self.increment(key)
            }
            Registration::AlreadyRegistered => Ok(self.reference_count(key)),
        }
    }

    /// Take a public count on an existing record
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] if nothing is registered at `key`
    pub fn increment(&mut self, key: &InstanceKey) -> Result<usize, RegistryError> {
        let record = self
            .record_mut(key)
            .ok_or_else(|| RegistryError::NotLoaded(key.location.clone()))?;
        record.public_count += 1;
        Ok(record.count())
    }

    /// Record that `parent` holds `child` through a content reference.
    ///
    /// Each parent holds at most one count per distinct child. Returns whether
    /// a new count was taken.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] if either record is missing
    pub fn add_reference(
        &mut self,
        parent: &InstanceKey,
        child: &InstanceKey,
    ) -> Result<bool, RegistryError> {
        if self.record(child).is_none() {
            return Err(RegistryError::NotLoaded(child.location.clone()));
        }
        let parent_record = self
            .record_mut(parent)
            .ok_or_else(|| RegistryError::NotLoaded(parent.location.clone()))?;
        if !parent_record.references.insert(child.clone()) {
            return Ok(false);
        }

        if let Some(child_record) = self.record_mut(child) {
            child_record.private_count += 1;
        }
        Ok(true)
    }

    /// Replace the children `parent` holds with `children`.
    ///
    /// New edges take a private count, dropped edges release theirs and
    /// reclaim whatever is no longer held.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] if the parent or a child is missing
    pub fn set_references(
        &mut self,
        parent: &InstanceKey,
        children: impl IntoIterator<Item = InstanceKey>,
    ) -> Result<(), RegistryError> {
        let children: FxHashSet<InstanceKey> = children.into_iter().collect();
        if let Some(missing) = children.iter().find(|child| self.record(child).is_none()) {
            return Err(RegistryError::NotLoaded(missing.location.clone()));
        }
        let record = self
            .record_mut(parent)
            .ok_or_else(|| RegistryError::NotLoaded(parent.location.clone()))?;
        let previous = std::mem::replace(&mut record.references, children.clone());

        for added in children.difference(&previous) {
            if let Some(child) = self.record_mut(added) {
                child.private_count += 1;
            }
        }
        for dropped in previous.difference(&children) {
            if let Some(child) = self.record_mut(dropped) {
                assert!(
                    child.private_count > 0,
                    "reference count of `{}` would drop below zero",
                    dropped.location
                );
                child.private_count -= 1;
                self.collect(dropped);
            }
        }
        Ok(())
    }

    /// Swap the instance tracked at `key` for `object`, keeping its counts and
    /// edges. Returns the previous instance.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] if nothing is registered at `key`
    pub fn replace(
        &mut self,
        key: &InstanceKey,
        object: Arc<dyn Asset>,
    ) -> Result<Arc<dyn Asset>, RegistryError> {
        let identity = object_key(&object);
        let record = self
            .record_mut(key)
            .ok_or_else(|| RegistryError::NotLoaded(key.location.clone()))?;
        let previous = std::mem::replace(&mut record.object, object);

        self.by_object.remove(&object_key(&previous));
        self.by_object.insert(identity, key.clone());
        Ok(previous)
    }

    /// Children `key` currently holds a private count on
    #[must_use]
    pub fn children(&self, key: &InstanceKey) -> Vec<InstanceKey> {
        self.record(key)
            .map(|record| record.references.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Instances holding `key` through a content reference
    #[must_use]
    pub fn parents(&self, key: &InstanceKey) -> Vec<Arc<dyn Asset>> {
        self.by_location
            .values()
            .flatten()
            .filter(|record| record.references.contains(key))
            .map(|record| Arc::clone(&record.object))
            .collect()
    }

    /// Release one public count on `key`, then reclaim everything that is no
    /// longer held. Returns the remaining count of `key` (zero once removed).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotLoaded`] if nothing is registered at `key`,
    /// or [`RegistryError::NotHeld`] if the record has no public count
    pub fn decrement(&mut self, key: &InstanceKey) -> Result<usize, RegistryError> {
        let record = self
            .record_mut(key)
            .ok_or_else(|| RegistryError::NotLoaded(key.location.clone()))?;
        if record.public_count == 0 {
            return Err(RegistryError::NotHeld(key.location.clone()));
        }
        record.public_count -= 1;

        let released = self.collect(key);
        if released > 0 {
            log::debug!("Released {released} object(s) after unloading {}", key.location);
        }
        Ok(self.reference_count(key))
    }

    /// Reclaim the records reachable from `start` that nothing outside the
    /// reachable set holds. Returns the number of records removed.
    fn collect(&mut self, start: &InstanceKey) -> usize {
        // Everything reachable from the start through resolved edges
        let mut reachable: FxHashSet<InstanceKey> = FxHashSet::default();
        let mut stack = vec![start.clone()];
        while let Some(key) = stack.pop() {
            let Some(record) = self.record(&key) else {
                continue;
            };
            let children: Vec<InstanceKey> = record.references.iter().cloned().collect();
            if reachable.insert(key) {
                stack.extend(children);
            }
        }

        // Counts taken by edges from inside the reachable set
        let mut internal: FxHashMap<&InstanceKey, usize> = FxHashMap::default();
        for key in &reachable {
            if let Some(record) = self.record(key) {
                for child in &record.references {
                    if let Some(child) = reachable.get(child) {
                        *internal.entry(child).or_default() += 1;
                    }
                }
            }
        }

        // Externally held records and everything they reach stay alive
        let mut live: FxHashSet<InstanceKey> = FxHashSet::default();
        let mut stack: Vec<InstanceKey> = reachable
            .iter()
            .filter(|key| {
                self.record(key).is_some_and(|record| {
                    record.public_count > 0
                        || record.private_count > internal.get(key).copied().unwrap_or(0)
                })
            })
            .cloned()
            .collect();
        while let Some(key) = stack.pop() {
            if !live.insert(key.clone()) {
                continue;
            }
            if let Some(record) = self.record(&key) {
                stack.extend(
                    record
                        .references
                        .iter()
                        .filter(|child| reachable.contains(*child) && !live.contains(*child))
                        .cloned(),
                );
            }
        }

        let garbage: Vec<InstanceKey> = reachable.difference(&live).cloned().collect();
        let garbage_set: FxHashSet<&InstanceKey> = garbage.iter().collect();

        let mut removed = Vec::with_capacity(garbage.len());
        for key in &garbage {
            let Some(record) = self.remove(key) else {
                continue;
            };
            for child in &record.references {
                if garbage_set.contains(child) {
                    continue;
                }
                if let Some(child_record) = self.record_mut(child) {
                    assert!(
                        child_record.private_count > 0,
                        "reference count of `{}` would drop below zero",
                        child.location
                    );
                    child_record.private_count -= 1;
                }
            }
            removed.push(record.object);
        }

        // Break the resolved edges so cycles of shared objects can be dropped
        for object in &removed {
            for reference in references_of(object.as_ref()) {
                reference.clear_object();
            }
        }

        removed.len()
    }

    fn remove(&mut self, key: &InstanceKey) -> Option<LoadedInstance> {
        let records = self.by_location.get_mut(&key.location)?;
        let index = records
            .iter()
            .position(|record| record.type_id == key.type_id)?;
        let record = records.remove(index);
        if records.is_empty() {
            self.by_location.remove(&key.location);
        }
        self.by_object.remove(&object_key(&record.object));
        Some(record)
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_location.values().map(SmallVec::len).sum()
    }

    /// Check if nothing is loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_location.is_empty()
    }

    /// Snapshot of every live record, sorted by location
    #[must_use]
    pub fn stats(&self) -> AssetManagerStats {
        let mut assets: Vec<LoadedAssetStats> = self
            .by_location
            .iter()
            .flat_map(|(location, records)| {
                records.iter().map(move |record| LoadedAssetStats {
                    location: location.clone(),
                    type_name: record.type_name.clone(),
                    public_count: record.public_count,
                    private_count: record.private_count,
                })
            })
            .collect();
        assets.sort_by(|a, b| a.location.cmp(&b.location).then(a.type_name.cmp(&b.type_name)));
        AssetManagerStats::new(assets)
    }
}

/// Shared, internally synchronized registry of loaded objects
#[derive(Default)]
pub struct ObjectRegistry {
    state: Mutex<RegistryState>,
}

impl ObjectRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry for a sequence of operations
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock()
    }

    /// Any live instance at `location`. Does not change any count.
    #[must_use]
    pub fn resolve(&self, location: &str) -> Option<Arc<dyn Asset>> {
        self.lock().resolve_location(location).map(|(_, object)| object)
    }

    /// Total reference count of `object`, zero if it is not loaded
    #[must_use]
    pub fn reference_count(&self, object: &Arc<dyn Asset>) -> usize {
        let state = self.lock();
        state
            .key_of(object)
            .map_or(0, |key| state.reference_count(key))
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing is loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every live record
    #[must_use]
    pub fn stats(&self) -> AssetManagerStats {
        self.lock().stats()
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("records", &self.len())
            .finish()
    }
}
