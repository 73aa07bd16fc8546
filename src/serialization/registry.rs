//! Serializer registration table
//!
//! Serializers are registered explicitly at startup, keyed by the runtime type
//! they produce. Each registration also carries the type name written into
//! chunk headers, so stored chunks can be loaded by their on-disk type.

use std::any::{TypeId, type_name};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::context::SerializerContext;
use super::serializer::{ContentSerializer, SerdeSerializer, SerializeError};
use crate::assets::Asset;

/// Type-erased serializer as stored in the registry
pub trait DynSerializer: Send + Sync {
    /// Name written in chunk headers
    fn type_name(&self) -> &str;

    /// Runtime type handled by this serializer
    fn target_type(&self) -> TypeId;

    /// Write a type-erased object
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::TypeMismatch`] if `object` has another type
    fn save(
        &self,
        context: &SerializerContext,
        writer: &mut dyn Write,
        object: &dyn Asset,
    ) -> Result<(), SerializeError>;

    /// Construct and fill a new object
    ///
    /// # Errors
    ///
    /// Returns an error if construction or decoding fails
    fn load(
        &self,
        context: &SerializerContext,
        reader: &mut dyn Read,
    ) -> Result<Arc<dyn Asset>, SerializeError>;
}

struct Registration<T, S> {
    name: String,
    serializer: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> DynSerializer for Registration<T, S>
where
    T: Asset,
    S: ContentSerializer<T>,
{
    fn type_name(&self) -> &str {
        &self.name
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn save(
        &self,
        context: &SerializerContext,
        writer: &mut dyn Write,
        object: &dyn Asset,
    ) -> Result<(), SerializeError> {
        let object = object
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| SerializeError::TypeMismatch {
                expected: self.name.clone(),
            })?;
        self.serializer.serialize(context, writer, object)
    }

    fn load(
        &self,
        context: &SerializerContext,
        reader: &mut dyn Read,
    ) -> Result<Arc<dyn Asset>, SerializeError> {
        let mut object = self.serializer.construct(context)?;
        self.serializer.deserialize(context, reader, &mut object)?;
        Ok(Arc::new(object))
    }
}

/// Maps runtime types to the serializers able to store them
#[derive(Default)]
pub struct SerializerRegistry {
    by_type: FxHashMap<TypeId, Arc<dyn DynSerializer>>,
    by_name: FxHashMap<String, Arc<dyn DynSerializer>>,
}

impl SerializerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `serializer` for `T` under the Rust type name of `T`
    pub fn register<T, S>(&mut self, serializer: S) -> &mut Self
    where
        T: Asset,
        S: ContentSerializer<T>,
    {
        self.register_named::<T, S>(type_name::<T>(), serializer)
    }

    /// Register `serializer` for `T` under an explicit, stable name.
    ///
    /// A later registration for the same type or name replaces the earlier one.
    pub fn register_named<T, S>(&mut self, name: impl Into<String>, serializer: S) -> &mut Self
    where
        T: Asset,
        S: ContentSerializer<T>,
    {
        let name = name.into();
        let registration: Arc<dyn DynSerializer> = Arc::new(Registration::<T, S> {
            name: name.clone(),
            serializer,
            _marker: PhantomData,
        });

        if let Some(previous) = self.by_type.insert(TypeId::of::<T>(), Arc::clone(&registration))
            && previous.type_name() != name
        {
            self.by_name.remove(previous.type_name());
        }
        self.by_name.insert(name, registration);
        self
    }

    /// Register the serde-backed serializer for `T`
    pub fn register_serde<T>(&mut self) -> &mut Self
    where
        T: Asset + Serialize + DeserializeOwned + Default,
    {
        self.register::<T, _>(SerdeSerializer::<T>::new())
    }

    /// Serializer registered for the exact runtime type
    #[must_use]
    pub fn find(&self, type_id: TypeId) -> Option<Arc<dyn DynSerializer>> {
        self.by_type.get(&type_id).cloned()
    }

    /// Serializer registered under a chunk type name
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn DynSerializer>> {
        self.by_name.get(name).cloned()
    }

    /// Name `T` is registered under
    #[must_use]
    pub fn name_of(&self, type_id: TypeId) -> Option<&str> {
        self.by_type.get(&type_id).map(|entry| entry.type_name())
    }

    /// Check whether `T` has a serializer
    #[must_use]
    pub fn contains<T: Asset>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered types
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Check if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("SerializerRegistry")
            .field("types", &names)
            .finish()
    }
}
