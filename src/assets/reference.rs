//! Content references
//!
//! A [`ContentReference`] is a lazily resolved, identity-bearing handle to
//! another stored object. It always carries the target's location and content
//! id when known, and carries the resolved object only once something loads it.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::asset::Asset;
use crate::storage::ObjectId;

struct Slot<T> {
    id: Option<ObjectId>,
    location: Option<String>,
    value: Option<Arc<T>>,
}

/// A typed handle to content stored at a location.
///
/// Equality and hashing only consider the id and location, never the resolved
/// value. The slot is interior-mutable: saving assigns locations and ids,
/// loading fills in values, and unloading clears them again.
pub struct ContentReference<T> {
    slot: RwLock<Slot<T>>,
}

impl<T> ContentReference<T> {
    /// Create an unresolved reference from a stored id and location
    #[must_use]
    pub fn new(id: Option<ObjectId>, location: Option<String>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                id,
                location,
                value: None,
            }),
        }
    }

    /// Create an unresolved reference to a location
    #[must_use]
    pub fn from_location(location: impl Into<String>) -> Self {
        Self::new(None, Some(location.into()))
    }

    /// Create an unresolved reference from a content id only
    #[must_use]
    pub fn from_id(id: ObjectId) -> Self {
        Self::new(Some(id), None)
    }

    /// Create a reference to an in-memory object that has no location yet.
    ///
    /// A location is assigned when the referencing object is saved.
    #[must_use]
    pub fn from_value(value: Arc<T>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                id: None,
                location: None,
                value: Some(value),
            }),
        }
    }

    /// Create a reference to an in-memory object that will be saved at `location`
    #[must_use]
    pub fn with_location(value: Arc<T>, location: impl Into<String>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                id: None,
                location: Some(location.into()),
                value: Some(value),
            }),
        }
    }

    /// The content id of the target, if known
    #[must_use]
    pub fn id(&self) -> Option<ObjectId> {
        self.slot.read().id
    }

    /// The location of the target, if known
    #[must_use]
    pub fn location(&self) -> Option<String> {
        self.slot.read().location.clone()
    }

    /// The resolved object, or `None` if nothing resolved this reference yet
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().value.clone()
    }

    /// Check whether the reference currently holds its target
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.read().value.is_some()
    }

    /// Check whether the reference points nowhere at all
    #[must_use]
    pub fn is_null(&self) -> bool {
        let slot = self.slot.read();
        slot.id.is_none() && slot.location.is_none() && slot.value.is_none()
    }

    /// Point this reference at an in-memory object
    pub fn set(&self, value: Arc<T>) {
        self.slot.write().value = Some(value);
    }
}

impl<T> Default for ContentReference<T> {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl<T> Clone for ContentReference<T> {
    fn clone(&self) -> Self {
        let slot = self.slot.read();
        Self {
            slot: RwLock::new(Slot {
                id: slot.id,
                location: slot.location.clone(),
                value: slot.value.clone(),
            }),
        }
    }
}

impl<T> PartialEq for ContentReference<T> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let (a, b) = (self.slot.read(), other.slot.read());
        a.id == b.id && a.location == b.location
    }
}

impl<T> Eq for ContentReference<T> {}

impl<T> Hash for ContentReference<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let slot = self.slot.read();
        slot.id.hash(state);
        slot.location.hash(state);
    }
}

impl<T> fmt::Debug for ContentReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("ContentReference")
            .field("type", &type_name::<T>())
            .field("id", &slot.id)
            .field("location", &slot.location)
            .field("resolved", &slot.value.is_some())
            .finish()
    }
}

/// On-disk form of a reference
#[derive(Serialize, Deserialize)]
struct StoredReference {
    #[serde(default)]
    id: Option<ObjectId>,
    #[serde(default)]
    location: Option<String>,
}

impl<T> Serialize for ContentReference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let stored = {
            let slot = self.slot.read();
            StoredReference {
                id: slot.id,
                location: slot.location.clone(),
            }
        };
        stored.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for ContentReference<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = StoredReference::deserialize(deserializer)?;
        Ok(Self::new(stored.id, stored.location))
    }
}

/// Type-erased view of a [`ContentReference`], used by graph walks
pub trait UntypedReference: Send + Sync {
    /// Location of the target, if known
    fn location(&self) -> Option<String>;

    /// Content id of the target, if known
    fn id(&self) -> Option<ObjectId>;

    /// Runtime type the reference resolves to
    fn target_type(&self) -> TypeId;

    /// Name of the runtime type the reference resolves to
    fn target_type_name(&self) -> &'static str;

    /// The resolved target, type-erased
    fn object(&self) -> Option<Arc<dyn Asset>>;

    /// Resolve to `object`. Returns `false` if it is not of the target type.
    fn set_object(&self, object: Arc<dyn Asset>) -> bool;

    /// Drop the resolved target, keeping id and location
    fn clear_object(&self);

    /// Assign the target location
    fn set_location(&self, location: String);

    /// Assign the target content id
    fn set_id(&self, id: Option<ObjectId>);
}

impl<T: Asset> UntypedReference for ContentReference<T> {
    fn location(&self) -> Option<String> {
        ContentReference::location(self)
    }

    fn id(&self) -> Option<ObjectId> {
        ContentReference::id(self)
    }

    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn target_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn object(&self) -> Option<Arc<dyn Asset>> {
        self.get().map(|value| value as Arc<dyn Asset>)
    }

    fn set_object(&self, object: Arc<dyn Asset>) -> bool {
        match object.into_any().downcast::<T>() {
            Ok(value) => {
                self.set(value);
                true
            }
            Err(_) => false,
        }
    }

    fn clear_object(&self) {
        self.slot.write().value = None;
    }

    fn set_location(&self, location: String) {
        self.slot.write().location = Some(location);
    }

    fn set_id(&self, id: Option<ObjectId>) {
        self.slot.write().id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Texture(u32);

    impl Asset for Texture {}

    struct Other;

    impl Asset for Other {}

    #[test]
    fn test_equality_ignores_value() {
        let a = ContentReference::<Texture>::with_location(Arc::new(Texture(1)), "tex");
        let b = ContentReference::<Texture>::from_location("tex");

        assert_eq!(a, b);
        assert!(a.is_resolved());
        assert!(!b.is_resolved());
        assert_ne!(a, ContentReference::from_location("other"));
    }

    #[test]
    fn test_id_only_and_location_only() {
        let id = ObjectId::from_content(b"texture");
        let by_id = ContentReference::<Texture>::from_id(id);
        let by_location = ContentReference::<Texture>::from_location("tex");

        assert_eq!(by_id.id(), Some(id));
        assert_eq!(by_id.location(), None);
        assert_eq!(by_location.id(), None);
        assert_eq!(by_location.location().as_deref(), Some("tex"));
        assert!(ContentReference::<Texture>::default().is_null());
    }

    #[test]
    fn test_serialized_form_has_no_value() {
        let id = ObjectId::from_content(b"t");
        let reference = ContentReference::<Texture>::new(Some(id), Some("tex".into()));
        reference.set(Arc::new(Texture(7)));

        let json = serde_json::to_string(&reference).unwrap();
        let back: ContentReference<Texture> = serde_json::from_str(&json).unwrap();

        assert_eq!(back, reference);
        assert!(back.get().is_none());
    }

    #[test]
    fn test_untyped_set_object_checks_type() {
        let reference = ContentReference::<Texture>::from_location("tex");
        let erased: &dyn UntypedReference = &reference;

        assert!(!erased.set_object(Arc::new(Other)));
        assert!(erased.object().is_none());

        assert!(erased.set_object(Arc::new(Texture(3))));
        assert_eq!(reference.get().unwrap().0, 3);

        erased.clear_object();
        assert!(!reference.is_resolved());
        assert_eq!(reference.location().as_deref(), Some("tex"));
    }
}
