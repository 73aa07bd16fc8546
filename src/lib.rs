//! Content storage and asset lifetime engine
//!
//! This crate provides:
//! - Content-addressed object storage over memory or the filesystem
//! - Per-type serializers writing RON or JSON chunks
//! - Lazily resolved content references between stored objects
//! - Reference-counted, deduplicated, cycle-safe loading and unloading

pub mod assets;
pub mod serialization;
pub mod storage;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::assets::{
        Asset, AssetError, AssetManager, AssetManagerConfig, AssetManagerLoaderSettings,
        ContentFilter, ContentReference, ObjectRegistry, ReferenceVisitor,
    };
    pub use crate::serialization::{ChunkFormat, ContentSerializer, SerializerRegistry};
    pub use crate::storage::{ContentStore, FileStore, MemoryStore, ObjectDatabase, ObjectId};
}
