//! Object serialization
//!
//! Provides:
//! - The per-type serializer trait and a serde-backed default
//! - The chunk header written in front of every stored object
//! - An explicit type-to-serializer registration table

mod chunk;
mod context;
mod registry;
mod serializer;

pub use chunk::{ChunkHeader, ChunkReference};
pub use context::{ArchiveMode, SerializerContext};
pub use registry::{DynSerializer, SerializerRegistry};
pub use serializer::{
    ChunkFormat, ContentSerializer, SerdeSerializer, SerializeError, read_payload, write_payload,
};
