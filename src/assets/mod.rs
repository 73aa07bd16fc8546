//! Asset lifetime management
//!
//! Provides reference-counted object graphs with:
//! - Lazily resolved content references between stored objects
//! - Deduplication of loaded instances through a shared registry
//! - Cycle-aware reclamation on unload

mod asset;
mod error;
mod manager;
mod reference;
mod registry;
mod settings;
mod stats;

pub use asset::{AsAny, Asset, ReferenceVisitor, downcast_arc, object_key, references_of};
pub use error::AssetError;
pub use manager::AssetManager;
pub use reference::{ContentReference, UntypedReference};
pub use registry::{InstanceKey, ObjectRegistry, Registration, RegistryError, RegistryState};
pub use settings::{
    AssetManagerConfig, AssetManagerLoaderSettings, ContentFilter, ReferenceInfo, reference_info,
};
pub use stats::{AssetManagerStats, LoadedAssetStats};
