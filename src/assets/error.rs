//! Asset manager errors

use thiserror::Error;

use super::registry::RegistryError;
use crate::serialization::SerializeError;
use crate::storage::StoreError;

/// Errors returned by [`AssetManager`](super::AssetManager) operations
#[derive(Debug, Error)]
pub enum AssetError {
    /// No serializer is registered for the type being saved or loaded
    #[error("no serializer registered for `{type_name}`")]
    NoSerializer {
        /// Runtime or on-disk type name
        type_name: String,
    },
    /// Nothing is stored at the location
    #[error("no content stored at `{0}`")]
    NotFound(String),
    /// The loaded object is not of the requested type
    #[error("`{location}` holds `{found}`, which cannot be loaded as `{expected}`")]
    TypeMismatch {
        /// Location being loaded
        location: String,
        /// Requested type
        expected: String,
        /// Type produced by the serializer
        found: String,
    },
    /// The object is not tracked by the registry
    #[error("object is not loaded: {0}")]
    NotLoaded(String),
    /// Storage failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    /// Encoding or decoding failed at a location
    #[error("failed to serialize `{location}`: {source}")]
    Serialization {
        /// Location being saved or loaded
        location: String,
        /// Underlying failure
        #[source]
        source: SerializeError,
    },
    /// Registry bookkeeping rejected the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AssetError {
    /// Wrap a serialization failure with the location it happened at
    pub(crate) fn serialization(location: &str, source: SerializeError) -> Self {
        Self::Serialization {
            location: location.to_string(),
            source,
        }
    }
}
