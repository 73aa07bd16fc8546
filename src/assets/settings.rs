//! Loader settings and manager configuration

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use super::asset::Asset;
use crate::serialization::ChunkFormat;

/// Description of a content reference met while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    /// Location the reference points to
    pub location: String,
    /// Runtime type the reference resolves to
    pub type_id: TypeId,
    /// Name of the runtime type the reference resolves to
    pub type_name: &'static str,
}

/// Predicate deciding which content references a load resolves
#[derive(Clone)]
pub struct ContentFilter(Arc<dyn Fn(&ReferenceInfo) -> bool + Send + Sync>);

impl ContentFilter {
    /// Create a filter from a predicate
    pub fn new(predicate: impl Fn(&ReferenceInfo) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Only resolve references whose target type is `T`
    #[must_use]
    pub fn only_type<T: Asset>() -> Self {
        Self::new(|info| info.type_id == TypeId::of::<T>())
    }

    /// Check whether `info` should be resolved
    #[must_use]
    pub fn accepts(&self, info: &ReferenceInfo) -> bool {
        (self.0)(info)
    }
}

impl fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentFilter(..)")
    }
}

/// Per-call load options
#[derive(Debug, Clone)]
pub struct AssetManagerLoaderSettings {
    /// Resolve nested content references while loading
    pub load_content_references: bool,
    /// Restricts which nested references are resolved
    pub content_filter: Option<ContentFilter>,
}

impl Default for AssetManagerLoaderSettings {
    fn default() -> Self {
        Self {
            load_content_references: true,
            content_filter: None,
        }
    }
}

impl AssetManagerLoaderSettings {
    /// Settings that leave every nested reference unresolved
    #[must_use]
    pub fn without_references() -> Self {
        Self {
            load_content_references: false,
            content_filter: None,
        }
    }

    /// Set whether nested references are resolved
    #[must_use]
    pub fn with_load_content_references(mut self, load: bool) -> Self {
        self.load_content_references = load;
        self
    }

    /// Only resolve references accepted by `filter`
    #[must_use]
    pub fn with_content_filter(mut self, filter: ContentFilter) -> Self {
        self.content_filter = Some(filter);
        self
    }

    /// Check whether the reference described by `info` should be resolved
    #[must_use]
    pub fn should_resolve(&self, info: &ReferenceInfo) -> bool {
        self.load_content_references
            && self
                .content_filter
                .as_ref()
                .is_none_or(|filter| filter.accepts(info))
    }
}

/// Asset manager configuration
#[derive(Debug, Clone, Default)]
pub struct AssetManagerConfig {
    /// Payload format used when saving
    pub format: ChunkFormat,
}

impl AssetManagerConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload format used when saving
    #[must_use]
    pub const fn with_format(mut self, format: ChunkFormat) -> Self {
        self.format = format;
        self
    }
}

/// Describe a reference target of type `T` at `location`
#[must_use]
pub fn reference_info<T: Asset>(location: impl Into<String>) -> ReferenceInfo {
    ReferenceInfo {
        location: location.into(),
        type_id: TypeId::of::<T>(),
        type_name: type_name::<T>(),
    }
}
