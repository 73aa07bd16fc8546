//! Per-call serialization context

use super::serializer::ChunkFormat;

/// Direction of a serialization call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveMode {
    /// Writing an in-memory object to a stream
    Serialize,
    /// Filling an object from a stream
    Deserialize,
}

/// State shared with a serializer for one object
#[derive(Debug, Clone)]
pub struct SerializerContext {
    location: String,
    mode: ArchiveMode,
    format: ChunkFormat,
    load_content_references: bool,
}

impl SerializerContext {
    /// Create a context for the object stored at `location`
    #[must_use]
    pub fn new(location: impl Into<String>, mode: ArchiveMode, format: ChunkFormat) -> Self {
        Self {
            location: location.into(),
            mode,
            format,
            load_content_references: true,
        }
    }

    /// Set whether nested content references will be resolved after this load
    #[must_use]
    pub fn with_load_content_references(mut self, load: bool) -> Self {
        self.load_content_references = load;
        self
    }

    /// Location of the object being processed
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Direction of the call
    #[must_use]
    pub const fn mode(&self) -> ArchiveMode {
        self.mode
    }

    /// Payload format of the chunk
    #[must_use]
    pub const fn format(&self) -> ChunkFormat {
        self.format
    }

    /// Whether nested content references will be resolved
    #[must_use]
    pub const fn load_content_references(&self) -> bool {
        self.load_content_references
    }
}
