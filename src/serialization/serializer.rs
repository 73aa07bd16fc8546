//! Serializer trait and the serde-backed default serializer
//!
//! Payloads are written as RON (Rusty Object Notation) or JSON, the same two
//! formats the engine uses for scenes.

use std::io::{Read, Write};
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::SerializerContext;

/// Payload encoding of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChunkFormat {
    /// Rusty Object Notation, pretty-printed
    #[default]
    Ron,
    /// JSON
    Json,
}

/// Errors that can occur while converting objects to or from streams
#[derive(Debug, Error)]
pub enum SerializeError {
    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// RON encoding failed
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
    /// RON decoding failed
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
    /// Stream failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The chunk header is missing or unreadable
    #[error("invalid chunk header: {0}")]
    InvalidHeader(String),
    /// The serializer was handed an object of another type
    #[error("serializer for `{expected}` cannot handle this object")]
    TypeMismatch {
        /// Type the serializer was registered for
        expected: String,
    },
    /// Serializer-specific failure
    #[error("{0}")]
    Custom(String),
}

/// Converts objects of type `T` to and from byte streams.
///
/// Loading happens in two steps: [`construct`](Self::construct) creates the
/// instance, then [`deserialize`](Self::deserialize) fills it. Types without a
/// default value provide their own serializer to control construction.
pub trait ContentSerializer<T>: Send + Sync + 'static {
    /// Write `object` to `writer`
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails
    fn serialize(
        &self,
        context: &SerializerContext,
        writer: &mut dyn Write,
        object: &T,
    ) -> Result<(), SerializeError>;

    /// Create the instance a load will fill
    ///
    /// # Errors
    ///
    /// Returns an error if no instance can be created in this context
    fn construct(&self, context: &SerializerContext) -> Result<T, SerializeError>;

    /// Fill `object` from `reader`
    ///
    /// # Errors
    ///
    /// Returns an error if reading or decoding fails
    fn deserialize(
        &self,
        context: &SerializerContext,
        reader: &mut dyn Read,
        object: &mut T,
    ) -> Result<(), SerializeError>;
}

/// Encode `value` in the context's payload format
///
/// # Errors
///
/// Returns an error if encoding or writing fails
pub fn write_payload<V: Serialize>(
    context: &SerializerContext,
    writer: &mut dyn Write,
    value: &V,
) -> Result<(), SerializeError> {
    match context.format() {
        ChunkFormat::Ron => {
            let text = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?;
            writer.write_all(text.as_bytes())?;
        }
        ChunkFormat::Json => serde_json::to_writer_pretty(writer, value)?,
    }
    Ok(())
}

/// Decode a value in the context's payload format
///
/// # Errors
///
/// Returns an error if reading or decoding fails
pub fn read_payload<V: DeserializeOwned>(
    context: &SerializerContext,
    reader: &mut dyn Read,
) -> Result<V, SerializeError> {
    match context.format() {
        ChunkFormat::Ron => {
            let mut text = String::new();
            reader.read_to_string(&mut text)?;
            Ok(ron::from_str(&text)?)
        }
        ChunkFormat::Json => Ok(serde_json::from_reader(reader)?),
    }
}

/// Default serializer for serde types with a default value
pub struct SerdeSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeSerializer<T> {
    /// Create the serializer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ContentSerializer<T> for SerdeSerializer<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    fn serialize(
        &self,
        context: &SerializerContext,
        writer: &mut dyn Write,
        object: &T,
    ) -> Result<(), SerializeError> {
        write_payload(context, writer, object)
    }

    fn construct(&self, _context: &SerializerContext) -> Result<T, SerializeError> {
        Ok(T::default())
    }

    fn deserialize(
        &self,
        context: &SerializerContext,
        reader: &mut dyn Read,
        object: &mut T,
    ) -> Result<(), SerializeError> {
        *object = read_payload(context, reader)?;
        Ok(())
    }
}
