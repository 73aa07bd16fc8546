//! Chunk header
//!
//! Every stored object starts with a single JSON line describing the stored
//! type, the payload format and the content references the object holds,
//! followed by the payload itself.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use super::serializer::{ChunkFormat, SerializeError};
use crate::storage::ObjectId;

/// A content reference recorded in a chunk header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReference {
    /// Location of the referenced content
    pub location: String,
    /// Content id of the referenced blob, when it was known at save time
    pub id: Option<ObjectId>,
    /// Runtime type name of the reference target
    pub type_name: String,
}

/// Header written in front of every stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Header layout version
    pub version: u32,
    /// Registered name of the type that was saved
    pub type_name: String,
    /// Encoding of the payload
    pub format: ChunkFormat,
    /// Outgoing content references, in visiting order
    #[serde(default)]
    pub references: Vec<ChunkReference>,
}

impl ChunkHeader {
    /// Current header layout version
    pub const VERSION: u32 = 1;

    /// Create a header without references
    #[must_use]
    pub fn new(type_name: impl Into<String>, format: ChunkFormat) -> Self {
        Self {
            version: Self::VERSION,
            type_name: type_name.into(),
            format,
            references: Vec::new(),
        }
    }

    /// Write the header line
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails
    pub fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        serde_json::to_writer(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Read the header line, leaving the reader at the start of the payload
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::InvalidHeader`] if the line is missing,
    /// malformed or from an unknown layout version
    pub fn read(reader: &mut dyn BufRead) -> Result<Self, SerializeError> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(SerializeError::InvalidHeader("empty stream".to_string()));
        }

        let header: Self = serde_json::from_str(line.trim_end())
            .map_err(|e| SerializeError::InvalidHeader(e.to_string()))?;
        if header.version != Self::VERSION {
            return Err(SerializeError::InvalidHeader(format!(
                "unsupported version {}",
                header.version
            )));
        }
        Ok(header)
    }
}
