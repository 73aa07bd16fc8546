//! Content store interface
//!
//! A content store maps `/`-delimited virtual paths to byte streams. Backends
//! do not interpret the bytes they hold.

use std::io::{Read, Write};

use thiserror::Error;

/// Errors raised by content stores and the object database
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing is stored at the path or location
    #[error("no content at `{0}`")]
    NotFound(String),
    /// The path escapes the store root or is otherwise malformed
    #[error("invalid virtual path `{0}`")]
    InvalidPath(String),
    /// The index file could not be parsed
    #[error("corrupt index entry `{0}`")]
    CorruptIndex(String),
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte storage addressed by virtual paths.
///
/// Concurrent writes to the same path must be serialized by the caller.
pub trait ContentStore: Send + Sync {
    /// Open the content at `path` for reading
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored at `path`
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    /// Open `path` for writing, replacing any previous content
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or cannot be created
    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, StoreError>;

    /// Check whether content exists at `path`
    fn exists(&self, path: &str) -> bool;

    /// Create a directory (and its parents) at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created
    fn create_directory(&self, path: &str) -> Result<(), StoreError>;

    /// Remove the content at `path`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored at `path`
    fn remove(&self, path: &str) -> Result<(), StoreError>;
}

/// Normalize a virtual path to the `/a/b/c` form.
///
/// Empty and `.` segments are dropped, `..` pops a segment.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] if `..` would leave the root
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StoreError::InvalidPath(path.to_string()));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Join a virtual directory and a relative path
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] if the result escapes the root
pub fn join_path(base: &str, relative: &str) -> Result<String, StoreError> {
    normalize_path(&format!("{base}/{relative}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("data//db/./index").unwrap(), "/data/db/index");
        assert_eq!(normalize_path("/a/b/../c").unwrap(), "/a/c");
        assert_eq!(normalize_path("").unwrap(), "/");
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(matches!(
            normalize_path("/a/../../etc"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/data/db", "objects/ab").unwrap(), "/data/db/objects/ab");
    }
}
