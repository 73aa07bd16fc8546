//! Content storage
//!
//! Provides the byte-level backends the asset manager reads from and writes to:
//! - A store interface over `/`-delimited virtual paths
//! - In-memory and filesystem backends
//! - A content-addressed object database with a location index

mod database;
mod file;
mod memory;
mod object_id;
mod store;

pub use database::{BlobWriter, ObjectDatabase};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use object_id::ObjectId;
pub use store::{ContentStore, StoreError, join_path, normalize_path};
