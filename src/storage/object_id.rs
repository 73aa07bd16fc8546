//! Content identity for stored blobs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace used to derive object ids from blob bytes
const OBJECT_NAMESPACE: Uuid = Uuid::from_u128(0x6c2f_3a1e_9b47_4d0c_a5e8_2f61_b0d4_c973);

/// Identity of a stored blob, independent of the location it is indexed under.
///
/// Two blobs with identical bytes always share the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// The id of no content
    pub const EMPTY: Self = Self(Uuid::nil());

    /// Compute the id of the given blob bytes
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        Self(Uuid::new_v5(&OBJECT_NAMESPACE, bytes))
    }

    /// Check whether this is the empty id
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
