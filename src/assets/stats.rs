//! Registry statistics

use std::fmt;

/// Bookkeeping snapshot of one loaded instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAssetStats {
    /// Location the instance was loaded from or saved to
    pub location: String,
    /// Registered type name of the instance
    pub type_name: String,
    /// Root loads and saves holding the instance
    pub public_count: usize,
    /// Distinct parents holding the instance through a content reference
    pub private_count: usize,
}

impl LoadedAssetStats {
    /// Total reference count
    #[must_use]
    pub const fn reference_count(&self) -> usize {
        self.public_count + self.private_count
    }
}

/// Snapshot of every live record in a registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManagerStats {
    assets: Vec<LoadedAssetStats>,
}

impl AssetManagerStats {
    /// Create a snapshot from per-record entries
    #[must_use]
    pub fn new(assets: Vec<LoadedAssetStats>) -> Self {
        Self { assets }
    }

    /// Per-record entries, sorted by location
    #[must_use]
    pub fn assets(&self) -> &[LoadedAssetStats] {
        &self.assets
    }

    /// Entry for `location`, if loaded
    #[must_use]
    pub fn find(&self, location: &str) -> Option<&LoadedAssetStats> {
        self.assets.iter().find(|entry| entry.location == location)
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check if nothing is loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl fmt::Display for AssetManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} loaded object(s)", self.assets.len())?;
        for entry in &self.assets {
            writeln!(
                f,
                "  {} [{}] public={} private={}",
                entry.location, entry.type_name, entry.public_count, entry.private_count
            )?;
        }
        Ok(())
    }
}
