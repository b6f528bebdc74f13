//! Common types used throughout the storage engine.

mod page_id;

pub use page_id::PageId;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Size of the metadata header at the start of the database file
pub const METADATA_SIZE: usize = 16;

/// Addressable page ceiling. The page cache is a dense array with no
/// eviction, so this also bounds resident memory (256 MiB of pages).
pub const MAX_PAGES: u64 = 65_536;

/// Default leaf load cap; clamped to the page-derived capacity on open
pub const DEFAULT_LEAF_LOAD: u32 = 10_000;

/// Default internal-node load cap; clamped to the page-derived capacity
pub const DEFAULT_INNER_LOAD: u32 = 1_000;

/// How a database file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate and initialize a fresh database
    Create,
    /// Open an existing database; fails if the file is missing or empty
    Open,
}

/// Node kind, stored as the first byte of every page
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// Internal node: separator keys and child page ids
    Internal = 0,
    /// Leaf node: packed (key, row) cells
    Leaf = 1,
}

impl NodeType {
    /// Check if this is the leaf tag
    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf)
    }

    /// Convert from the on-page tag byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Internal),
            1 => Some(Self::Leaf),
            _ => None,
        }
    }
}

/// Per-node key-count caps used by the split logic.
///
/// A node splits when it reaches its load cap, which may sit below the raw
/// byte-derived page capacity. Small caps let tests exercise deep trees
/// with few keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
    /// Maximum cells per leaf node
    pub leaf_load: u32,
    /// Maximum keys per internal node
    pub inner_load: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            leaf_load: DEFAULT_LEAF_LOAD,
            inner_load: DEFAULT_INNER_LOAD,
        }
    }
}

impl TreeConfig {
    /// Create a new config with custom load caps
    pub fn new(leaf_load: u32, inner_load: u32) -> Self {
        Self {
            leaf_load,
            inner_load,
        }
    }

    /// Check that both caps are positive and even. Splits hand out exactly
    /// half of a full node to each side, so an odd cap cannot keep the
    /// non-root load floor.
    pub fn validate(&self) -> Result<()> {
        for (name, load) in [("leaf_load", self.leaf_load), ("inner_load", self.inner_load)] {
            if load == 0 {
                return Err(StorageError::invalid_config(format!("{name} must be positive")));
            }
            if load % 2 != 0 {
                return Err(StorageError::invalid_config(format!(
                    "{name} must be even, got {load}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_conversions() {
        assert!(NodeType::Leaf.is_leaf());
        assert!(!NodeType::Internal.is_leaf());

        assert_eq!(NodeType::from_byte(0), Some(NodeType::Internal));
        assert_eq!(NodeType::from_byte(1), Some(NodeType::Leaf));
        assert_eq!(NodeType::from_byte(7), None);
    }

    #[test]
    fn test_tree_config_validation() {
        assert!(TreeConfig::new(4, 6).validate().is_ok());
        assert!(TreeConfig::default().validate().is_ok());

        assert!(TreeConfig::new(0, 6).validate().is_err());
        assert!(TreeConfig::new(4, 0).validate().is_err());
        assert!(TreeConfig::new(5, 6).validate().is_err());
        assert!(TreeConfig::new(4, 7).validate().is_err());
    }
}
