//! # rowstore
//!
//! A disk-backed B+Tree storage engine for fixed-size rows keyed by `u32`.
//!
//! ## Architecture
//!
//! The engine is composed of three layers, bottom up:
//!
//! - **Storage Layer** (`storage`): the database file, its 16-byte
//!   metadata header, page allocation and flush-on-close
//! - **Node Layer** (`node`): leaf and internal views over 4 KiB pages
//! - **B+Tree Layer** (`btree`): lookup, insertion with bottom-up split
//!   propagation, range scans and structural validation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowstore::{Config, Db};
//!
//! let config = Config::new("users.db", 68);
//! let db = Db::open(config)?;
//!
//! // Insert a row under its primary key
//! db.insert(1, &row_bytes)?;
//!
//! // Point lookup
//! let location = db.find(1)?;
//!
//! // Ordered range scan
//! for (key, row) in db.select(0, u32::MAX)? {
//!     println!("{key} -> {row:?}");
//! }
//! ```
//!
//! Rows are opaque to the engine: it stores exactly `row_size` bytes per
//! cell and hands them back verbatim. See [`row`] for the demo codec.

pub mod btree;
pub mod error;
pub mod node;
pub mod row;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{OpenMode, PageId, TreeConfig, PAGE_SIZE};

// Re-export main public API
pub use btree::{BTree, KeyLocation, TreeShape};
pub use node::{InternalNode, LeafNode};
pub use row::{Row, UserRow};
pub use storage::Pager;

use parking_lot::Mutex;
use std::path::PathBuf;

/// Database configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the database file
    pub path: PathBuf,
    /// How to open the file (default: `Create`)
    pub mode: OpenMode,
    /// Size in bytes of every stored row
    pub row_size: u32,
    /// Node load caps governing splits
    pub tree: TreeConfig,
}

impl Config {
    /// Create a new configuration with default settings
    pub fn new<P: Into<PathBuf>>(path: P, row_size: u32) -> Self {
        Self {
            path: path.into(),
            mode: OpenMode::Create,
            row_size,
            tree: TreeConfig::default(),
        }
    }

    /// Set the open mode
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the leaf load cap
    pub fn leaf_load(mut self, load: u32) -> Self {
        self.tree.leaf_load = load;
        self
    }

    /// Set the internal-node load cap
    pub fn inner_load(mut self, load: u32) -> Self {
        self.tree.inner_load = load;
        self
    }
}

/// Main database handle over the B+Tree engine.
///
/// The engine itself is strictly single-threaded; this handle serializes
/// callers through a lock so it can be shared where convenient.
pub struct Db {
    tree: Mutex<BTree>,
}

impl Db {
    /// Open or create a database per the configuration
    pub fn open(config: Config) -> Result<Self> {
        let tree = BTree::open(&config.path, config.mode, config.row_size, config.tree)?;
        Ok(Self {
            tree: Mutex::new(tree),
        })
    }

    /// Insert a row under its key.
    ///
    /// Returns `DuplicateKey` when the key is already present; the tree is
    /// left untouched in that case.
    pub fn insert(&self, key: u32, row: &[u8]) -> Result<()> {
        self.tree.lock().insert(key, row)
    }

    /// Locate a key
    pub fn find(&self, key: u32) -> Result<KeyLocation> {
        self.tree.lock().find(key)
    }

    /// Collect every `(key, row)` with `min <= key <= max`, in key order
    pub fn select(&self, min: u32, max: u32) -> Result<Vec<(u32, Vec<u8>)>> {
        self.tree.lock().select(min, max)
    }

    /// Flush all dirty pages and metadata to disk
    pub fn flush(&self) -> Result<()> {
        self.tree.lock().flush()
    }

    /// Verify the tree's structural invariants
    pub fn check_valid(&self) -> bool {
        self.tree.lock().check_valid()
    }

    /// Render every node's keys, level by level
    pub fn dump_keys(&self) -> Result<String> {
        self.tree.lock().dump_keys()
    }

    /// Export the tree structure for inspection
    pub fn tree_shape(&self) -> Result<TreeShape> {
        self.tree.lock().tree_shape()
    }

    /// Get statistics about the database
    pub fn stats(&self) -> DbStats {
        let tree = self.tree.lock();
        DbStats {
            num_pages: tree.num_pages(),
            root_page_id: tree.root_page_id(),
            row_size: tree.row_size(),
            cell_size: tree.row_size() + node::KEY_SIZE,
            leaf_load: tree.leaf_load(),
            inner_load: tree.inner_load(),
            leaf_capacity: LeafNode::raw_capacity(tree.row_size()),
            inner_capacity: InternalNode::raw_capacity(),
        }
    }
}

/// Database statistics and layout constants
#[derive(Debug, Clone)]
pub struct DbStats {
    /// Total number of allocated pages
    pub num_pages: u64,
    /// Page currently serving as root
    pub root_page_id: PageId,
    /// Configured row size in bytes
    pub row_size: u32,
    /// Bytes per leaf cell (key plus row)
    pub cell_size: u32,
    /// Effective leaf load cap
    pub leaf_load: u32,
    /// Effective internal load cap
    pub inner_load: u32,
    /// Page-derived leaf cell capacity
    pub leaf_capacity: u32,
    /// Page-derived internal key capacity
    pub inner_capacity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::USER_ROW_SIZE;
    use tempfile::tempdir;

    fn user_bytes(id: u32, name: &str, mail: &str) -> Vec<u8> {
        let row = UserRow::new(id, name, mail).unwrap();
        let mut buf = vec![0u8; USER_ROW_SIZE as usize];
        row.write_to(&mut buf);
        buf
    }

    #[test]
    fn test_basic_operations() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Db::open(Config::new(&path, USER_ROW_SIZE))?;

        db.insert(1, &user_bytes(1, "alice", "alice@google.com"))?;
        db.insert(2, &user_bytes(2, "bob", "bob@sina.com"))?;

        let loc = db.find(1)?;
        assert!(loc.exists);
        assert!(!db.find(3)?.exists);

        let rows = db.select(0, u32::MAX)?;
        assert_eq!(rows.len(), 2);
        let alice = UserRow::read_from(&rows[0].1);
        assert_eq!(alice.to_string(), "1,alice,alice@google.com");

        // duplicate rejected
        let err = db.insert(1, &user_bytes(1, "eve", "eve@x.com")).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(1)));

        assert!(db.check_valid());
        Ok(())
    }

    #[test]
    fn test_reopen_with_config_builder() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let db = Db::open(Config::new(&path, USER_ROW_SIZE).leaf_load(4).inner_load(6))?;
            for id in 0..100 {
                db.insert(id, &user_bytes(id, "user", "user@mail.com"))?;
            }
            db.flush()?;
        }

        let db = Db::open(
            Config::new(&path, USER_ROW_SIZE)
                .mode(OpenMode::Open)
                .leaf_load(4)
                .inner_load(6),
        )?;
        assert_eq!(db.select(0, u32::MAX)?.len(), 100);
        assert!(db.check_valid());

        let stats = db.stats();
        assert_eq!(stats.row_size, USER_ROW_SIZE);
        assert_eq!(stats.cell_size, USER_ROW_SIZE + 4);
        assert_eq!(stats.leaf_load, 4);
        assert!(stats.num_pages > 1);

        Ok(())
    }
}
