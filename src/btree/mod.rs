//! B+Tree implementation.
//!
//! This module provides the tree algorithm on top of the pager and the
//! node views: point lookup, duplicate-free insertion with bottom-up
//! split propagation, ordered range scans, and structural diagnostics.

mod check;
mod tree;

pub use check::TreeShape;
pub use tree::{BTree, KeyLocation};
