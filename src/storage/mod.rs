//! Storage layer: the database file and its page cache.
//!
//! This module owns all file I/O: the 16-byte metadata header, page
//! allocation, and reading/writing 4 KiB pages at their fixed offsets.

mod metadata;
mod pager;

pub use metadata::Metadata;
pub use pager::Pager;
