//! B+Tree core implementation.
//!
//! The tree stores fixed-size rows keyed by `u32` in leaf pages and
//! routes lookups through internal pages of separator keys. Each
//! separator is the maximum key of the subtree to its left, so an exact
//! match during descent goes left. Splits propagate bottom-up along the
//! on-page parent pointers, growing a new root when they reach the top.

use crate::error::{Result, StorageError};
use crate::node::{InternalNode, LeafNode, Node, NodeOps};
use crate::storage::Pager;
use crate::types::{OpenMode, PageId, TreeConfig};
use log::debug;
use std::path::Path;

/// Where a key lives (or would live) in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLocation {
    /// Leaf page that holds or would hold the key
    pub page_id: PageId,
    /// Cell index of the key, or the slot it would be inserted at
    pub slot: u32,
    /// Whether the key is present
    pub exists: bool,
}

/// A disk-backed B+Tree over fixed-size rows
#[derive(Debug)]
pub struct BTree {
    pub(crate) pager: Pager,
    row_size: u32,
    /// Effective leaf cell cap: configured load clamped to page capacity
    leaf_load: u32,
    /// Effective internal key cap
    inner_load: u32,
}

impl BTree {
    /// Open a tree at `path`.
    ///
    /// `Create` starts an empty tree whose root is a fresh leaf on page 0.
    /// `Open` loads the root recorded in the file metadata and verifies it
    /// stores rows of the configured size.
    pub fn open(path: &Path, mode: OpenMode, row_size: u32, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let leaf_capacity = LeafNode::raw_capacity(row_size);
        if row_size == 0 || leaf_capacity == 0 {
            return Err(StorageError::invalid_config(format!(
                "row size {row_size} does not fit a page"
            )));
        }

        let leaf_load = config.leaf_load.min(leaf_capacity);
        let inner_load = config.inner_load.min(InternalNode::raw_capacity());

        let mut pager = Pager::open(path, mode)?;
        match mode {
            OpenMode::Create => {
                let root_id = pager.allocate_page()?;
                let page = pager.get_page(root_id)?;
                let mut leaf = LeafNode::init(page, row_size)?;
                leaf.set_root(true);
                pager.set_root_page_id(root_id);
            }
            OpenMode::Open => {
                let root_id = pager.root_page_id();
                let page = pager.get_page(root_id)?;
                let node = Node::attach(root_id, page)?;
                if !node.is_root() {
                    return Err(StorageError::corrupt(root_id, "root flag not set"));
                }
                if let Node::Leaf(leaf) = &node {
                    if leaf.row_size() != row_size {
                        return Err(StorageError::invalid_config(format!(
                            "database stores {}-byte rows, engine configured for {row_size}",
                            leaf.row_size()
                        )));
                    }
                }
            }
        }

        Ok(Self {
            pager,
            row_size,
            leaf_load,
            inner_load,
        })
    }

    /// Size of the value portion of each cell
    pub fn row_size(&self) -> u32 {
        self.row_size
    }

    /// Effective leaf load cap
    pub fn leaf_load(&self) -> u32 {
        self.leaf_load
    }

    /// Effective internal load cap
    pub fn inner_load(&self) -> u32 {
        self.inner_load
    }

    /// Id of the page currently serving as root
    pub fn root_page_id(&self) -> PageId {
        self.pager.root_page_id()
    }

    /// Total allocated pages
    pub fn num_pages(&self) -> u64 {
        self.pager.num_pages()
    }

    /// Locate a key, descending from the root.
    ///
    /// On a miss the returned slot is where the key would be inserted in
    /// its target leaf.
    pub fn find(&mut self, key: u32) -> Result<KeyLocation> {
        let mut page_id = self.pager.root_page_id();
        loop {
            let page = self.pager.get_page(page_id)?;
            match Node::attach(page_id, page)? {
                Node::Leaf(leaf) => {
                    // only an empty root reaches here with no cells
                    if leaf.num_cells() == 0 {
                        return Ok(KeyLocation {
                            page_id,
                            slot: 0,
                            exists: false,
                        });
                    }
                    let pos = leaf.search_key_position(key);
                    if pos >= 0 && leaf.key_at(pos as u32) == key {
                        return Ok(KeyLocation {
                            page_id,
                            slot: pos as u32,
                            exists: true,
                        });
                    }
                    return Ok(KeyLocation {
                        page_id,
                        slot: (pos + 1) as u32,
                        exists: false,
                    });
                }
                Node::Internal(node) => {
                    let pos = node.search_key_position(key);
                    // a separator equals the max of its left subtree, so
                    // an exact match descends left
                    page_id = if pos >= 0 && node.key_at(pos as u32) == key {
                        node.child_at(pos as u32)
                    } else {
                        node.child_at((pos + 1) as u32)
                    };
                }
            }
        }
    }

    /// Insert a (key, row) pair.
    ///
    /// Returns `DuplicateKey` without mutating anything when the key is
    /// already present.
    pub fn insert(&mut self, key: u32, row: &[u8]) -> Result<()> {
        if row.len() != self.row_size as usize {
            return Err(StorageError::RowSizeMismatch {
                expected: self.row_size,
                got: row.len(),
            });
        }

        let loc = self.find(key)?;
        if loc.exists {
            return Err(StorageError::DuplicateKey(key));
        }

        // fast path: room in the target leaf
        {
            let page = self.pager.get_page(loc.page_id)?;
            let mut leaf = LeafNode::attach(loc.page_id, page)?;
            leaf.set_load(self.leaf_load);
            if !leaf.is_full() {
                leaf.insert(key, row);
                return Ok(());
            }
        }

        // leaf is at its load cap: split and push the pivot upward
        let new_id = self.pager.allocate_page()?;
        let (old_page, new_page) = self.pager.get_page_pair(loc.page_id, new_id)?;
        let mut leaf = LeafNode::attach(loc.page_id, old_page)?;
        leaf.set_load(self.leaf_load);
        let parent = leaf.parent();
        let pivot = leaf.insert_and_split(key, row, new_page)?;
        debug!("leaf {} split, new leaf {new_id}, pivot {pivot}", loc.page_id);

        self.propagate_split(pivot, loc.page_id, new_id, parent)
    }

    /// Walk the parent chain inserting `(pivot, left, right)`, splitting
    /// full internal nodes as needed and growing a new root when the
    /// chain runs out.
    fn propagate_split(
        &mut self,
        mut pivot: u32,
        mut left: PageId,
        mut right: PageId,
        mut parent: PageId,
    ) -> Result<()> {
        while !parent.is_none() {
            let grand;
            let fits;
            {
                let page = self.pager.get_page(parent)?;
                let mut node = InternalNode::attach(page);
                node.set_load(self.inner_load);
                grand = node.parent();
                fits = !node.is_full();
                if fits {
                    node.insert(pivot, left, right);
                }
            }

            if fits {
                // left was already a child of this node
                self.link(right, parent)?;
                return Ok(());
            }

            let new_id = self.pager.allocate_page()?;
            let (old_page, new_page) = self.pager.get_page_pair(parent, new_id)?;
            let mut node = InternalNode::attach(old_page);
            node.set_load(self.inner_load);
            let new_pivot = node.insert_and_split(pivot, left, right, new_page);
            debug!("internal {parent} split, new node {new_id}, pivot {new_pivot}");

            // the pending children land on whichever side of the new
            // pivot they sorted into; on a tie the left child stays and
            // the right child opens the new node
            if pivot < new_pivot {
                self.link(left, parent)?;
                self.link(right, parent)?;
            } else if pivot > new_pivot {
                self.link(left, new_id)?;
                self.link(right, new_id)?;
            } else {
                self.link(left, parent)?;
                self.link(right, new_id)?;
            }
            self.adopt_children(new_id)?;

            pivot = new_pivot;
            left = parent;
            right = new_id;
            parent = grand;
        }

        // the chain ran out while still carrying a pending separator:
        // grow a new root above (left, right)
        let new_root = self.pager.allocate_page()?;
        {
            let page = self.pager.get_page(new_root)?;
            let mut node = InternalNode::init(page);
            node.set_load(self.inner_load);
            node.insert(pivot, left, right);
        }
        self.link(left, new_root)?;
        self.link(right, new_root)?;
        self.update_root(new_root)
    }

    /// Point `child`'s parent field at `parent`
    fn link(&mut self, child: PageId, parent: PageId) -> Result<()> {
        let page = self.pager.get_page(child)?;
        let mut node = Node::attach(child, page)?;
        node.set_parent(parent);
        Ok(())
    }

    /// Re-parent every child of an internal node to it. Run after a split
    /// hands children over to the new right node.
    fn adopt_children(&mut self, node_id: PageId) -> Result<()> {
        let children: Vec<PageId> = {
            let page = self.pager.get_page(node_id)?;
            let node = InternalNode::attach(page);
            (0..=node.num_keys()).map(|i| node.child_at(i)).collect()
        };
        for child in children {
            self.link(child, node_id)?;
        }
        Ok(())
    }

    /// Install a new root: clear the old root's flag, record the new id
    /// in the pager metadata, and mark the new root.
    fn update_root(&mut self, new_root: PageId) -> Result<()> {
        let old_root = self.pager.root_page_id();
        {
            let page = self.pager.get_page(old_root)?;
            let mut node = Node::attach(old_root, page)?;
            node.set_root(false);
        }

        self.pager.set_root_page_id(new_root);
        let page = self.pager.get_page(new_root)?;
        let mut node = Node::attach(new_root, page)?;
        node.set_root(true);
        node.set_parent(PageId::NONE);
        debug!("root grew to page {new_root}");
        Ok(())
    }

    /// Collect every cell with `min <= key <= max`, in key order.
    pub fn select(&mut self, min: u32, max: u32) -> Result<Vec<(u32, Vec<u8>)>> {
        let mut out = Vec::new();
        self.collect_range(self.pager.root_page_id(), min, max, &mut out)?;
        Ok(out)
    }

    fn collect_range(
        &mut self,
        page_id: PageId,
        min: u32,
        max: u32,
        out: &mut Vec<(u32, Vec<u8>)>,
    ) -> Result<()> {
        let children: Vec<PageId> = {
            let page = self.pager.get_page(page_id)?;
            match Node::attach(page_id, page)? {
                Node::Leaf(leaf) => {
                    for i in 0..leaf.num_cells() {
                        let key = leaf.key_at(i);
                        if key >= min && key <= max {
                            out.push((key, leaf.value_at(i).to_vec()));
                        }
                    }
                    return Ok(());
                }
                Node::Internal(node) => {
                    let n = node.num_keys();
                    // smallest separator >= min bounds the leftmost child,
                    // largest separator < max bounds the rightmost
                    let mut first = n;
                    for i in 0..n {
                        if node.key_at(i) >= min {
                            first = i;
                            break;
                        }
                    }
                    let mut last = -1i64;
                    for i in (0..n).rev() {
                        if node.key_at(i) < max {
                            last = i as i64;
                            break;
                        }
                    }
                    (first..=(last + 1) as u32).map(|i| node.child_at(i)).collect()
                }
            }
        };

        for child in children {
            self.collect_range(child, min, max, out)?;
        }
        Ok(())
    }

    /// Flush all cached state through the pager
    pub fn flush(&mut self) -> Result<()> {
        self.pager.flush()
    }

    /// Flush and close the underlying file
    pub fn close(self) -> Result<()> {
        let Self { pager, .. } = self;
        pager.close()
    }
}
