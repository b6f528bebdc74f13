//! Pager: owns the database file and its in-memory page cache.
//!
//! The pager serves 4 KiB page buffers by id, allocates new pages, and
//! persists everything on flush. Repeated `get_page` calls within a
//! session return the same cached buffer, so mutations made through one
//! node view are visible to the next view of the same page. Pages are
//! never evicted; `MAX_PAGES` bounds the cache.

use crate::error::{Result, StorageError};
use crate::node::PageBuf;
use crate::storage::Metadata;
use crate::types::{OpenMode, PageId, MAX_PAGES, METADATA_SIZE};
use log::{trace, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A cached page
#[derive(Debug)]
struct Frame {
    buf: Box<PageBuf>,
    dirty: bool,
}

/// File-backed page manager
#[derive(Debug)]
pub struct Pager {
    /// The database file
    file: File,
    /// Cached metadata; rewritten eagerly on allocation, otherwise at flush
    meta: Metadata,
    /// Page cache, indexed densely by page id
    frames: Vec<Option<Frame>>,
    /// Set once `close` has run, so drop does not flush again
    closed: bool,
}

impl Pager {
    /// Open a database file.
    ///
    /// `Create` truncates and writes a fresh metadata header. `Open`
    /// requires an existing file carrying a header and reads it back.
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        match mode {
            OpenMode::Create => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| StorageError::io("create database file", e))?;

                let mut pager = Self {
                    file,
                    meta: Metadata::new(),
                    frames: Vec::new(),
                    closed: false,
                };
                pager.write_metadata()?;
                Ok(pager)
            }
            OpenMode::Open => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .map_err(|e| match e.kind() {
                        std::io::ErrorKind::NotFound => StorageError::invalid_mode(format!(
                            "cannot open missing database file {}",
                            path.display()
                        )),
                        _ => StorageError::io("open database file", e),
                    })?;

                let len = file
                    .metadata()
                    .map_err(|e| StorageError::io("stat database file", e))?
                    .len();
                if len < METADATA_SIZE as u64 {
                    return Err(StorageError::invalid_mode(format!(
                        "database file {} has no metadata header",
                        path.display()
                    )));
                }

                let mut pager = Self {
                    file,
                    meta: Metadata::new(),
                    frames: Vec::new(),
                    closed: false,
                };
                pager.meta = pager.read_metadata()?;
                pager.frames.resize_with(pager.meta.num_pages as usize, || None);
                Ok(pager)
            }
        }
    }

    /// Number of allocated pages
    pub fn num_pages(&self) -> u64 {
        self.meta.num_pages
    }

    /// Id of the page currently serving as root
    pub fn root_page_id(&self) -> PageId {
        self.meta.root_page_id
    }

    /// Record a new root page id. Durable at the next flush; the
    /// allocation path flushes metadata as a side effect.
    pub fn set_root_page_id(&mut self, id: PageId) {
        self.meta.root_page_id = id;
    }

    /// Get a mutable view of page `id`, reading it from disk on first
    /// access within this session.
    pub fn get_page(&mut self, id: PageId) -> Result<&mut PageBuf> {
        self.ensure_loaded(id)?;
        let frame = self.frames[id.value() as usize]
            .as_mut()
            .ok_or(StorageError::PageNotFound(id))?;
        frame.dirty = true;
        Ok(&mut frame.buf)
    }

    /// Get mutable views of two distinct pages at once.
    ///
    /// Split paths interpret the donor page and the freshly allocated page
    /// together; this is the only sanctioned two-page borrow.
    pub fn get_page_pair(&mut self, a: PageId, b: PageId) -> Result<(&mut PageBuf, &mut PageBuf)> {
        debug_assert_ne!(a, b);
        self.ensure_loaded(a)?;
        self.ensure_loaded(b)?;

        let (ai, bi) = (a.value() as usize, b.value() as usize);
        let (lo, hi) = if ai < bi { (ai, bi) } else { (bi, ai) };
        let (head, tail) = self.frames.split_at_mut(hi);

        let lo_frame = head[lo].as_mut().ok_or(StorageError::PageNotFound(a))?;
        let hi_frame = tail[0].as_mut().ok_or(StorageError::PageNotFound(b))?;
        lo_frame.dirty = true;
        hi_frame.dirty = true;

        if ai < bi {
            Ok((&mut lo_frame.buf, &mut hi_frame.buf))
        } else {
            Ok((&mut hi_frame.buf, &mut lo_frame.buf))
        }
    }

    /// Allocate a new zero-filled page and return its id.
    ///
    /// The updated metadata header is written immediately so a crash loses
    /// at most unflushed page contents, never the allocation count.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if self.meta.num_pages >= MAX_PAGES {
            return Err(StorageError::CapacityExceeded { limit: MAX_PAGES });
        }

        let id = PageId::new(self.meta.num_pages);
        self.meta.num_pages += 1;
        self.frames.push(Some(Frame {
            buf: Box::new(PageBuf::new()),
            dirty: true,
        }));
        self.write_metadata()?;

        trace!("allocated page {id}");
        Ok(id)
    }

    /// Write every dirty cached page, then the metadata header
    pub fn flush(&mut self) -> Result<()> {
        for idx in 0..self.frames.len() {
            let offset = PageId::new(idx as u64).file_offset();
            if let Some(frame) = self.frames[idx].as_mut() {
                if !frame.dirty {
                    continue;
                }
                self.file
                    .seek(SeekFrom::Start(offset))
                    .map_err(|e| StorageError::io("seek page", e))?;
                self.file
                    .write_all(frame.buf.as_bytes())
                    .map_err(|e| StorageError::io("write page", e))?;
                frame.dirty = false;
                trace!("flushed page {idx}");
            }
        }
        self.write_metadata()
    }

    /// Flush and close the file descriptor
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Load page `id` into the cache if it is not already resident
    fn ensure_loaded(&mut self, id: PageId) -> Result<()> {
        if id.value() >= self.meta.num_pages {
            return Err(StorageError::PageNotFound(id));
        }

        let idx = id.value() as usize;
        if self.frames[idx].is_some() {
            return Ok(());
        }

        let mut buf = Box::new(PageBuf::new());
        self.file
            .seek(SeekFrom::Start(id.file_offset()))
            .map_err(|e| StorageError::io("seek page", e))?;
        read_full(&mut self.file, buf.as_bytes_mut())
            .map_err(|e| StorageError::io("read page", e))?;

        trace!("loaded page {id}");
        self.frames[idx] = Some(Frame { buf, dirty: false });
        Ok(())
    }

    fn read_metadata(&mut self) -> Result<Metadata> {
        let mut bytes = [0u8; METADATA_SIZE];
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StorageError::io("seek metadata", e))?;
        self.file
            .read_exact(&mut bytes)
            .map_err(|e| StorageError::io("read metadata", e))?;
        Ok(Metadata::read(&bytes))
    }

    fn write_metadata(&mut self) -> Result<()> {
        let mut bytes = [0u8; METADATA_SIZE];
        self.meta.write(&mut bytes);
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StorageError::io("seek metadata", e))?;
        self.file
            .write_all(&bytes)
            .map_err(|e| StorageError::io("write metadata", e))?;
        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!("flush on drop failed: {e}");
            }
        }
    }
}

/// Fill `buf` from the file's current position, looping over short reads.
/// EOF mid-page leaves the tail zeroed, which is how a freshly allocated
/// page that was never written reads back.
fn read_full(file: &mut File, mut buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while !buf.is_empty() {
        let n = file.read(buf)?;
        if n == 0 {
            break;
        }
        total += n;
        buf = &mut buf[n..];
    }
    Ok(total)
}
