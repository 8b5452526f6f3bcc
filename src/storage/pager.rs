//! # Buffer Pool
//!
//! A fixed-page buffer pool over a single backing file. Pages are
//! addressed by page number only — nothing ever holds a reference
//! into another page's frame, so there is no cyclic ownership to
//! reason about, just a flat table of frames plus page-number edges
//! between them.
//!
//! Eviction follows a simple LRU policy driven by a monotonic logical
//! clock (`timer`) rather than wall time, so behavior is deterministic
//! and testable: the unpinned frame with the smallest `last_used` is
//! evicted, ties broken in favor of the lowest page number.

use crate::err;
use crate::errors::Error;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{trace, warn};

pub const PAGE_SIZE: usize = 4096;
pub const MAX_PAGES_IN_MEMORY: usize = 100;
pub const TABLE_MAX_PAGES: u32 = 1000;

struct Frame {
    data: [u8; PAGE_SIZE],
    dirty: bool,
    pinned: u32,
    last_used: u64,
}

/// Owns the backing file and the resident set of page frames.
pub struct Pager {
    file: File,
    num_pages: u32,
    frames: HashMap<u32, Frame>,
    timer: u64,
}

impl Pager {
    /// Opens (creating if absent) the backing file and computes the
    /// current page count from its length.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;

        Ok(Pager {
            file,
            num_pages,
            frames: HashMap::new(),
            timer: 0,
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// For now we assume that in a pager with N pages, page numbers 0
    /// through N-1 are allocated, so page number N is always free.
    /// After delete support gains rebalancing this could reclaim holes
    /// instead.
    pub fn get_unused_page_num(&self) -> u32 {
        self.num_pages
    }

    fn evict_one(&mut self) -> Result<(), Error> {
        let victim = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.pinned == 0)
            .min_by_key(|(&page_num, frame)| (frame.last_used, page_num))
            .map(|(&page_num, _)| page_num);

        let victim = victim.ok_or(Error::BufferExhausted)?;
        self.flush(victim)?;
        self.frames.remove(&victim);
        trace!(page_num = victim, "evicted page");
        Ok(())
    }

    fn ensure_resident(&mut self, page_num: u32) -> Result<(), Error> {
        if page_num >= TABLE_MAX_PAGES {
            return Err(err!(
                Storage,
                "page number {} exceeds TABLE_MAX_PAGES",
                page_num
            ));
        }

        self.timer += 1;
        let timer = self.timer;

        if !self.frames.contains_key(&page_num) {
            if self.frames.len() >= MAX_PAGES_IN_MEMORY {
                self.evict_one()?;
            }

            let mut data = [0u8; PAGE_SIZE];
            if page_num < self.num_pages {
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut data)?;
            } else {
                self.num_pages = page_num + 1;
            }

            self.frames.insert(
                page_num,
                Frame {
                    data,
                    dirty: false,
                    pinned: 0,
                    last_used: timer,
                },
            );
            trace!(page_num, "paged in");
        }

        let frame = self.frames.get_mut(&page_num).expect("just inserted");
        frame.last_used = timer;
        frame.pinned += 1;
        Ok(())
    }

    /// Reads a page, pinning it. Callers are expected to `unpin` once
    /// they are done with the returned copy.
    pub fn read(&mut self, page_num: u32) -> Result<[u8; PAGE_SIZE], Error> {
        self.ensure_resident(page_num)?;
        Ok(self.frames[&page_num].data)
    }

    /// Overwrites a page's contents and marks it dirty, pinning it in
    /// the process.
    pub fn write(&mut self, page_num: u32, data: &[u8; PAGE_SIZE]) -> Result<(), Error> {
        self.ensure_resident(page_num)?;
        let frame = self.frames.get_mut(&page_num).expect("just ensured");
        frame.data = *data;
        frame.dirty = true;
        Ok(())
    }

    pub fn mark_dirty(&mut self, page_num: u32) {
        if let Some(frame) = self.frames.get_mut(&page_num) {
            frame.dirty = true;
        }
    }

    pub fn pin(&mut self, page_num: u32) {
        if let Some(frame) = self.frames.get_mut(&page_num) {
            frame.pinned += 1;
        }
    }

    pub fn unpin(&mut self, page_num: u32) {
        if let Some(frame) = self.frames.get_mut(&page_num) {
            frame.pinned = frame.pinned.saturating_sub(1);
        }
    }

    pub fn unpin_all(&mut self) {
        for frame in self.frames.values_mut() {
            frame.pinned = 0;
        }
    }

    /// Writes a page to disk if it is resident and dirty, then clears
    /// the dirty flag.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let Some(frame) = self.frames.get_mut(&page_num) else {
            return Ok(());
        };
        if !frame.dirty {
            return Ok(());
        }

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&frame.data)?;
        frame.dirty = false;
        Ok(())
    }

    /// Flushes every resident dirty page. Called on table close.
    pub fn flush_all(&mut self) -> Result<(), Error> {
        let page_nums: Vec<u32> = self.frames.keys().copied().collect();
        for page_num in page_nums {
            if let Err(e) = self.flush(page_num) {
                warn!(page_num, "failed to flush page: {}", e);
                return Err(e);
            }
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Whether `page_num` currently occupies a resident frame.
    pub fn is_resident(&self, page_num: u32) -> bool {
        self.frames.contains_key(&page_num)
    }

    /// Count of frames currently resident, for bounding against
    /// `MAX_PAGES_IN_MEMORY`.
    pub fn resident_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_pins_and_reads_back_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("p.db")).unwrap();

        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0x42;
        pager.write(0, &page).unwrap();
        pager.unpin(0);

        let back = pager.read(0).unwrap();
        assert_eq!(back[0], 0x42);
        pager.unpin(0);
    }

    #[test]
    fn eviction_picks_lru_unpinned_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("p.db")).unwrap();

        for pg in 0..MAX_PAGES_IN_MEMORY as u32 {
            pager.read(pg).unwrap();
            pager.unpin(pg);
        }
        assert_eq!(pager.resident_count(), MAX_PAGES_IN_MEMORY);

        // One more page forces an eviction; page 0 was least recently used.
        pager.read(MAX_PAGES_IN_MEMORY as u32).unwrap();
        pager.unpin(MAX_PAGES_IN_MEMORY as u32);

        assert!(!pager.is_resident(0));
        assert!(pager.is_resident(MAX_PAGES_IN_MEMORY as u32));
        assert_eq!(pager.resident_count(), MAX_PAGES_IN_MEMORY);

        // Re-requesting page 0 evicts whatever is now least recently used
        // and brings page 0 back in.
        pager.read(0).unwrap();
        pager.unpin(0);
        assert!(pager.is_resident(0));
        assert_eq!(pager.resident_count(), MAX_PAGES_IN_MEMORY);
    }

    #[test]
    fn buffer_exhausted_when_every_resident_page_is_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("p.db")).unwrap();

        for pg in 0..MAX_PAGES_IN_MEMORY as u32 {
            pager.read(pg).unwrap(); // left pinned on purpose
        }

        let err = pager.read(MAX_PAGES_IN_MEMORY as u32).unwrap_err();
        assert!(matches!(err, Error::BufferExhausted));
    }

    #[test]
    fn dirty_pages_are_written_back_on_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.db");
        let mut pager = Pager::open(&path).unwrap();

        let mut page = [0u8; PAGE_SIZE];
        page[0] = 7;
        pager.write(0, &page).unwrap();
        pager.unpin(0);

        // Fill the pool so page 0 gets evicted (and, being dirty, flushed).
        for pg in 1..=MAX_PAGES_IN_MEMORY as u32 {
            pager.read(pg).unwrap();
            pager.unpin(pg);
        }
        assert!(!pager.is_resident(0));

        let back = pager.read(0).unwrap();
        assert_eq!(back[0], 7);
    }

    #[test]
    fn flush_is_noop_for_clean_or_absent_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("p.db")).unwrap();
        pager.flush(5).unwrap();

        pager.read(0).unwrap();
        pager.unpin(0);
        pager.flush(0).unwrap();
    }
}
