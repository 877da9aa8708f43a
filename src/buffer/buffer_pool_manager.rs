use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StratumError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruReplacer, ReadPageGuard, WritePageGuard};

/// The mutable bookkeeping of the pool. Every public operation locks this
/// for its entire body, so page-table transitions and the disk I/O they
/// imply are observed atomically by all callers.
struct PoolCore {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: VecDeque<FrameId>,
    /// Eviction candidates among resident, unpinned frames
    replacer: LruReplacer,
}

/// State shared between the pool and the page guards it hands out.
pub(crate) struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    core: Mutex<PoolCore>,
}

impl PoolState {
    /// Drops one pin on the page. Returns false when the page is not
    /// resident or its pin count is already zero. The dirty flag is sticky:
    /// once set it stays until the next write-back.
    pub(crate) fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut core = self.core.lock();

        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => {
                core.replacer.unpin(frame_id);
                true
            }
            _ => true,
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames.
/// Pages are fetched through pin-counted RAII guards and evicted with an
/// LRU policy once unpinned.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state, also referenced by outstanding page guards
    state: Arc<PoolState>,
    /// Synchronous-facing disk I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size and disk
    /// manager. All frames start on the free list.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            frames,
            core: Mutex::new(PoolCore {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
            }),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a new page on disk and installs it in the pool, zeroed and
    /// unpinned. Use `read_page`/`write_page` to pin it for access.
    pub fn new_page(&self) -> Result<PageId> {
        let mut core = self.state.core.lock();

        let frame_id = self.acquire_frame(&mut core)?;
        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                // Hand the victimized frame back rather than leaking it
                core.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);

        core.page_table.insert(page_id, frame_id);
        core.replacer.unpin(frame_id);

        Ok(page_id)
    }

    /// Pins the page for shared access, reading it from disk if needed.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);

        Ok(ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)))
    }

    /// Pins the page for exclusive access, reading it from disk if needed.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let frame_id = self.fetch_page(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);

        Ok(WritePageGuard::new(page_id, frame, Arc::clone(&self.state)))
    }

    /// Drops one pin on the page, ORing in the dirty flag. Returns false
    /// when the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes the page buffer to disk unconditionally and clears the dirty
    /// flag. Returns Ok(false) when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let core = self.state.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);

            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);

            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Writes back every resident dirty page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let core = self.state.core.lock();

        for (&page_id, &frame_id) in core.page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];

            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);

                self.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.set_dirty(false);
            }
        }

        Ok(())
    }

    /// Removes the page from the pool and deallocates it on disk. Succeeds
    /// trivially when the page is not resident; fails while it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut core = self.state.core.lock();

        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Err(StratumError::PageStillPinned(page_id));
        }

        core.replacer.pin(frame_id);
        core.page_table.remove(&page_id);
        frame.reset();
        core.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let core = self.state.core.lock();

        core.page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.core.lock().free_list.len()
    }

    /// Pins the page into a frame and returns the frame id. On a miss the
    /// page is read from disk into a victim frame.
    fn fetch_page(&self, page_id: PageId) -> Result<FrameId> {
        let mut core = self.state.core.lock();

        if let Some(&frame_id) = core.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            core.replacer.pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut core)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            core.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        core.page_table.insert(page_id, frame_id);
        core.replacer.pin(frame_id);

        Ok(frame_id)
    }

    /// Takes a frame from the free list, or evicts the LRU victim. A dirty
    /// victim is written back before its frame is repurposed.
    fn acquire_frame(&self, core: &mut PoolCore) -> Result<FrameId> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = core.replacer.victim().ok_or(StratumError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler
                .schedule_write_sync(old_page_id, &data)?;
        }

        core.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}
