use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::FrameHeader;

/// RAII guard for shared access to a pinned page.
/// Dropping the guard unpins the page.
pub struct ReadPageGuard {
    page_id: PageId,
    state: Arc<PoolState>,
    /// Keeps the frame alive for the lifetime-erased data guard below
    _frame: Arc<FrameHeader>,
    data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
}

impl ReadPageGuard {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, state: Arc<PoolState>) -> Self {
        let data = frame.data.read();
        // The Arc above keeps the frame (and its lock) alive as long as
        // this guard, so erasing the borrow lifetime is sound.
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(data) };

        Self {
            page_id,
            state,
            _frame: frame,
            data,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.state.unpin(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a pinned page.
/// Dropping the guard unpins the page, marking it dirty if the page bytes
/// were borrowed mutably.
pub struct WritePageGuard {
    page_id: PageId,
    state: Arc<PoolState>,
    _frame: Arc<FrameHeader>,
    /// Taken in drop so the data lock is released before the unpin
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    is_dirty: bool,
}

impl WritePageGuard {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, state: Arc<PoolState>) -> Self {
        let data = frame.data.write();
        // Sound for the same reason as in ReadPageGuard
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(data) };

        Self {
            page_id,
            state,
            _frame: frame,
            data: Some(data),
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..],
            None => unreachable!("data guard taken before drop"),
        }
    }

    /// Returns the page bytes mutably and marks the guard dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        match &mut self.data {
            Some(data) => &mut data[..],
            None => unreachable!("data guard taken before drop"),
        }
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Release the data lock first, then drop the pin
        self.data.take();
        self.state.unpin(self.page_id, self.is_dirty);
    }
}
