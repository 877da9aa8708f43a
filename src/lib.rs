//! Stratum - the storage core of an educational disk-oriented RDBMS
//!
//! This crate implements the two load-bearing pieces of a disk-oriented
//! database: a fixed-capacity buffer pool over a block device, and a
//! disk-resident B+ tree index that uses the buffer pool as its only memory
//! for page contents.
//!
//! # Architecture
//!
//! - **Storage layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads, writes and allocates fixed-size pages
//!   - `DiskScheduler`: background worker draining a queue of I/O requests
//!
//! - **Buffer pool** (`buffer`): bounded in-memory page cache
//!   - `BufferPoolManager`: pins pages into frames and evicts with LRU
//!   - `LruReplacer`: eviction policy over unpinned frames
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pin/unpin with dirty tracking
//!
//! - **Index** (`index`): ordered access on top of the buffer pool
//!   - `BPlusTree`: unique-key insert, delete with rebalancing, point and
//!     range reads
//!   - `TreeIterator`: forward scan over the leaf chain
//!   - the header page records every index's root page id
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratum::buffer::BufferPoolManager;
//! use stratum::index::BPlusTree;
//! use stratum::storage::disk::DiskManager;
//! use stratum::common::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, disk_manager));
//!
//! let mut index = BPlusTree::<u32>::new("orders_pk", Arc::clone(&bpm)).unwrap();
//! index
//!     .insert(42, RecordId::new(PageId::new(7), SlotId::new(0)), None)
//!     .unwrap();
//!
//! let mut found = Vec::new();
//! assert!(index.get(&42, &mut found, None).unwrap());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StratumError, Transaction};
