//! Bramble - the storage-access core of a disk-oriented RDBMS
//!
//! This crate provides the paged storage layer higher-level query
//! operators sit on: a buffer pool that caches fixed-size disk pages in
//! memory, and a concurrent, disk-backed B+ tree index built on top of it.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Disk I/O and special page formats
//!   - `DiskManager`: Reads and writes 4 KiB pages against a single file
//!   - `DiskScheduler`: Background worker serializing disk requests
//!   - `HeaderPage`: The index-name -> root-page-id record page
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Caches pages in a fixed set of frames
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata, bytes and page latch
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pinned page access
//!
//! - **Containers** (`container`): `ExtendibleHashTable`, the growable
//!   directory the buffer pool uses as its page table
//!
//! - **Index** (`index`): `BPlusTree`, a latch-crabbing B+ tree over
//!   fixed-width keys, with a guard-holding range iterator
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bramble::buffer::BufferPoolManager;
//! use bramble::common::{PageId, RecordId, SlotId};
//! use bramble::index::{BPlusTree, GenericKey, Int64Comparator};
//! use bramble::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager).unwrap());
//!
//! // Page 0 is reserved for index root records.
//! let header = bpm.new_page().unwrap();
//! assert_eq!(header, PageId::new(0));
//!
//! let tree = BPlusTree::<8, _>::with_default_sizes("orders_pk", bpm, Int64Comparator);
//! let key = GenericKey::from_integer(42);
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! tree.insert(&key, rid).unwrap();
//!
//! let mut result = Vec::new();
//! assert!(tree.get_value(&key, &mut result).unwrap());
//! assert_eq!(result, vec![rid]);
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BrambleError, PageId, RecordId, Result, SlotId};
