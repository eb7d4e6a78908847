//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use bramble::buffer::BufferPoolManager;
use bramble::common::{BrambleError, PageId, HEADER_PAGE_ID};
use bramble::storage::disk::DiskManager;
use bramble::storage::page::{HeaderPage, HeaderPageRef};
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, 2, dm).unwrap();
    (bpm, temp_file)
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap();
    assert_eq!(page_id, PageId::new(0));

    {
        let mut guard = bpm.checked_write_page(page_id).unwrap();
        guard.data_mut()[0] = 0xDE;
        guard.data_mut()[1] = 0xAD;
        guard.data_mut()[2] = 0xBE;
        guard.data_mut()[3] = 0xEF;
    }

    {
        let guard = bpm.checked_read_page(page_id).unwrap();
        assert_eq!(&guard.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
}

#[test]
fn test_buffer_pool_pin_accounting() {
    let (bpm, _temp) = create_bpm(10);

    let page_id = bpm.new_page().unwrap();
    assert_eq!(bpm.get_pin_count(page_id), Some(0));

    let g1 = bpm.checked_read_page(page_id).unwrap();
    let g2 = bpm.checked_read_page(page_id).unwrap();
    assert_eq!(bpm.get_pin_count(page_id), Some(2));

    drop(g1);
    drop(g2);
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_id;
    let test_data = b"Persistence test data";

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm).unwrap();

        page_id = bpm.new_page().unwrap();
        {
            let mut guard = bpm.checked_write_page(page_id).unwrap();
            guard.data_mut()[..test_data.len()].copy_from_slice(test_data);
        }
        bpm.flush_page(page_id).unwrap();
    }

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm).unwrap();

        let guard = bpm.checked_read_page(page_id).unwrap();
        assert_eq!(&guard.data()[..test_data.len()], test_data);
    }
}

#[test]
fn test_buffer_pool_eviction_writes_back() {
    let (bpm, _temp) = create_bpm(3);

    let mut page_ids = Vec::new();
    for i in 0..3 {
        let pid = bpm.new_page().unwrap();
        {
            let mut guard = bpm.checked_write_page(pid).unwrap();
            guard.data_mut()[0] = i as u8;
        }
        page_ids.push(pid);
    }

    for &pid in &page_ids {
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }

    // Evicts one of the three; its bytes must come back from disk.
    let new_pid = bpm.new_page().unwrap();
    assert_eq!(new_pid, PageId::new(3));

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.checked_read_page(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_buffer_pool_pin_prevents_eviction() {
    let (bpm, _temp) = create_bpm(2);

    let pid1 = bpm.new_page().unwrap();
    let pid2 = bpm.new_page().unwrap();

    let _guard1 = bpm.checked_read_page(pid1).unwrap();
    let _guard2 = bpm.checked_read_page(pid2).unwrap();

    assert!(matches!(bpm.new_page(), Err(BrambleError::BufferPoolFull)));
}

#[test]
fn test_buffer_pool_delete_page() {
    let (bpm, _temp) = create_bpm(10);

    let pid = bpm.new_page().unwrap();
    {
        let mut guard = bpm.checked_write_page(pid).unwrap();
        guard.data_mut()[0] = 42;
    }

    {
        let _guard = bpm.checked_read_page(pid).unwrap();
        assert!(matches!(
            bpm.delete_page(pid),
            Err(BrambleError::PageStillPinned(_))
        ));
    }

    assert!(bpm.delete_page(pid).unwrap());
    assert_eq!(bpm.get_pin_count(pid), None);

    // Not resident: nothing to do.
    assert!(bpm.delete_page(PageId::new(999)).unwrap());
}

#[test]
fn test_buffer_pool_flush_all() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_ids;
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm).unwrap();

        page_ids = (0..5)
            .map(|i| {
                let pid = bpm.new_page().unwrap();
                {
                    let mut guard = bpm.checked_write_page(pid).unwrap();
                    guard.data_mut()[0] = i as u8;
                }
                pid
            })
            .collect::<Vec<_>>();

        bpm.flush_all_pages().unwrap();
    }

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm).unwrap();

        for (i, &pid) in page_ids.iter().enumerate() {
            let guard = bpm.checked_read_page(pid).unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }
}

#[test]
fn test_buffer_pool_with_header_page() {
    let (bpm, _temp) = create_bpm(10);

    let header_pid = bpm.new_page().unwrap();
    assert_eq!(header_pid, HEADER_PAGE_ID);

    {
        let mut guard = bpm.checked_write_page(header_pid).unwrap();
        let mut header = HeaderPage::new(guard.data_mut());
        header.init();
        assert!(header.insert_record("orders_pk", PageId::new(3)));
        assert!(header.update_record("orders_pk", PageId::new(5)));
    }

    {
        let guard = bpm.checked_read_page(header_pid).unwrap();
        let header = HeaderPageRef::new(guard.data());
        assert_eq!(header.get_record("orders_pk"), Some(PageId::new(5)));
        assert_eq!(header.get_record("users_pk"), None);
    }
}

#[test]
fn test_buffer_pool_concurrent_mixed_access() {
    let (bpm, _temp) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<_> = (0..4).map(|_| bpm.new_page().unwrap()).collect();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            let pid = page_ids[t];
            thread::spawn(move || {
                for round in 0..50u32 {
                    {
                        let mut guard = bpm.checked_write_page(pid).unwrap();
                        guard.data_mut()[..4].copy_from_slice(&round.to_le_bytes());
                    }
                    {
                        let guard = bpm.checked_read_page(pid).unwrap();
                        let stored: [u8; 4] = guard.data()[..4].try_into().unwrap();
                        assert_eq!(u32::from_le_bytes(stored), round);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for &pid in &page_ids {
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }
}

#[test]
fn test_buffer_pool_churn_small_pool() {
    let (bpm, _temp) = create_bpm(5);

    let page_ids: Vec<_> = (0..25).map(|_| bpm.new_page().unwrap()).collect();

    for &pid in &page_ids {
        let mut guard = bpm.checked_write_page(pid).unwrap();
        guard.data_mut()[..4].copy_from_slice(&pid.as_u32().to_le_bytes());
    }

    for &pid in &page_ids {
        let guard = bpm.checked_read_page(pid).unwrap();
        let stored: [u8; 4] = guard.data()[..4].try_into().unwrap();
        assert_eq!(u32::from_le_bytes(stored), pid.as_u32());
    }
}
