use anyhow::Result;

use tarndb::storage::buffer::BufferPoolError;
use tarndb::storage::buffer::BufferPoolManager;
use tarndb::storage::disk::DiskManager;
use std::sync::Arc;

mod common;
use common::{create_temp_db_file, create_test_buffer_pool, create_test_partitioned_pool};

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    assert!(page_id >= 0);

    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }

    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_page_modification_survives_eviction() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(page_id, true)?;

    // push the page out of the pool
    for _ in 0..3 {
        let (_, other_id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(other_id, false)?;
    }

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(&page_guard.data[100..109], b"Test Data");
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

// Pool of 3: pin three pages, observe allocation failure, then evict the
// dirty one and read it back from disk.
#[test]
fn test_eviction_round_trip() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (p1, id1) = buffer_pool.new_page()?;
    let (_p2, id2) = buffer_pool.new_page()?;
    let (_p3, _id3) = buffer_pool.new_page()?;

    // all frames pinned: no new page, no id consumed
    match buffer_pool.new_page() {
        Err(BufferPoolError::NoFreeFrame) => {}
        other => panic!("expected NoFreeFrame, got {other:?}"),
    }

    {
        let mut page_guard = p1.write();
        page_guard.data[0..4].copy_from_slice(b"p1!!");
    }
    buffer_pool.unpin_page(id1, true)?;
    buffer_pool.unpin_page(id2, false)?;

    // p1 was unpinned first, so it is the victim
    let (_p4, id4) = buffer_pool.new_page()?;
    assert_ne!(id4, id1);

    // p1 comes back from disk with the bytes written at eviction
    let refetched = buffer_pool.fetch_page(id1)?;
    {
        let page_guard = refetched.read();
        assert_eq!(&page_guard.data[0..4], b"p1!!");
    }
    buffer_pool.unpin_page(id1, false)?;

    Ok(())
}

#[test]
fn test_unpin_dirty_flag_accumulates() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[0] = 0xAB;
    }
    buffer_pool.unpin_page(page_id, true)?;

    // a clean re-fetch and unpin must not clear the dirty bit
    let _page = buffer_pool.fetch_page(page_id)?;
    buffer_pool.unpin_page(page_id, false)?;

    // evict, then read back: the write must have hit the disk
    for _ in 0..3 {
        let (_, other_id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(other_id, false)?;
    }
    let refetched = buffer_pool.fetch_page(page_id)?;
    assert_eq!(refetched.read().data[0], 0xAB);
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_unpin_errors() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    match buffer_pool.unpin_page(page_id, false) {
        Err(BufferPoolError::PinCountZero(id)) => assert_eq!(id, page_id),
        other => panic!("expected PinCountZero, got {other:?}"),
    }

    match buffer_pool.unpin_page(999, false) {
        Err(BufferPoolError::PageNotBuffered(999)) => {}
        other => panic!("expected PageNotBuffered, got {other:?}"),
    }

    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Flush Me";
        page_guard.data[0..test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(page_id, true)?;
    buffer_pool.flush_page(page_id)?;

    // a second pool over the same file sees the flushed bytes
    let disk_manager = Arc::new(DiskManager::new(temp_file.path())?);
    let other_pool = BufferPoolManager::new(4, disk_manager);
    let page = other_pool.fetch_page(page_id)?;
    assert_eq!(&page.read().data[0..8], b"Flush Me");
    other_pool.unpin_page(page_id, false)?;

    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, temp_file) = create_test_buffer_pool(10)?;

    let mut page_ids = Vec::new();
    for i in 0u8..5 {
        let (page, page_id) = buffer_pool.new_page()?;
        page.write().data[0] = i + 1;
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }
    buffer_pool.flush_all_pages()?;

    let disk_manager = Arc::new(DiskManager::new(temp_file.path())?);
    let other_pool = BufferPoolManager::new(10, disk_manager);
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = other_pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[0], i as u8 + 1);
        other_pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // pinned pages cannot be deleted
    match buffer_pool.delete_page(page_id) {
        Err(BufferPoolError::PagePinned(id)) => assert_eq!(id, page_id),
        other => panic!("expected PagePinned, got {other:?}"),
    }

    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;

    // deleting a page that is not buffered succeeds
    buffer_pool.delete_page(999)?;

    // the freed frame is reusable
    let (_, new_page_id) = buffer_pool.new_page()?;
    assert_ne!(new_page_id, page_id);
    buffer_pool.unpin_page(new_page_id, false)?;

    Ok(())
}

#[test]
fn test_partitioned_instance_id_stride() -> Result<()> {
    let (_temp_file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);

    // instance 2 of 4 hands out 2, 6, 10, ...
    let instance = BufferPoolManager::new_partitioned(8, 4, 2, disk_manager);
    for expected in [2, 6, 10, 14] {
        let (_, page_id) = instance.new_page()?;
        assert_eq!(page_id, expected);
        assert_eq!(page_id.rem_euclid(4), 2);
        instance.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_partitioned_pool_round_trip() -> Result<()> {
    let (pool, _temp_file) = create_test_partitioned_pool(3, 4)?;
    assert_eq!(pool.num_instances(), 3);
    assert_eq!(pool.pool_size(), 12);

    let mut page_ids = Vec::new();
    for i in 0u8..9 {
        let (page, page_id) = pool.new_page()?;
        page.write().data[7] = i;
        pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    // ids are unique across instances
    let mut sorted = page_ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), page_ids.len());

    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[7], i as u8);
        pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_partitioned_pool_exhaustion() -> Result<()> {
    let (pool, _temp_file) = create_test_partitioned_pool(2, 2)?;

    let mut pinned = Vec::new();
    for _ in 0..4 {
        pinned.push(pool.new_page()?);
    }

    // every frame of every instance is pinned
    match pool.new_page() {
        Err(BufferPoolError::NoFreeFrame) => {}
        other => panic!("expected NoFreeFrame, got {other:?}"),
    }

    // freeing one frame anywhere is enough
    let (_, page_id) = &pinned[0];
    pool.unpin_page(*page_id, false)?;
    let (_, new_id) = pool.new_page()?;
    pool.unpin_page(new_id, false)?;

    Ok(())
}
