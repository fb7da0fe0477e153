use std::sync::Arc;

use anyhow::Result;
use tempfile::NamedTempFile;

use tarndb::storage::buffer::{BufferPoolManager, PartitionedBufferPool};
use tarndb::storage::disk::DiskManager;

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    Ok((buffer_pool, file))
}

// Create a partitioned buffer pool with a temporary database
#[allow(dead_code)]
pub fn create_test_partitioned_pool(
    num_instances: u32,
    pool_size_per_instance: usize,
) -> Result<(Arc<PartitionedBufferPool>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let pool = Arc::new(PartitionedBufferPool::new(
        num_instances,
        pool_size_per_instance,
        disk_manager,
    ));
    Ok((pool, file))
}
