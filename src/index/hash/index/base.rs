use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::types::{PageId, PagePtr};
use crate::index::hash::error::HashIndexError;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::bucket_page::HashBucketPage;
use crate::storage::page::codec::StorageCodec;
use crate::storage::page::directory_page::HashDirectoryPage;

/// Downcast the std hasher's 64-bit output to the 32 bits the directory
/// addresses with
pub(crate) fn default_hash<K: Hash>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as u32
}

/// Disk-backed extendible hash index.
///
/// The directory and all bucket pages live in the buffer pool; this struct
/// only remembers where the directory is. A table-level latch serializes
/// structure changes: lookups take it shared, insert and remove take it
/// exclusive.
pub struct ExtendibleHashIndex<K, V> {
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) directory_page_id: PageId,
    pub(crate) table_latch: RwLock<()>,
    pub(crate) hash_fn: fn(&K) -> u32,
    pub(crate) _phantom: PhantomData<(K, V)>,
}

impl<K, V> ExtendibleHashIndex<K, V>
where
    K: StorageCodec + Clone + PartialEq + Hash,
    V: StorageCodec + Clone + PartialEq,
{
    /// Create an index hashing with the std hasher
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HashIndexError> {
        Self::with_hasher(buffer_pool, default_hash::<K>)
    }
}

impl<K, V> ExtendibleHashIndex<K, V>
where
    K: StorageCodec + Clone + PartialEq,
    V: StorageCodec + Clone + PartialEq,
{
    /// Create an index with a caller-supplied hash function.
    ///
    /// The directory starts at global depth 1 with both slots aliasing a
    /// single bucket at local depth 0, so the first split can fan out in
    /// either direction.
    pub fn with_hasher(
        buffer_pool: Arc<BufferPoolManager>,
        hash_fn: fn(&K) -> u32,
    ) -> Result<Self, HashIndexError> {
        let (directory_ptr, directory_page_id) = buffer_pool.new_page()?;
        let (_bucket_ptr, bucket_page_id) = buffer_pool.new_page()?;

        let mut directory = HashDirectoryPage::new(directory_page_id);
        directory.set_bucket_page_id(0, bucket_page_id);
        directory.set_local_depth(0, 0);
        directory.set_bucket_page_id(1, bucket_page_id);
        directory.set_local_depth(1, 0);
        directory.incr_global_depth();

        {
            let mut page_guard = directory_ptr.write();
            directory.encode(&mut page_guard.data);
        }

        buffer_pool.unpin_page(directory_page_id, true)?;
        // a zeroed page already decodes as an empty bucket
        buffer_pool.unpin_page(bucket_page_id, false)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            hash_fn,
            _phantom: PhantomData,
        })
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    pub(crate) fn hash(&self, key: &K) -> u32 {
        (self.hash_fn)(key)
    }

    /// The directory slot `key` addresses under the current global depth
    pub(crate) fn bucket_index(&self, key: &K, directory: &HashDirectoryPage) -> usize {
        (self.hash(key) & directory.global_depth_mask()) as usize
    }

    /// Fetch and decode the directory page; the caller owns the pin
    pub(crate) fn load_directory(&self) -> Result<(PagePtr, HashDirectoryPage), HashIndexError> {
        let page_ptr = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = {
            let page_guard = page_ptr.read();
            HashDirectoryPage::decode(&page_guard.data)
        };
        Ok((page_ptr, directory))
    }

    /// Encode the directory back into its pinned page
    pub(crate) fn store_directory(&self, page_ptr: &PagePtr, directory: &HashDirectoryPage) {
        let mut page_guard = page_ptr.write();
        directory.encode(&mut page_guard.data);
    }

    /// Find every value stored under `key`
    pub fn get_values(&self, key: &K) -> Result<Vec<V>, HashIndexError> {
        let _table_guard = self.table_latch.read();

        let (_directory_ptr, directory) = self.load_directory()?;
        let bucket_idx = self.bucket_index(key, &directory);
        let bucket_page_id = directory.bucket_page_id(bucket_idx);

        let bucket_ptr = self.buffer_pool.fetch_page(bucket_page_id)?;
        let values = {
            let page_guard = bucket_ptr.read();
            let bucket = HashBucketPage::<K, V>::decode(&page_guard.data);
            bucket.get_value(key)
        };

        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        self.buffer_pool.unpin_page(bucket_page_id, false)?;

        Ok(values)
    }

    /// Current global depth of the directory
    pub fn global_depth(&self) -> Result<u32, HashIndexError> {
        let _table_guard = self.table_latch.read();
        let (_directory_ptr, directory) = self.load_directory()?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(directory.global_depth())
    }

    /// Check the directory invariants; panics on violation
    pub fn verify_integrity(&self) -> Result<(), HashIndexError> {
        let _table_guard = self.table_latch.read();
        let (_directory_ptr, directory) = self.load_directory()?;
        directory.verify_integrity();
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(())
    }
}
