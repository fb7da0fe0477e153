use log::debug;

use crate::common::types::PagePtr;
use crate::index::hash::error::HashIndexError;
use crate::index::hash::index::ExtendibleHashIndex;
use crate::storage::page::bucket_page::HashBucketPage;
use crate::storage::page::codec::StorageCodec;
use crate::storage::page::directory_page::{HashDirectoryPage, MAX_GLOBAL_DEPTH};

impl<K, V> ExtendibleHashIndex<K, V>
where
    K: StorageCodec + Clone + PartialEq,
    V: StorageCodec + Clone + PartialEq,
{
    /// Insert a `(key, value)` pair.
    ///
    /// Returns `Ok(false)` when the exact pair is already present. A full
    /// bucket is split and the insert retried; each round raises the target
    /// bucket's local depth, so the retry loop is bounded by the maximum
    /// directory depth and fails with `DirectoryOverflow` once the key's
    /// bucket can no longer split.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let _table_guard = self.table_latch.write();

        loop {
            let (directory_ptr, mut directory) = self.load_directory()?;
            let bucket_idx = self.bucket_index(key, &directory);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);

            let bucket_ptr = self.buffer_pool.fetch_page(bucket_page_id)?;
            let (inserted, full) = {
                let mut page_guard = bucket_ptr.write();
                let mut bucket = HashBucketPage::<K, V>::decode(&page_guard.data);
                if bucket.insert(key.clone(), value.clone()) {
                    bucket.encode(&mut page_guard.data);
                    (true, false)
                } else {
                    (false, bucket.is_full())
                }
            };

            if inserted {
                self.buffer_pool.unpin_page(bucket_page_id, true)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Ok(true);
            }

            if !full {
                // the exact pair is already in the bucket
                self.buffer_pool.unpin_page(bucket_page_id, false)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Ok(false);
            }

            match self.split_bucket(&mut directory, bucket_idx, &bucket_ptr) {
                Ok(()) => {
                    self.store_directory(&directory_ptr, &directory);
                    self.buffer_pool.unpin_page(bucket_page_id, true)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, true)?;
                    // retry against the regrown directory
                }
                Err(e) => {
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Err(e);
                }
            }
        }
    }

    /// Split the full bucket behind `bucket_idx` in two.
    ///
    /// Raises the bucket's local depth (doubling the directory when the
    /// bucket was alone at global depth), allocates a sibling page, points
    /// every slot whose new depth-bit is set at the sibling, and re-hashes
    /// the drained entries across the pair. The caller still holds the pin
    /// and latch on the old bucket page and writes the directory back.
    fn split_bucket(
        &self,
        directory: &mut HashDirectoryPage,
        bucket_idx: usize,
        bucket_ptr: &PagePtr,
    ) -> Result<(), HashIndexError> {
        let old_depth = directory.local_depth(bucket_idx);
        if old_depth >= MAX_GLOBAL_DEPTH {
            return Err(HashIndexError::DirectoryOverflow);
        }

        // the bucket's canonical index: its low `old_depth` bits
        let canonical = bucket_idx & directory.local_depth_mask(bucket_idx) as usize;

        directory.incr_local_depth(bucket_idx);

        let (sibling_ptr, sibling_page_id) = self.buffer_pool.new_page()?;
        let sibling_canonical = canonical | (1 << old_depth);
        let split_mask = (1usize << (old_depth + 1)) - 1;

        for slot_idx in 0..directory.size() {
            if (slot_idx & split_mask) == sibling_canonical {
                directory.set_bucket_page_id(slot_idx, sibling_page_id);
            }
        }

        {
            let mut old_page_guard = bucket_ptr.write();
            let mut sibling_page_guard = sibling_ptr.write();
            let mut old_bucket = HashBucketPage::<K, V>::decode(&old_page_guard.data);
            let mut sibling_bucket = HashBucketPage::<K, V>::new();

            for (entry_key, entry_value) in old_bucket.drain() {
                let rehashed = self.hash(&entry_key) as usize;
                if (rehashed & split_mask) == sibling_canonical {
                    sibling_bucket.insert(entry_key, entry_value);
                } else {
                    old_bucket.insert(entry_key, entry_value);
                }
            }

            old_bucket.encode(&mut old_page_guard.data);
            sibling_bucket.encode(&mut sibling_page_guard.data);
        }

        self.buffer_pool.unpin_page(sibling_page_id, true)?;

        debug!(
            "split bucket {} at local depth {} into sibling page {} (global depth {})",
            canonical,
            old_depth + 1,
            sibling_page_id,
            directory.global_depth()
        );

        Ok(())
    }
}
