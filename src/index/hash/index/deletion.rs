use log::debug;

use crate::index::hash::error::HashIndexError;
use crate::index::hash::index::ExtendibleHashIndex;
use crate::storage::page::bucket_page::HashBucketPage;
use crate::storage::page::codec::StorageCodec;
use crate::storage::page::directory_page::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE};

impl<K, V> ExtendibleHashIndex<K, V>
where
    K: StorageCodec + Clone + PartialEq,
    V: StorageCodec + Clone + PartialEq,
{
    /// Remove the exact `(key, value)` pair.
    ///
    /// Returns `Ok(false)` when the pair is not present. Emptying a bucket
    /// triggers a merge with its split image, repeated for as long as the
    /// combined bucket stays empty and mergeable.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let _table_guard = self.table_latch.write();

        let (directory_ptr, mut directory) = self.load_directory()?;
        let bucket_idx = self.bucket_index(key, &directory);
        let bucket_page_id = directory.bucket_page_id(bucket_idx);

        let bucket_ptr = self.buffer_pool.fetch_page(bucket_page_id)?;
        let (removed, empty) = {
            let mut page_guard = bucket_ptr.write();
            let mut bucket = HashBucketPage::<K, V>::decode(&page_guard.data);
            let removed = bucket.remove(key, value);
            if removed {
                bucket.encode(&mut page_guard.data);
            }
            (removed, bucket.is_empty())
        };
        self.buffer_pool.unpin_page(bucket_page_id, removed)?;

        if !removed {
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(false);
        }

        if empty {
            self.merge(&mut directory, key)?;
            self.store_directory(&directory_ptr, &directory);
            self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        } else {
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        }

        Ok(true)
    }

    /// Fold the empty bucket addressed by `key` into its split image.
    ///
    /// A bucket merges only when it is empty, its local depth is above zero,
    /// and its split image sits at the same local depth. Every slot pointing
    /// at the empty bucket is retargeted, both referents' depths drop (which
    /// shrinks the directory once the top bit is redundant everywhere), and
    /// the emptied page is deleted. The combined bucket may itself be empty,
    /// so the merge repeats until it no longer applies.
    fn merge(&self, directory: &mut HashDirectoryPage, key: &K) -> Result<(), HashIndexError> {
        loop {
            let bucket_idx = self.bucket_index(key, directory);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);

            let bucket_ptr = self.buffer_pool.fetch_page(bucket_page_id)?;
            let empty = {
                let page_guard = bucket_ptr.read();
                HashBucketPage::<K, V>::decode(&page_guard.data).is_empty()
            };
            self.buffer_pool.unpin_page(bucket_page_id, false)?;

            if !empty || directory.local_depth(bucket_idx) == 0 {
                return Ok(());
            }

            let image_idx = directory.split_image_index(bucket_idx);
            if directory.local_depth(image_idx) != directory.local_depth(bucket_idx) {
                return Ok(());
            }

            let image_page_id = directory.bucket_page_id(image_idx);
            if image_page_id == bucket_page_id {
                return Ok(());
            }

            for slot_idx in 0..DIRECTORY_ARRAY_SIZE {
                if directory.bucket_page_id(slot_idx) == bucket_page_id {
                    directory.set_bucket_page_id(slot_idx, image_page_id);
                    directory.decr_local_depth(slot_idx);
                } else if directory.bucket_page_id(slot_idx) == image_page_id {
                    directory.decr_local_depth(slot_idx);
                }
            }

            self.buffer_pool.delete_page(bucket_page_id)?;

            debug!(
                "merged empty bucket page {} into page {} (global depth {})",
                bucket_page_id,
                image_page_id,
                directory.global_depth()
            );
        }
    }
}
