use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::common::types::{Lsn, PageId, INVALID_PAGE_ID};

/// Maximum number of directory slots; fixes the directory to a single page
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Maximum global depth (log2 of the slot count)
pub const MAX_GLOBAL_DEPTH: u32 = 9;

const PAGE_ID_OFFSET: usize = 0;
const LSN_OFFSET: usize = 4;
const GLOBAL_DEPTH_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = 12;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

/// The directory page of an extendible hash table.
///
/// A decoded, owned view of the page payload: the low `global_depth` bits of
/// a key's hash select a slot, and each slot carries the bucket page it
/// points at plus that bucket's local depth. Mutations happen on the decoded
/// view and are written back with [`encode`](Self::encode) while the caller
/// holds the page latch.
///
/// Layout: 4 B page_id | 4 B lsn | 4 B global_depth |
/// 512 x 1 B local_depths | 512 x 4 B bucket_page_ids.
pub struct HashDirectoryPage {
    page_id: PageId,
    lsn: Lsn,
    global_depth: u32,
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
}

impl HashDirectoryPage {
    /// Fresh directory: depth zero, every slot unassigned
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            lsn: crate::common::types::INVALID_LSN,
            global_depth: 0,
            local_depths: [0; DIRECTORY_ARRAY_SIZE],
            bucket_page_ids: [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE],
        }
    }

    /// Decode a directory from page bytes
    pub fn decode(data: &[u8]) -> Self {
        let mut local_depths = [0u8; DIRECTORY_ARRAY_SIZE];
        local_depths.copy_from_slice(&data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE]);

        let mut bucket_page_ids = [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE];
        for (i, id) in bucket_page_ids.iter_mut().enumerate() {
            let offset = BUCKET_PAGE_IDS_OFFSET + i * 4;
            *id = LittleEndian::read_i32(&data[offset..offset + 4]);
        }

        Self {
            page_id: LittleEndian::read_i32(&data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]),
            lsn: LittleEndian::read_i32(&data[LSN_OFFSET..LSN_OFFSET + 4]),
            global_depth: LittleEndian::read_u32(&data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]),
            local_depths,
            bucket_page_ids,
        }
    }

    /// Write the directory back into page bytes
    pub fn encode(&self, data: &mut [u8]) {
        LittleEndian::write_i32(&mut data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4], self.page_id);
        LittleEndian::write_i32(&mut data[LSN_OFFSET..LSN_OFFSET + 4], self.lsn);
        LittleEndian::write_u32(&mut data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4], self.global_depth);
        data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE].copy_from_slice(&self.local_depths);
        for (i, id) in self.bucket_page_ids.iter().enumerate() {
            let offset = BUCKET_PAGE_IDS_OFFSET + i * 4;
            LittleEndian::write_i32(&mut data[offset..offset + 4], *id);
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.lsn = lsn;
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Number of addressable slots, `2^global_depth`
    pub fn size(&self) -> usize {
        1 << self.global_depth
    }

    /// Mask selecting the low `global_depth` bits of a hash
    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth) - 1
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        self.bucket_page_ids[bucket_idx]
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, bucket_page_id: PageId) {
        self.bucket_page_ids[bucket_idx] = bucket_page_id;
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.local_depths[bucket_idx] as u32
    }

    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u8) {
        self.local_depths[bucket_idx] = local_depth;
    }

    /// Mask selecting the low `local_depth` bits at this slot
    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        (1 << self.local_depth(bucket_idx)) - 1
    }

    /// The partner slot one bit of depth away
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        let local_depth = self.local_depth(bucket_idx);
        if local_depth == 0 {
            return bucket_idx ^ 1;
        }
        bucket_idx ^ (1 << (local_depth - 1))
    }

    /// Double the directory, mirroring every slot into its new high alias
    pub fn incr_global_depth(&mut self) {
        assert!(self.global_depth < MAX_GLOBAL_DEPTH);
        if self.global_depth == 0 {
            // slots 0 and 1 are seeded by the caller at construction time
            self.global_depth = 1;
            return;
        }

        let high_bit = 1usize << self.global_depth;
        for bucket_idx in 0..(1usize << self.global_depth) {
            self.bucket_page_ids[bucket_idx | high_bit] = self.bucket_page_ids[bucket_idx];
            self.local_depths[bucket_idx | high_bit] = self.local_depths[bucket_idx];
        }
        self.global_depth += 1;
    }

    /// Halve the directory, clearing the now-unaddressable high half
    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth > 1);
        let high_bit = 1usize << (self.global_depth - 1);
        for bucket_idx in high_bit..(1usize << self.global_depth) {
            self.bucket_page_ids[bucket_idx] = INVALID_PAGE_ID;
            self.local_depths[bucket_idx] = 0;
        }
        self.global_depth -= 1;
    }

    /// The directory can shrink when no bucket needs all `global_depth` bits
    pub fn can_shrink(&self) -> bool {
        if self.global_depth <= 1 {
            return false;
        }
        (0..self.size()).all(|bucket_idx| self.local_depth(bucket_idx) < self.global_depth)
    }

    /// Raise the local depth at `bucket_idx`.
    ///
    /// While the slot's depth is below the global depth the bucket has
    /// aliases, and all of them move together; once it reaches the global
    /// depth the directory itself has to double.
    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        if self.local_depth(bucket_idx) < self.global_depth {
            let page_id = self.bucket_page_id(bucket_idx);
            for i in 0..DIRECTORY_ARRAY_SIZE {
                if self.bucket_page_ids[i] == page_id {
                    self.local_depths[i] += 1;
                }
            }
            return;
        }

        self.local_depths[bucket_idx] += 1;
        self.incr_global_depth();
        debug!(
            "hash directory grew to global depth {} (page {})",
            self.global_depth, self.page_id
        );
    }

    /// Lower the local depth at `bucket_idx`, shrinking the directory once
    /// the high address bit carries no information anywhere
    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        self.local_depths[bucket_idx] -= 1;
        if self.can_shrink() {
            self.decr_global_depth();
            debug!(
                "hash directory shrank to global depth {} (page {})",
                self.global_depth, self.page_id
            );
        }
    }

    /// Check the directory invariants:
    /// every local depth is at most the global depth, slots sharing a bucket
    /// page agree on its local depth, and a bucket of local depth `d` has
    /// exactly `2^(global_depth - d)` slots pointing at it.
    ///
    /// Violations are programming errors and panic.
    pub fn verify_integrity(&self) {
        let mut page_id_to_count: HashMap<PageId, u32> = HashMap::new();
        let mut page_id_to_local_depth: HashMap<PageId, u32> = HashMap::new();

        for bucket_idx in 0..self.size() {
            let page_id = self.bucket_page_id(bucket_idx);
            let local_depth = self.local_depth(bucket_idx);
            assert!(
                local_depth <= self.global_depth,
                "local depth {} exceeds global depth {} at slot {}",
                local_depth,
                self.global_depth,
                bucket_idx
            );

            *page_id_to_count.entry(page_id).or_insert(0) += 1;
            match page_id_to_local_depth.get(&page_id) {
                Some(&seen) => assert_eq!(
                    seen, local_depth,
                    "inconsistent local depth for bucket page {page_id}"
                ),
                None => {
                    page_id_to_local_depth.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in &page_id_to_count {
            let local_depth = page_id_to_local_depth[page_id];
            let required = 1u32 << (self.global_depth - local_depth);
            assert_eq!(
                *count, required,
                "bucket page {page_id} referenced by {count} slots, expected {required}"
            );
        }
    }
}
