use crate::common::types::PAGE_SIZE;
use crate::storage::page::codec::StorageCodec;

/// Number of slots a bucket page can hold for the given key/value encoding.
///
/// Each slot costs its encoded pair plus one occupied bit and one readable
/// bit, so `n * pair + 2 * n / 8 <= PAGE_SIZE` gives
/// `n = 4 * PAGE_SIZE / (4 * pair + 1)`.
pub fn bucket_array_size<K: StorageCodec, V: StorageCodec>() -> usize {
    4 * PAGE_SIZE / (4 * (K::ENCODED_SIZE + V::ENCODED_SIZE) + 1)
}

/// A bucket page of an extendible hash table.
///
/// A decoded, owned view of the page payload: two bitmaps followed by a
/// fixed-capacity slot array of encoded `(key, value)` pairs. `occupied[i]`
/// is monotone within the life of the bucket: deletion only clears
/// `readable[i]`, leaving a tombstone, so a lookup probe may stop at the
/// first never-occupied slot. Since insertion always fills the first
/// unoccupied slot, the occupied slots form a prefix of the array.
pub struct HashBucketPage<K, V> {
    occupied: Vec<u8>,
    readable: Vec<u8>,
    slots: Vec<(K, V)>,
}

impl<K, V> HashBucketPage<K, V>
where
    K: StorageCodec + Clone + PartialEq,
    V: StorageCodec + Clone + PartialEq,
{
    /// An empty bucket; identical to decoding a zeroed page
    pub fn new() -> Self {
        Self::decode(&[0u8; PAGE_SIZE])
    }

    pub fn capacity() -> usize {
        bucket_array_size::<K, V>()
    }

    fn bitmap_len() -> usize {
        (Self::capacity() + 7) / 8
    }

    fn pair_size() -> usize {
        K::ENCODED_SIZE + V::ENCODED_SIZE
    }

    /// Decode a bucket from page bytes
    pub fn decode(data: &[u8]) -> Self {
        let capacity = Self::capacity();
        let bitmap_len = Self::bitmap_len();
        let pair_size = Self::pair_size();

        let occupied = data[0..bitmap_len].to_vec();
        let readable = data[bitmap_len..2 * bitmap_len].to_vec();

        let mut slots = Vec::with_capacity(capacity);
        for slot_idx in 0..capacity {
            let offset = 2 * bitmap_len + slot_idx * pair_size;
            let key = K::decode_from(&data[offset..offset + K::ENCODED_SIZE]);
            let value = V::decode_from(&data[offset + K::ENCODED_SIZE..offset + pair_size]);
            slots.push((key, value));
        }

        Self {
            occupied,
            readable,
            slots,
        }
    }

    /// Write the bucket back into page bytes
    pub fn encode(&self, data: &mut [u8]) {
        let bitmap_len = Self::bitmap_len();
        let pair_size = Self::pair_size();

        data[0..bitmap_len].copy_from_slice(&self.occupied);
        data[bitmap_len..2 * bitmap_len].copy_from_slice(&self.readable);

        for (slot_idx, (key, value)) in self.slots.iter().enumerate() {
            let offset = 2 * bitmap_len + slot_idx * pair_size;
            key.encode_to(&mut data[offset..offset + K::ENCODED_SIZE]);
            value.encode_to(&mut data[offset + K::ENCODED_SIZE..offset + pair_size]);
        }
    }

    pub fn is_occupied(&self, slot_idx: usize) -> bool {
        self.occupied[slot_idx / 8] >> (slot_idx % 8) & 1 == 1
    }

    pub fn is_readable(&self, slot_idx: usize) -> bool {
        self.readable[slot_idx / 8] >> (slot_idx % 8) & 1 == 1
    }

    fn set_occupied(&mut self, slot_idx: usize) {
        self.occupied[slot_idx / 8] |= 1 << (slot_idx % 8);
    }

    fn set_readable(&mut self, slot_idx: usize) {
        self.readable[slot_idx / 8] |= 1 << (slot_idx % 8);
    }

    fn clear_readable(&mut self, slot_idx: usize) {
        self.readable[slot_idx / 8] &= !(1 << (slot_idx % 8));
    }

    /// Insert a pair at the first unoccupied slot.
    ///
    /// Returns `false` when the exact `(key, value)` pair is already present
    /// or the bucket has no unoccupied slot left.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        for slot_idx in 0..Self::capacity() {
            if self.is_occupied(slot_idx)
                && self.is_readable(slot_idx)
                && self.slots[slot_idx].0 == key
                && self.slots[slot_idx].1 == value
            {
                return false;
            }
            if !self.is_occupied(slot_idx) {
                self.slots[slot_idx] = (key, value);
                self.set_occupied(slot_idx);
                self.set_readable(slot_idx);
                return true;
            }
        }
        false
    }

    /// Tombstone the slot holding the exact `(key, value)` pair
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        for slot_idx in 0..Self::capacity() {
            if self.is_occupied(slot_idx)
                && self.is_readable(slot_idx)
                && self.slots[slot_idx].0 == *key
                && self.slots[slot_idx].1 == *value
            {
                self.clear_readable(slot_idx);
                return true;
            }
        }
        false
    }

    /// Collect every value stored under `key`.
    ///
    /// The probe stops at the first never-occupied slot; tombstones keep
    /// their occupied bit and do not terminate it.
    pub fn get_value(&self, key: &K) -> Vec<V> {
        let mut result = Vec::new();
        for slot_idx in 0..Self::capacity() {
            if !self.is_occupied(slot_idx) {
                break;
            }
            if self.is_readable(slot_idx) && self.slots[slot_idx].0 == *key {
                result.push(self.slots[slot_idx].1.clone());
            }
        }
        result
    }

    /// Take every readable pair out of the bucket and clear both bitmaps,
    /// dropping tombstones in the process; used when splitting
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut pairs = Vec::new();
        for slot_idx in 0..Self::capacity() {
            if self.is_readable(slot_idx) {
                pairs.push(self.slots[slot_idx].clone());
            }
        }
        self.occupied.fill(0);
        self.readable.fill(0);
        pairs
    }

    /// A bucket is full when every slot is occupied, readable or not
    pub fn is_full(&self) -> bool {
        (0..Self::capacity()).all(|slot_idx| self.is_occupied(slot_idx))
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    pub fn num_readable(&self) -> usize {
        (0..Self::capacity())
            .filter(|&slot_idx| self.is_readable(slot_idx))
            .count()
    }
}

impl<K, V> Default for HashBucketPage<K, V>
where
    K: StorageCodec + Clone + PartialEq,
    V: StorageCodec + Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}
