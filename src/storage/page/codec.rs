use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::Rid;

/// Fixed-size byte encoding for the keys and values stored in index pages.
///
/// Every value of an implementing type occupies exactly `ENCODED_SIZE` bytes,
/// which is what lets a bucket page derive its slot count from the page size.
/// `decode_from` must accept any byte pattern, including all zeroes; a freshly
/// allocated page decodes as a bucket full of unoccupied slots.
pub trait StorageCodec: Sized {
    const ENCODED_SIZE: usize;

    fn encode_to(&self, buf: &mut [u8]);
    fn decode_from(buf: &[u8]) -> Self;
}

impl StorageCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl StorageCodec for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl StorageCodec for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl StorageCodec for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode_from(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl StorageCodec for Rid {
    const ENCODED_SIZE: usize = 8;

    fn encode_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.page_id);
        LittleEndian::write_u32(&mut buf[4..8], self.slot);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_i32(&buf[0..4]),
            slot: LittleEndian::read_u32(&buf[4..8]),
        }
    }
}
