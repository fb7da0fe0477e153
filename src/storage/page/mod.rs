pub mod bucket_page;
pub mod codec;
pub mod directory_page;

pub use bucket_page::{bucket_array_size, HashBucketPage};
pub use codec::StorageCodec;
pub use directory_page::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_GLOBAL_DEPTH};
