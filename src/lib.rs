// Export public modules
pub mod common;
pub mod storage;
pub mod index;
pub mod transaction;

// Re-export key items for convenient access
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use storage::buffer::PartitionedBufferPool;
pub use storage::disk::DiskManager;
pub use index::hash::ExtendibleHashIndex;
pub use index::hash::HashIndexError;
pub use transaction::{IsolationLevel, LockManager, Transaction, TransactionManager};
