pub mod error;
pub mod index;

pub use error::HashIndexError;
pub use index::ExtendibleHashIndex;
