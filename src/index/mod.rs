pub mod hash;

pub use hash::ExtendibleHashIndex;
pub use hash::HashIndexError;
