use thiserror::Error;
use crate::storage::buffer::BufferPoolError;
use crate::storage::page::directory_page::MAX_GLOBAL_DEPTH;

#[derive(Error, Debug)]
pub enum HashIndexError {
    #[error("Directory cannot grow beyond global depth {MAX_GLOBAL_DEPTH}")]
    DirectoryOverflow,

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),
}
