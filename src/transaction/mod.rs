// Transaction management module

pub mod concurrency;

pub use concurrency::lock_manager::{LockError, LockManager, LockMode};
pub use concurrency::transaction::{IsolationLevel, Transaction, TransactionError, TransactionState};
pub use concurrency::transaction_manager::TransactionManager;
