// Represents an active database transaction under two-phase locking

use std::collections::HashSet;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

use crate::common::types::{Rid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Transaction states under strict two-phase locking.
///
/// A transaction acquires locks while `Growing`; the first release that
/// matters for its isolation level moves it to `Shrinking`, after which no
/// further lock may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Errors that can occur during transaction processing
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} not found")]
    UnknownTransaction(TxnId),

    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),
}

/// Transaction - carries the identity, isolation level, 2PL state, and held
/// lock sets of one active transaction.
///
/// State and lock sets sit behind mutexes because the lock manager mutates
/// them from other threads when it wounds a younger transaction.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    /// Create a new transaction in the growing phase
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// RIDs this transaction holds shared locks on
    pub fn shared_lock_set(&self) -> MutexGuard<'_, HashSet<Rid>> {
        self.shared_lock_set.lock()
    }

    /// RIDs this transaction holds exclusive locks on
    pub fn exclusive_lock_set(&self) -> MutexGuard<'_, HashSet<Rid>> {
        self.exclusive_lock_set.lock()
    }

    /// Whether the transaction holds a lock of either mode on `rid`
    pub fn holds_lock(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid) || self.exclusive_lock_set.lock().contains(&rid)
    }

    /// Total number of locks held
    pub fn lock_count(&self) -> usize {
        self.shared_lock_set.lock().len() + self.exclusive_lock_set.lock().len()
    }
}
