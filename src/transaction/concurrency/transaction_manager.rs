use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState,
};

/// Transaction manager - creates and tracks transactions and releases their
/// locks when they finish
pub struct TransactionManager {
    /// Next transaction ID to assign; monotone, so smaller means older
    next_txn_id: AtomicU32,

    /// Lock manager that enforces two-phase locking for these transactions
    lock_manager: Arc<LockManager>,

    /// Active transactions map (txn_id -> Transaction)
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            lock_manager,
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Begin a new transaction
    pub fn begin_transaction(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active_transactions.lock().insert(txn_id, txn.clone());
        txn
    }

    /// Commit a transaction, releasing every lock it holds
    pub fn commit_transaction(&self, txn_id: TxnId) -> Result<(), TransactionError> {
        let txn = self
            .active_transactions
            .lock()
            .remove(&txn_id)
            .ok_or(TransactionError::UnknownTransaction(txn_id))?;

        // a wounded transaction cannot commit
        match txn.state() {
            TransactionState::Growing | TransactionState::Shrinking => {}
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::InvalidState(txn_id));
            }
        }

        txn.set_state(TransactionState::Committed);
        self.lock_manager.release_all(&txn);
        Ok(())
    }

    /// Roll back a transaction, releasing every lock it holds.
    ///
    /// Aborting a transaction that was already wounded is allowed; that is
    /// how its driver cleans up after a failed lock call.
    pub fn abort_transaction(&self, txn_id: TxnId) -> Result<(), TransactionError> {
        let txn = self
            .active_transactions
            .lock()
            .remove(&txn_id)
            .ok_or(TransactionError::UnknownTransaction(txn_id))?;

        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn_id));
        }

        txn.set_state(TransactionState::Aborted);
        self.lock_manager.release_all(&txn);
        Ok(())
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    /// Check if a transaction is active
    pub fn transaction_exists(&self, txn_id: TxnId) -> bool {
        self.active_transactions.lock().contains_key(&txn_id)
    }

    /// Get all active transaction IDs
    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active_transactions.lock().keys().copied().collect()
    }
}
