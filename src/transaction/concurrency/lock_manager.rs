// Row-level strict two-phase locking with wound-wait deadlock prevention

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::{Rid, TxnId, INVALID_TXN_ID};
use crate::transaction::concurrency::transaction::{IsolationLevel, Transaction, TransactionState};

/// Lock requests a transaction is not allowed to make. The transaction is
/// moved to `Aborted` before the error is returned; the caller must roll it
/// back.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Transaction {0} requested a shared lock at READ_UNCOMMITTED")]
    SharedLockOnReadUncommitted(TxnId),

    #[error("Transaction {0} requested a lock in its shrinking phase")]
    LockOnShrinking(TxnId),

    #[error("Transaction {0} lost an upgrade race on a row")]
    UpgradeConflict(TxnId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            granted: false,
        }
    }
}

/// Per-row queue of lock requests, in arrival order.
///
/// The condition variable is always used with the manager's single latch;
/// waiters re-scan the queue on every wakeup.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    /// Transaction currently upgrading S to X on this row, if any
    upgrading: TxnId,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: INVALID_TXN_ID,
        }
    }
}

struct LockTableState {
    lock_table: HashMap<Rid, LockRequestQueue>,
    /// Reverse lookup for wounding; an entry lives while its transaction
    /// holds or waits for any lock
    txn_map: HashMap<TxnId, Arc<Transaction>>,
    /// Which row each sleeping transaction is waiting on, so a wound can
    /// signal the right queue
    sleeping: HashMap<TxnId, Rid>,
}

/// The lock manager.
///
/// Deadlock prevention is wound-wait: an older transaction (smaller id)
/// aborts any younger transaction whose conflicting request stands in its
/// way, and waits only behind older ones. Since "wounds" always point from
/// smaller to larger ids, no wait cycle can form.
pub struct LockManager {
    latch: Mutex<LockTableState>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(LockTableState {
                lock_table: HashMap::new(),
                txn_map: HashMap::new(),
                sleeping: HashMap::new(),
            }),
        }
    }

    /// Acquire a shared lock on `rid`.
    ///
    /// Returns `Ok(false)` if the transaction was wounded while waiting.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool, LockError> {
        let mut state = self.latch.lock();

        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(LockError::SharedLockOnReadUncommitted(txn.id()));
        }
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(LockError::LockOnShrinking(txn.id()));
        }
        if Self::has_request(&state, txn.id(), rid) {
            return Ok(true);
        }

        state.txn_map.insert(txn.id(), txn.clone());
        let cv = {
            let queue = state.lock_table.entry(rid).or_default();
            queue.requests.push_back(LockRequest::new(txn.id(), LockMode::Shared));
            queue.cv.clone()
        };

        loop {
            if txn.state() == TransactionState::Aborted {
                Self::abandon_request(&mut state, txn, rid, false);
                return Ok(false);
            }

            // an S request waits only behind earlier X requests; younger
            // ones among them are wounded
            let mut exclusive_before = false;
            let mut victims = Vec::new();
            if let Some(queue) = state.lock_table.get(&rid) {
                for request in &queue.requests {
                    if request.txn_id == txn.id() {
                        break;
                    }
                    if request.mode == LockMode::Exclusive {
                        if request.txn_id > txn.id() {
                            victims.push(request.txn_id);
                        }
                        exclusive_before = true;
                    }
                }
            }
            Self::wound_all(&mut state, txn.id(), &victims);

            if !exclusive_before {
                state.sleeping.remove(&txn.id());
                break;
            }
            state.sleeping.insert(txn.id(), rid);
            cv.wait(&mut state);
        }

        Self::grant_request(&mut state, txn.id(), rid, LockMode::Shared);
        txn.shared_lock_set().insert(rid);
        Ok(true)
    }

    /// Acquire an exclusive lock on `rid`.
    ///
    /// Returns `Ok(false)` if the transaction was wounded while waiting.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool, LockError> {
        let mut state = self.latch.lock();

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(LockError::LockOnShrinking(txn.id()));
        }
        if Self::has_request(&state, txn.id(), rid) {
            return Ok(true);
        }

        state.txn_map.insert(txn.id(), txn.clone());
        let cv = {
            let queue = state.lock_table.entry(rid).or_default();
            queue.requests.push_back(LockRequest::new(txn.id(), LockMode::Exclusive));
            queue.cv.clone()
        };

        loop {
            if txn.state() == TransactionState::Aborted {
                Self::abandon_request(&mut state, txn, rid, false);
                return Ok(false);
            }

            // an X request waits behind every earlier request; younger ones
            // are wounded regardless of mode
            let mut request_before = false;
            let mut victims = Vec::new();
            if let Some(queue) = state.lock_table.get(&rid) {
                for request in &queue.requests {
                    if request.txn_id == txn.id() {
                        break;
                    }
                    if request.txn_id > txn.id() {
                        victims.push(request.txn_id);
                    }
                    request_before = true;
                }
            }
            Self::wound_all(&mut state, txn.id(), &victims);

            if !request_before {
                state.sleeping.remove(&txn.id());
                break;
            }
            state.sleeping.insert(txn.id(), rid);
            cv.wait(&mut state);
        }

        Self::grant_request(&mut state, txn.id(), rid, LockMode::Exclusive);
        txn.exclusive_lock_set().insert(rid);
        Ok(true)
    }

    /// Upgrade a held shared lock on `rid` to exclusive.
    ///
    /// Only one upgrade may be pending per row; a second upgrader aborts
    /// with `UpgradeConflict`. Returns `Ok(false)` if the transaction holds
    /// no shared lock on the row or was wounded while waiting.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<bool, LockError> {
        let mut state = self.latch.lock();

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(LockError::LockOnShrinking(txn.id()));
        }

        match state.lock_table.get(&rid) {
            None => return Ok(false),
            Some(queue) => {
                if queue.upgrading != INVALID_TXN_ID {
                    txn.set_state(TransactionState::Aborted);
                    return Err(LockError::UpgradeConflict(txn.id()));
                }
                match queue
                    .requests
                    .iter()
                    .find(|request| request.txn_id == txn.id())
                {
                    None => return Ok(false),
                    Some(request) if request.mode == LockMode::Exclusive => return Ok(true),
                    Some(_) => {}
                }
            }
        }

        state.txn_map.insert(txn.id(), txn.clone());
        let cv = {
            let queue = state.lock_table.entry(rid).or_default();
            queue.requests.push_back(LockRequest::new(txn.id(), LockMode::Exclusive));
            queue.upgrading = txn.id();
            queue.cv.clone()
        };

        loop {
            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = state.lock_table.get_mut(&rid) {
                    queue.upgrading = INVALID_TXN_ID;
                }
                Self::abandon_request(&mut state, txn, rid, true);
                return Ok(false);
            }

            // wait until the only request ahead of our X is our own granted
            // S; younger transactions in the way are wounded
            let mut other_before = false;
            let mut victims = Vec::new();
            if let Some(queue) = state.lock_table.get(&rid) {
                for request in &queue.requests {
                    if request.txn_id == txn.id() && request.mode == LockMode::Exclusive {
                        break;
                    }
                    if request.txn_id == txn.id() {
                        continue;
                    }
                    if request.txn_id > txn.id() {
                        victims.push(request.txn_id);
                    }
                    other_before = true;
                }
            }
            Self::wound_all(&mut state, txn.id(), &victims);

            if !other_before {
                state.sleeping.remove(&txn.id());
                break;
            }
            state.sleeping.insert(txn.id(), rid);
            cv.wait(&mut state);
        }

        if let Some(queue) = state.lock_table.get_mut(&rid) {
            debug_assert!(queue
                .requests
                .front()
                .map_or(false, |request| request.txn_id == txn.id()
                    && request.mode == LockMode::Shared));
            queue.requests.pop_front();
            queue.upgrading = INVALID_TXN_ID;
        }
        Self::grant_request(&mut state, txn.id(), rid, LockMode::Exclusive);
        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().insert(rid);
        Ok(true)
    }

    /// Release the lock held on `rid`.
    ///
    /// Returns `false` if the transaction has no request on the row.
    /// Releasing an exclusive lock, or any lock under REPEATABLE_READ, moves
    /// a growing transaction into its shrinking phase; READ_COMMITTED may
    /// drop shared locks without shrinking.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut state = self.latch.lock();

        let mut was_exclusive = false;
        let mut found = false;
        let mut now_empty = false;
        if let Some(queue) = state.lock_table.get_mut(&rid) {
            if let Some(pos) = queue
                .requests
                .iter()
                .position(|request| request.txn_id == txn.id())
            {
                was_exclusive = queue.requests[pos].mode == LockMode::Exclusive;
                queue.requests.remove(pos);
                found = true;
                if queue.requests.is_empty() {
                    now_empty = true;
                } else {
                    queue.cv.notify_all();
                }
            }
        }
        if !found {
            return false;
        }
        if now_empty {
            state.lock_table.remove(&rid);
        }

        txn.shared_lock_set().remove(&rid);
        txn.exclusive_lock_set().remove(&rid);

        if (txn.isolation_level() == IsolationLevel::RepeatableRead || was_exclusive)
            && txn.state() == TransactionState::Growing
        {
            txn.set_state(TransactionState::Shrinking);
        }

        if txn.lock_count() == 0 {
            state.txn_map.remove(&txn.id());
        }

        true
    }

    /// Release every lock the transaction still holds; used when a
    /// transaction commits or rolls back
    pub fn release_all(&self, txn: &Transaction) {
        let rids: Vec<Rid> = {
            let shared = txn.shared_lock_set();
            let exclusive = txn.exclusive_lock_set();
            shared.iter().chain(exclusive.iter()).copied().collect()
        };
        for rid in rids {
            self.unlock(txn, rid);
        }
    }

    fn has_request(state: &LockTableState, txn_id: TxnId, rid: Rid) -> bool {
        state
            .lock_table
            .get(&rid)
            .map_or(false, |queue| queue.requests.iter().any(|request| request.txn_id == txn_id))
    }

    /// Abort the victims and wake any of them sleeping in the lock manager
    fn wound_all(state: &mut LockTableState, wounder: TxnId, victims: &[TxnId]) {
        for &victim_id in victims {
            if let Some(victim) = state.txn_map.get(&victim_id) {
                if victim.state() != TransactionState::Aborted {
                    victim.set_state(TransactionState::Aborted);
                    debug!("wound-wait: transaction {wounder} wounded transaction {victim_id}");
                }
            }
            if let Some(&sleep_rid) = state.sleeping.get(&victim_id) {
                if let Some(queue) = state.lock_table.get(&sleep_rid) {
                    queue.cv.notify_all();
                }
            }
        }
    }

    /// Drop a wounded transaction's request on `rid` and clean up its
    /// bookkeeping; waiters behind it are woken so they can re-scan
    fn abandon_request(state: &mut LockTableState, txn: &Transaction, rid: Rid, only_ungranted: bool) {
        state.sleeping.remove(&txn.id());

        let mut now_empty = false;
        if let Some(queue) = state.lock_table.get_mut(&rid) {
            queue
                .requests
                .retain(|request| request.txn_id != txn.id() || (only_ungranted && request.granted));
            if queue.requests.is_empty() {
                now_empty = true;
            } else {
                queue.cv.notify_all();
            }
        }
        if now_empty {
            state.lock_table.remove(&rid);
        }

        if txn.lock_count() == 0 {
            state.txn_map.remove(&txn.id());
        }
    }

    fn grant_request(state: &mut LockTableState, txn_id: TxnId, rid: Rid, mode: LockMode) {
        if let Some(queue) = state.lock_table.get_mut(&rid) {
            if let Some(request) = queue
                .requests
                .iter_mut()
                .find(|request| request.txn_id == txn_id && request.mode == mode)
            {
                request.granted = true;
            }
        }
    }
}
