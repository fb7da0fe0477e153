use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tarndb::common::types::Rid;
use tarndb::transaction::{
    IsolationLevel, LockError, LockManager, TransactionManager, TransactionState,
};

fn test_manager() -> (Arc<LockManager>, TransactionManager) {
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(lock_manager.clone());
    (lock_manager, txn_manager)
}

fn pause() {
    thread::sleep(Duration::from_millis(100));
}

#[test]
fn test_shared_locks_are_compatible() {
    let (lock_manager, txn_manager) = test_manager();
    let t1 = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let t2 = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 0);

    assert!(lock_manager.lock_shared(&t1, rid).unwrap());
    assert!(lock_manager.lock_shared(&t2, rid).unwrap());
    assert!(t1.holds_lock(rid));
    assert!(t2.holds_lock(rid));

    assert!(lock_manager.unlock(&t1, rid));
    assert!(lock_manager.unlock(&t2, rid));
}

#[test]
fn test_relock_is_idempotent() {
    let (lock_manager, txn_manager) = test_manager();
    let txn = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 0);

    assert!(lock_manager.lock_exclusive(&txn, rid).unwrap());
    assert!(lock_manager.lock_exclusive(&txn, rid).unwrap());
    assert!(lock_manager.lock_shared(&txn, rid).unwrap());
    assert_eq!(txn.lock_count(), 1);
}

#[test]
fn test_unlock_without_lock_returns_false() {
    let (lock_manager, txn_manager) = test_manager();
    let txn = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    assert!(!lock_manager.unlock(&txn, Rid::new(9, 9)));
}

#[test]
fn test_exclusive_waits_for_older_holder() {
    let (lock_manager, txn_manager) = test_manager();
    let older = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let younger = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 0);

    assert!(lock_manager.lock_exclusive(&older, rid).unwrap());

    let waiter = {
        let lock_manager = lock_manager.clone();
        let younger = younger.clone();
        thread::spawn(move || lock_manager.lock_exclusive(&younger, rid).unwrap())
    };

    // the younger transaction must still be waiting: the older one is not
    // wounded and still holds the row
    pause();
    assert!(!younger.holds_lock(rid));
    assert_eq!(older.state(), TransactionState::Growing);

    assert!(lock_manager.unlock(&older, rid));
    assert!(waiter.join().unwrap());
    assert!(younger.holds_lock(rid));
}

// Scenario: A holds X, younger B waits for X, then older C asks for S.
// C wounds B and queues behind A; when A unlocks, C gets the row.
#[test]
fn test_wound_wait_aborts_younger_waiter() {
    let (lock_manager, txn_manager) = test_manager();
    let txn_c = txn_manager.begin_transaction(IsolationLevel::RepeatableRead); // oldest
    let txn_a = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let txn_b = txn_manager.begin_transaction(IsolationLevel::RepeatableRead); // youngest
    let rid = Rid::new(1, 0);

    assert!(lock_manager.lock_exclusive(&txn_a, rid).unwrap());

    let waiter_b = {
        let lock_manager = lock_manager.clone();
        let txn_b = txn_b.clone();
        thread::spawn(move || lock_manager.lock_exclusive(&txn_b, rid).unwrap())
    };
    pause();

    let waiter_c = {
        let lock_manager = lock_manager.clone();
        let txn_c = txn_c.clone();
        thread::spawn(move || lock_manager.lock_shared(&txn_c, rid).unwrap())
    };
    pause();

    // B was wounded out of the queue; its lock call reports the abort
    assert!(!waiter_b.join().unwrap());
    assert_eq!(txn_b.state(), TransactionState::Aborted);

    // C is still politely waiting behind the older holder
    assert!(!txn_c.holds_lock(rid));

    assert!(lock_manager.unlock(&txn_a, rid));
    assert!(waiter_c.join().unwrap());
    assert!(txn_c.holds_lock(rid));
    assert_eq!(txn_c.state(), TransactionState::Growing);
}

// An older transaction upgrading S -> X wounds a younger S holder and takes
// the row once the victim's locks are released.
#[test]
fn test_upgrade_wounds_younger_shared_holder() {
    let (lock_manager, txn_manager) = test_manager();
    let txn_a = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let txn_b = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 0);

    assert!(lock_manager.lock_shared(&txn_a, rid).unwrap());
    assert!(lock_manager.lock_shared(&txn_b, rid).unwrap());

    let upgrader = {
        let lock_manager = lock_manager.clone();
        let txn_a = txn_a.clone();
        thread::spawn(move || lock_manager.lock_upgrade(&txn_a, rid).unwrap())
    };
    pause();

    // B holds the row, so it was wounded rather than waited on
    assert_eq!(txn_b.state(), TransactionState::Aborted);

    // B's driver rolls it back, releasing its shared lock
    txn_manager.abort_transaction(txn_b.id()).unwrap();

    assert!(upgrader.join().unwrap());
    assert!(txn_a.exclusive_lock_set().contains(&rid));
    assert!(!txn_a.shared_lock_set().contains(&rid));
}

// Two simultaneous upgrades on one row: the second one to ask loses.
#[test]
fn test_upgrade_conflict() {
    let (lock_manager, txn_manager) = test_manager();
    let txn_a = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let txn_b = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let rid = Rid::new(1, 0);

    assert!(lock_manager.lock_shared(&txn_a, rid).unwrap());
    assert!(lock_manager.lock_shared(&txn_b, rid).unwrap());

    let upgrader = {
        let lock_manager = lock_manager.clone();
        let txn_a = txn_a.clone();
        thread::spawn(move || lock_manager.lock_upgrade(&txn_a, rid).unwrap())
    };
    pause();

    match lock_manager.lock_upgrade(&txn_b, rid) {
        Err(LockError::UpgradeConflict(id)) => assert_eq!(id, txn_b.id()),
        other => panic!("expected UpgradeConflict, got {other:?}"),
    }
    assert_eq!(txn_b.state(), TransactionState::Aborted);

    txn_manager.abort_transaction(txn_b.id()).unwrap();
    assert!(upgrader.join().unwrap());
}

#[test]
fn test_upgrade_without_shared_lock_fails() {
    let (lock_manager, txn_manager) = test_manager();
    let txn = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    assert!(!lock_manager.lock_upgrade(&txn, Rid::new(1, 0)).unwrap());
}

// REPEATABLE_READ: the first unlock moves the transaction to SHRINKING and
// every later lock attempt is refused.
#[test]
fn test_two_phase_boundary() {
    let (lock_manager, txn_manager) = test_manager();
    let txn = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    let r1 = Rid::new(1, 0);
    let r2 = Rid::new(1, 1);
    let r3 = Rid::new(1, 2);

    assert!(lock_manager.lock_shared(&txn, r1).unwrap());
    assert!(lock_manager.lock_exclusive(&txn, r2).unwrap());
    assert_eq!(txn.state(), TransactionState::Growing);

    assert!(lock_manager.unlock(&txn, r2));
    assert_eq!(txn.state(), TransactionState::Shrinking);

    match lock_manager.lock_shared(&txn, r3) {
        Err(LockError::LockOnShrinking(id)) => assert_eq!(id, txn.id()),
        other => panic!("expected LockOnShrinking, got {other:?}"),
    }
    assert_eq!(txn.state(), TransactionState::Aborted);
}

// READ_COMMITTED may release shared locks without entering SHRINKING;
// releasing an exclusive lock still flips the phase.
#[test]
fn test_read_committed_shared_unlock_keeps_growing() {
    let (lock_manager, txn_manager) = test_manager();
    let txn = txn_manager.begin_transaction(IsolationLevel::ReadCommitted);
    let r1 = Rid::new(1, 0);
    let r2 = Rid::new(1, 1);

    assert!(lock_manager.lock_shared(&txn, r1).unwrap());
    assert!(lock_manager.unlock(&txn, r1));
    assert_eq!(txn.state(), TransactionState::Growing);

    assert!(lock_manager.lock_exclusive(&txn, r2).unwrap());
    assert!(lock_manager.unlock(&txn, r2));
    assert_eq!(txn.state(), TransactionState::Shrinking);
}

#[test]
fn test_read_uncommitted_cannot_take_shared_locks() {
    let (lock_manager, txn_manager) = test_manager();
    let txn = txn_manager.begin_transaction(IsolationLevel::ReadUncommitted);

    match lock_manager.lock_shared(&txn, Rid::new(1, 0)) {
        Err(LockError::SharedLockOnReadUncommitted(id)) => assert_eq!(id, txn.id()),
        other => panic!("expected SharedLockOnReadUncommitted, got {other:?}"),
    }
    assert_eq!(txn.state(), TransactionState::Aborted);

    // exclusive locks are still allowed at this level
    let txn2 = txn_manager.begin_transaction(IsolationLevel::ReadUncommitted);
    assert!(lock_manager.lock_exclusive(&txn2, Rid::new(1, 1)).unwrap());
}

// No two writers on one row: a stream of younger writers serializes behind
// the current holder, and the row ends with exactly one owner at a time.
#[test]
fn test_writers_serialize() {
    let (lock_manager, txn_manager) = test_manager();
    let rid = Rid::new(1, 0);

    let holder = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
    assert!(lock_manager.lock_exclusive(&holder, rid).unwrap());

    let mut waiters = Vec::new();
    let mut txns = Vec::new();
    for _ in 0..3 {
        let txn = txn_manager.begin_transaction(IsolationLevel::RepeatableRead);
        txns.push(txn.clone());
        let lock_manager = lock_manager.clone();
        waiters.push(thread::spawn(move || {
            if lock_manager.lock_exclusive(&txn, rid).unwrap() {
                // hold the row briefly, then hand it on
                thread::sleep(Duration::from_millis(20));
                assert!(lock_manager.unlock(&txn, rid));
                true
            } else {
                false
            }
        }));
    }

    pause();
    assert!(lock_manager.unlock(&holder, rid));

    // older waiters wound younger ones, so at least the oldest waiter gets
    // the row and every thread terminates
    let outcomes: Vec<bool> = waiters.into_iter().map(|w| w.join().unwrap()).collect();
    assert!(outcomes.iter().any(|&granted| granted));
    for (txn, &granted) in txns.iter().zip(&outcomes) {
        if !granted {
            assert_eq!(txn.state(), TransactionState::Aborted);
        }
    }
}
