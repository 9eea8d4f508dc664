//! Optimistic-commit behaviour of the ledger over both backends.

use std::sync::Arc;
use std::thread;

use loyalty_ledger::balance;
use loyalty_ledger::error::{ErrorKind, LedgerError, LedgerResult};
use loyalty_ledger::query;
use loyalty_ledger::registry::{self, Role};
use loyalty_ledger::storage::{
    Backend, KeyValueStore, LedgerDb, MemoryBackend, ScanIter, Transaction,
};
use loyalty_ledger::{escrow, transfer, StoreResult};

fn run<T>(
    backend: &dyn Backend,
    op: impl FnOnce(&mut Transaction<'_>) -> LedgerResult<T>,
) -> LedgerResult<T> {
    let mut txn = Transaction::begin(backend);
    let out = op(&mut txn).map_err(|err| txn.reconcile(err))?;
    txn.commit()?;
    Ok(out)
}

/// A transaction that lets another commit land just before one of its
/// prefix scans, after whatever reads came first.
struct Interleaved<'a, F: FnOnce()> {
    txn: Transaction<'a>,
    scans_before: usize,
    between: Option<F>,
}

impl<'a, F: FnOnce()> Interleaved<'a, F> {
    fn new(backend: &'a dyn Backend, scans_before: usize, between: F) -> Self {
        Self {
            txn: Transaction::begin(backend),
            scans_before,
            between: Some(between),
        }
    }
}

impl<F: FnOnce()> KeyValueStore for Interleaved<'_, F> {
    fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.txn.get(key)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> StoreResult<()> {
        self.txn.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.txn.delete(key)
    }

    fn scan_prefix(&mut self, prefix: &[u8]) -> StoreResult<ScanIter> {
        if self.scans_before > 0 {
            self.scans_before -= 1;
        } else if let Some(between) = self.between.take() {
            between();
        }
        self.txn.scan_prefix(prefix)
    }
}

fn seed(backend: &dyn Backend) {
    run(backend, |txn| {
        registry::create(txn, "bank1", Role::Bank)?;
        registry::create(txn, "u1", Role::Customer)?;
        registry::create(txn, "u2", Role::Customer)?;
        registry::create(txn, "u3", Role::Customer)?;
        transfer::gift(txn, "bank1", "u1", 100)
    })
    .unwrap();
}

#[test]
fn overlapping_transfers_conflict_then_retry_succeeds() {
    let backend = MemoryBackend::new();
    seed(&backend);

    let mut first = Transaction::begin(&backend);
    let mut second = Transaction::begin(&backend);
    transfer::transfer(&mut first, "u1", "u2", 60).unwrap();
    transfer::transfer(&mut second, "u1", "u3", 60).unwrap();

    first.commit().unwrap();
    let err = LedgerError::from(second.commit().unwrap_err());
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());

    // First commit is fully visible, second left no trace.
    let mut check = Transaction::begin(&backend);
    assert_eq!(balance::read(&mut check, Role::Customer, "u1").unwrap(), 40);
    assert_eq!(balance::read(&mut check, Role::Customer, "u2").unwrap(), 60);
    assert_eq!(balance::read(&mut check, Role::Customer, "u3").unwrap(), 0);

    // The retry sees the new balance and is rejected on its merits.
    let err = run(&backend, |txn| transfer::transfer(txn, "u1", "u3", 60)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    run(&backend, |txn| transfer::transfer(txn, "u1", "u3", 40)).unwrap();

    let report = run(&backend, |txn| query::audit(txn)).unwrap();
    assert!(report.is_consistent(), "{report:?}");
}

#[test]
fn spend_landing_between_balance_read_and_chunk_scan_is_a_conflict() {
    let backend = MemoryBackend::new();
    seed(&backend);

    // u1 holds 100. The balance check passes, then a 60 spend commits
    // before u1's chunks are enumerated, leaving only 40 of them.
    let mut txn = Interleaved::new(&backend, 0, || {
        run(&backend, |t| transfer::transfer(t, "u1", "u3", 60)).unwrap();
    });
    let err = transfer::transfer(&mut txn, "u1", "u2", 60).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LedgerInconsistent);

    let err = txn.txn.reconcile(err);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());
    drop(txn);

    // Nothing of the losing attempt landed.
    let mut check = Transaction::begin(&backend);
    assert_eq!(balance::read(&mut check, Role::Customer, "u1").unwrap(), 40);
    assert_eq!(balance::read(&mut check, Role::Customer, "u2").unwrap(), 0);
    assert_eq!(balance::read(&mut check, Role::Customer, "u3").unwrap(), 60);

    // Retried against fresh state, the same request gets a definite answer,
    // and a request the remaining chunks can cover goes through.
    let err = run(&backend, |t| transfer::transfer(t, "u1", "u2", 60)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    run(&backend, |t| transfer::transfer(t, "u1", "u2", 40)).unwrap();

    let report = run(&backend, |txn| query::audit(txn)).unwrap();
    assert!(report.is_consistent(), "{report:?}");
}

#[test]
fn buy_straddling_a_spend_is_a_conflict() {
    let backend = MemoryBackend::new();
    seed(&backend);
    run(&backend, |txn| registry::create(txn, "s1", Role::Shop)).unwrap();

    let mut txn = Interleaved::new(&backend, 0, || {
        run(&backend, |t| transfer::transfer(t, "u1", "u2", 90)).unwrap();
    });
    let err = escrow::buy(&mut txn, "u1", "s1", 50).unwrap_err();
    let err = txn.txn.reconcile(err);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    drop(txn);

    run(&backend, |txn| escrow::buy(txn, "u1", "s1", 10)).unwrap();
    let report = run(&backend, |txn| query::audit(txn)).unwrap();
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.outstanding_allowances, 10);
}

#[test]
fn audit_straddling_a_commit_is_refused() {
    let backend = MemoryBackend::new();
    seed(&backend);

    // The audit has read u1 and u2's balances when a transfer lands, just
    // before it enumerates u2's chunks.
    let mut txn = Interleaved::new(&backend, 2, || {
        run(&backend, |t| transfer::transfer(t, "u1", "u2", 30)).unwrap();
    });
    let stale = query::audit(&mut txn).unwrap();
    assert!(!stale.is_consistent());
    let err = LedgerError::from(txn.txn.commit().unwrap_err());
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let report = run(&backend, |txn| query::audit(txn)).unwrap();
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.customer_balances, 100);
}

#[test]
fn concurrent_registration_of_same_subject_admits_one() {
    let backend = MemoryBackend::new();
    let mut a = Transaction::begin(&backend);
    let mut b = Transaction::begin(&backend);
    registry::create(&mut a, "u9", Role::Customer).unwrap();
    registry::create(&mut b, "u9", Role::Customer).unwrap();

    a.commit().unwrap();
    assert!(b.commit().is_err());
}

#[test]
fn new_chunk_under_scanned_prefix_is_a_conflict() {
    let backend = MemoryBackend::new();
    seed(&backend);

    // Reader enumerates u1's chunks; a gift then adds one before it commits.
    let mut reader = Transaction::begin(&backend);
    transfer::transfer(&mut reader, "u1", "u2", 10).unwrap();
    run(&backend, |txn| transfer::gift(txn, "bank1", "u1", 5)).unwrap();

    let err = LedgerError::from(reader.commit().unwrap_err());
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn threads_retrying_on_conflict_conserve_value() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    seed(backend.as_ref());
    run(backend.as_ref(), |txn| transfer::gift(txn, "bank1", "u2", 100)).unwrap();

    let handles: Vec<_> = [("u1", "u2"), ("u2", "u1")]
        .into_iter()
        .map(|(from, to)| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                let mut done = 0;
                while done < 25 {
                    match run(backend.as_ref(), |txn| transfer::transfer(txn, from, to, 3)) {
                        Ok(_) => done += 1,
                        Err(err) if err.is_retryable() => continue,
                        Err(err) => panic!("transfer {from}->{to} failed: {err}"),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let report = run(backend.as_ref(), |txn| query::audit(txn)).unwrap();
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.customer_balances, 200);
}

#[test]
fn sled_ledger_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let db = LedgerDb::open(dir.path()).expect("open");
        seed(&db);
        run(&db, |txn| transfer::transfer(txn, "u1", "u2", 25)).unwrap();
        db.flush().unwrap();
    }

    let db = LedgerDb::open(dir.path()).expect("reopen");
    assert_eq!(run(&db, |txn| balance::read(txn, Role::Customer, "u1")).unwrap(), 75);
    assert_eq!(run(&db, |txn| balance::read(txn, Role::Customer, "u2")).unwrap(), 25);
    let report = run(&db, |txn| query::audit(txn)).unwrap();
    assert!(report.is_consistent(), "{report:?}");
}
