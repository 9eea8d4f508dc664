// Ledger engine benchmarks.
//
// Covers customer transfers over fragmented chunk sets, the buy/withdraw
// settlement round trip, and a full ledger audit, all on the memory backend.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use loyalty_ledger::escrow;
use loyalty_ledger::query;
use loyalty_ledger::registry::{self, Role};
use loyalty_ledger::storage::{MemoryBackend, Transaction};
use loyalty_ledger::transfer;

/// A bank, two customers, one shop, with `chunks` gifts of 10 to u1.
fn fragmented(chunks: usize) -> MemoryBackend {
    let backend = MemoryBackend::new();
    let mut txn = Transaction::begin(&backend);
    registry::create(&mut txn, "bank1", Role::Bank).unwrap();
    registry::create(&mut txn, "u1", Role::Customer).unwrap();
    registry::create(&mut txn, "u2", Role::Customer).unwrap();
    registry::create(&mut txn, "s1", Role::Shop).unwrap();
    for _ in 0..chunks {
        transfer::gift(&mut txn, "bank1", "u1", 10).unwrap();
    }
    txn.commit().unwrap();
    backend
}

fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/transfer");
    for chunks in [1usize, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(chunks), &chunks, |b, &chunks| {
            b.iter_batched(
                || fragmented(chunks),
                |backend| {
                    let mut txn = Transaction::begin(&backend);
                    transfer::transfer(&mut txn, "u1", "u2", (chunks as u64) * 10 - 5).unwrap();
                    txn.commit().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_settlement(c: &mut Criterion) {
    c.bench_function("ledger/buy_withdraw", |b| {
        b.iter_batched(
            || fragmented(16),
            |backend| {
                let mut txn = Transaction::begin(&backend);
                escrow::buy(&mut txn, "u1", "s1", 155).unwrap();
                txn.commit().unwrap();

                let mut txn = Transaction::begin(&backend);
                escrow::withdraw(&mut txn, "s1", "u1", 155).unwrap();
                txn.commit().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_audit(c: &mut Criterion) {
    let backend = fragmented(256);
    c.bench_function("ledger/audit", |b| {
        b.iter(|| {
            let mut txn = Transaction::begin(&backend);
            query::audit(&mut txn).unwrap()
        });
    });
}

criterion_group!(benches, bench_transfer, bench_settlement, bench_audit);
criterion_main!(benches);
