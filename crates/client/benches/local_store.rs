use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use selrs_client::{LocalLedgerStore, Storage};
use selrs_core::{KhazinaInput, KhazinaRecord};

fn input(i: usize) -> KhazinaInput {
    KhazinaInput {
        date: format!("{:02}-{:02}-2025", i % 28 + 1, i % 12 + 1),
        income: i as f64,
        expense: (i % 7) as f64,
        balance: 0.0,
        notes: String::new(),
    }
}

/// Every write rewrites the whole collection, so cost grows with its size.
fn bench_create_into_existing_collection(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("local_store_create");

    for existing in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("existing_records", existing), existing, |b, &count| {
            let store = LocalLedgerStore::<KhazinaRecord>::new(Storage::in_memory());
            rt.block_on(async {
                store.create_many((0..count).map(input).collect()).await.unwrap();
            });

            b.iter(|| {
                rt.block_on(async {
                    let rec = store.create(black_box(input(count))).await.unwrap();
                    store.delete(&rec.id).await.unwrap();
                })
            });
        });
    }

    group.finish();
}

fn bench_partition_list(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = LocalLedgerStore::<KhazinaRecord>::new(Storage::in_memory());
    rt.block_on(async {
        store.create_many((0..1000).map(input).collect()).await.unwrap();
    });

    c.bench_function("local_store_list_year", |b| {
        b.iter(|| rt.block_on(async { store.list(black_box(Some(2025))).await.unwrap() }));
    });
}

criterion_group!(benches, bench_create_into_existing_collection, bench_partition_list);
criterion_main!(benches);
