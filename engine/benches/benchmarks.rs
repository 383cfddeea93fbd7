//! Performance benchmarks for livelist-engine

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livelist_engine::{
    Entity, EventRepository, ListSynchronizer, Snapshot, SnapshotChannel, Values,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Row {
    id: u64,
    name: String,
}

impl Entity for Row {
    type Id = u64;

    fn id(&self) -> Option<&u64> {
        Some(&self.id)
    }
}

fn rows(count: u64) -> Vec<Arc<Row>> {
    (0..count)
        .map(|id| {
            Arc::new(Row {
                id,
                name: format!("row {}", id),
            })
        })
        .collect()
}

type Bound = (
    Arc<EventRepository<Row>>,
    ListSynchronizer<Row, EventRepository<Row>>,
    Vec<Arc<Row>>,
);

fn bound(count: u64) -> Bound {
    let repository = EventRepository::new_shared();
    let list = ListSynchronizer::new(Arc::clone(&repository));
    let initial = rows(count);
    let _feed = list.init(&Values::once(initial.clone()), None);
    (repository, list, initial)
}

fn bench_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("events");

    // Appends grow the list, so start from a fresh one every batch
    group.bench_function("insert", |b| {
        b.iter_batched(
            || bound(100),
            |(repository, list, _)| {
                repository.insert(black_box(Arc::new(Row {
                    id: 1000,
                    name: "new".into(),
                })));
                list
            },
            criterion::BatchSize::SmallInput,
        )
    });

    for size in [100u64, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("update_last", size), size, |b, &size| {
            let (repository, _list, _) = bound(size);
            let mut rev = 0u64;

            b.iter(|| {
                rev += 1;
                repository.update(black_box(Arc::new(Row {
                    id: size - 1,
                    name: format!("rev {}", rev),
                })))
            })
        });

        group.bench_with_input(BenchmarkId::new("replace_middle", size), size, |b, &size| {
            let (repository, list, _) = bound(size);

            b.iter(|| {
                let latest = list.feed().unwrap().latest();
                let previous = Arc::clone(&latest[(size / 2) as usize]);
                let next = Arc::new(Row {
                    id: previous.id,
                    name: previous.name.clone(),
                });
                repository.replace(black_box(previous), black_box(next))
            })
        });

        group.bench_with_input(BenchmarkId::new("update_miss", size), size, |b, &size| {
            let (repository, _list, _) = bound(size);
            let stranger = Arc::new(Row {
                id: u64::MAX,
                name: "nobody".into(),
            });

            b.iter(|| repository.update(black_box(Arc::clone(&stranger))))
        });
    }

    group.finish();
}

fn bench_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshots");

    for size in [100u64, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("channel_push", size), size, |b, &size| {
            let list = ListSynchronizer::new(EventRepository::<Row>::new_shared());
            let channel = SnapshotChannel::new();
            let _feed = list.init(&channel, None);
            let batch = rows(size);

            b.iter(|| channel.send(black_box(batch.clone())))
        });

        group.bench_with_input(BenchmarkId::new("modify_reverse", size), size, |b, &size| {
            let (_repository, list, _) = bound(size);

            b.iter(|| list.modify(|items| items.rev()))
        });

        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, &size| {
            let snapshot = Snapshot::from_vec(rows(size));

            b.iter(|| black_box(&snapshot).to_json())
        });
    }

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for subscribers in [1usize, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::new("insert_with_subscribers", subscribers),
            subscribers,
            |b, &subscribers| {
                let (repository, list, _) = bound(10);
                let feed = list.feed().unwrap();
                let _subs: Vec<_> = (0..subscribers)
                    .map(|_| feed.subscribe(|s| {
                        black_box(s.len());
                    }))
                    .collect();
                let mut id = 10u64;

                b.iter(|| {
                    id += 1;
                    repository.insert(Arc::new(Row {
                        id,
                        name: String::new(),
                    }))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_events, bench_snapshots, bench_fanout);
criterion_main!(benches);
