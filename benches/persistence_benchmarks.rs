// Copyright 2025 Cowboy AI, LLC.

use cim_eventsource::{
    AggregateCore, AggregateRepository, AggregateRoot, DomainEvent, Event, EventHandlers,
    EventStore, InMemoryEventStore, TransformRegistry,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Incremented {
    by: u64,
}

impl DomainEvent for Incremented {}

#[derive(Debug, Clone)]
struct BenchCounter {
    core: AggregateCore,
    total: u64,
}

impl AggregateRoot for BenchCounter {
    const CATEGORY: &'static str = "bench";

    fn from_core(core: AggregateCore) -> Self {
        Self { core, total: 0 }
    }

    fn core(&self) -> &AggregateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore {
        &mut self.core
    }

    fn register_handlers(handlers: &mut EventHandlers<Self>) {
        handlers.on(|counter: &mut BenchCounter, event: &Event<Incremented>| {
            counter.total += event.data.by;
            Ok(())
        });
    }
}

fn setup_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn benchmark_in_memory_append(c: &mut Criterion) {
    let rt = setup_runtime();
    let mut group = c.benchmark_group("in_memory_append");

    for batch in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let store = InMemoryEventStore::new();
            b.iter(|| {
                let events = (0..batch)
                    .map(|i| Event::raw("Incremented", json!({ "by": i })))
                    .collect();
                rt.block_on(store.append_to_stream(black_box("bench_append"), events, None))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_repository_load(c: &mut Criterion) {
    let rt = setup_runtime();
    let mut group = c.benchmark_group("repository_load");

    for length in [10u64, 100, 1_000] {
        let store = Arc::new(InMemoryEventStore::new());
        let repository: AggregateRepository<BenchCounter> =
            AggregateRepository::new(store, Arc::new(TransformRegistry::new())).unwrap();

        rt.block_on(async {
            let mut counter = repository.create("load");
            for by in 0..length {
                counter.apply(Incremented { by });
            }
            repository.save(&mut counter).await.unwrap();
        });

        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.iter(|| {
                let counter = rt.block_on(repository.load(black_box("load"))).unwrap();
                black_box(counter.total)
            });
        });
    }

    group.finish();
}

fn benchmark_save_cycle(c: &mut Criterion) {
    let rt = setup_runtime();
    let store = Arc::new(InMemoryEventStore::new());
    let repository: AggregateRepository<BenchCounter> =
        AggregateRepository::new(store, Arc::new(TransformRegistry::new())).unwrap();
    let mut counter = repository.create("save");

    c.bench_function("repository_save_single_event", |b| {
        b.iter(|| {
            counter.apply(Incremented { by: 1 });
            rt.block_on(repository.save(&mut counter)).unwrap()
        });
    });
}

criterion_group!(
    benches,
    benchmark_in_memory_append,
    benchmark_repository_load,
    benchmark_save_cycle
);
criterion_main!(benches);
