use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use streamrelay_rs::prelude::*;

fn benchmark_demand_ledger(c: &mut Criterion) {
    c.bench_function("demand_ledger_add_take_1k", |b| {
        b.iter(|| {
            let mut ledger = DemandLedger::new();
            for _ in 0..1_000 {
                ledger.add(Demand::ONE);
                let _ = ledger.take();
            }
            black_box(ledger.current())
        });
    });
}

fn benchmark_concatenation_drain(c: &mut Criterion) {
    c.bench_function("concatenate_4x256_unbounded", |b| {
        b.iter(|| {
            let sources: Vec<SequenceProducer<u64>> = (0..4)
                .map(|_| SequenceProducer::new((0..256).collect()))
                .collect();
            let probe = Arc::new(ProbeConsumer::<u64>::new(Demand::Unbounded));
            Concatenate::new(sources).subscribe(probe.clone());
            black_box(probe.value_count())
        });
    });
}

fn benchmark_repetition_drain(c: &mut Criterion) {
    c.bench_function("repeat_256_single_value", |b| {
        b.iter(|| {
            let probe = Arc::new(ProbeConsumer::<u64>::new(Demand::finite(256)));
            Repeat::new(SequenceProducer::new(vec![1u64])).subscribe(probe.clone());
            black_box(probe.value_count())
        });
    });
}

criterion_group!(
    benches,
    benchmark_demand_ledger,
    benchmark_concatenation_drain,
    benchmark_repetition_drain,
);

criterion_main!(benches);
