//! End-to-end pacing tests on a real Tokio runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};
use streamrelay_rs::prelude::*;

async fn wait_for_values(probe: &ProbeConsumer<u64>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while probe.value_count() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("paced values did not arrive in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paced_deliveries_respect_the_wall_clock() {
    let step = Duration::from_millis(20);
    let scheduler = Arc::new(TokioScheduler::new());
    let counter = CounterProducer::new();
    let paced = IntervalProducer::constant(counter.clone(), scheduler, step);

    let probe = Arc::new(ProbeConsumer::<u64>::new(Demand::finite(4)));
    let start = Instant::now();
    paced.subscribe(probe.clone());

    wait_for_values(&probe, 4).await;
    let elapsed = start.elapsed();

    assert_eq!(probe.values(), vec![0, 1, 2, 3]);
    // Four deliveries are separated by three full intervals at minimum.
    assert!(
        elapsed >= step * 3,
        "4 paced values arrived after {elapsed:?}, expected at least {:?}",
        step * 3
    );
    assert_eq!(counter.requests(), vec![Demand::ONE; 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_stops_paced_stream() {
    let scheduler = Arc::new(TokioScheduler::new());
    let counter = CounterProducer::new();
    let paced = IntervalProducer::constant(counter.clone(), scheduler, Duration::from_millis(10));

    let probe = Arc::new(ProbeConsumer::<u64>::new(Demand::finite(100)));
    paced.subscribe(probe.clone());

    wait_for_values(&probe, 2).await;
    probe.cancel();

    // Give any armed timer a chance to misbehave.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let settled = probe.value_count();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(probe.value_count(), settled);
    assert!(!probe.is_terminated());
}

#[test]
fn test_scheduler_requires_a_runtime() {
    assert!(matches!(
        TokioScheduler::try_new().err(),
        Some(RelayError::RuntimeUnavailable)
    ));
}
