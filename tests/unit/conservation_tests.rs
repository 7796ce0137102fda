//! Property tests for demand conservation and ordering across the
//! sequencing combinators.

use proptest::prelude::*;
use std::sync::Arc;
use streamrelay_rs::prelude::*;

proptest! {
    /// Deliveries never outrun the running sum of granted demand, and the
    /// delivered prefix is exactly the concatenation of the sources.
    #[test]
    fn test_concatenation_conserves_demand(
        sources in prop::collection::vec(prop::collection::vec(any::<i32>(), 0..6), 0..5),
        requests in prop::collection::vec(1u64..8, 0..8),
    ) {
        let producers: Vec<SequenceProducer<i32>> =
            sources.iter().cloned().map(SequenceProducer::new).collect();
        let expected: Vec<i32> = sources.iter().flatten().copied().collect();

        let probe = Arc::new(ProbeConsumer::<i32>::new(Demand::NONE));
        Concatenate::new(producers).subscribe(probe.clone());

        let mut granted: u64 = 0;
        for request in &requests {
            granted += *request;
            probe.request_more(Demand::finite(*request));
            prop_assert!(probe.value_count() as u64 <= granted);
        }

        let delivered = probe.values();
        let settled = expected.len().min(granted as usize);
        prop_assert_eq!(delivered.len(), settled);
        prop_assert_eq!(&delivered[..], &expected[..settled]);

        if expected.len() as u64 <= granted {
            prop_assert_eq!(probe.completion(), Some(Completion::Finished));
        } else {
            prop_assert_eq!(probe.completion_count(), 0);
        }
    }

    /// Repetition delivers exactly the granted number of copies, cycling
    /// through the source values in order, and never completes on its own.
    #[test]
    fn test_repetition_conserves_demand(
        items in prop::collection::vec(any::<i32>(), 1..4),
        granted in 0u64..24,
    ) {
        let source = SequenceProducer::<i32>::new(items.clone());
        let probe = Arc::new(ProbeConsumer::<i32>::new(Demand::NONE));
        Repeat::new(source).subscribe(probe.clone());

        if granted > 0 {
            probe.request_more(Demand::finite(granted));
        }

        let expected: Vec<i32> = items
            .iter()
            .cycle()
            .take(granted as usize)
            .copied()
            .collect();
        prop_assert_eq!(probe.values(), expected);
        prop_assert_eq!(probe.completion_count(), 0);
    }
}
