//! Unbounded repetition of a single producer.

use super::protocol::{DynConsumer, Producer};
use super::relay::{Relay, RepeatCursor};

/// Re-subscribes to the same producer each time it completes normally.
///
/// Structurally this is concatenation with a cursor that never exhausts:
/// outstanding demand carries across every re-subscription, and the stream
/// only reaches a terminal state through an upstream failure or a
/// downstream cancellation, never through normal completion of the source.
///
/// The source must be `Clone` so each cycle can subscribe to a fresh
/// instance; producers in this protocol are cheap handles, so the clone is
/// shallow.
#[derive(Debug, Clone)]
pub struct Repeat<P> {
    source: P,
}

impl<P> Repeat<P>
where
    P: Producer + Clone + Send + 'static,
{
    /// Creates a repetition of `source`.
    #[must_use]
    pub fn new(source: P) -> Self {
        Self { source }
    }
}

impl<P> Producer for Repeat<P>
where
    P: Producer + Clone + Send + 'static,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, consumer: DynConsumer<Self::Output, Self::Failure>) {
        Relay::attach("repeat", consumer, RepeatCursor::new(self.source.clone()));
    }
}
