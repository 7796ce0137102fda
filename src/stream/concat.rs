//! Sequential concatenation of a finite sequence of producers.

use super::protocol::{DynConsumer, Producer};
use super::relay::{Relay, SequenceCursor};

/// Concatenates the values of several producers of the same type, in order.
///
/// Each subscriber gets a fresh pass over the sequence: the combinator
/// subscribes to one source at a time, delivers all of its values, and only
/// moves to the next source once the previous one completed normally, so
/// downstream observes all values of source *k* before any value of source
/// *k + 1*, with no interleaving. Demand is transparent across source
/// boundaries: a request made while source *k* is live keeps being honored
/// by source *k + 1* without a new `request` call.
///
/// A failure in any source terminates the whole chain immediately; the
/// remaining sources are never subscribed to. An empty sequence completes
/// downstream right away.
#[derive(Debug, Clone)]
pub struct Concatenate<P> {
    sources: Vec<P>,
}

impl<P> Concatenate<P>
where
    P: Producer + Clone + Send + 'static,
{
    /// Creates a concatenation over `sources`, consumed left to right.
    #[must_use]
    pub fn new(sources: Vec<P>) -> Self {
        Self { sources }
    }

    /// Number of sources in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` when the sequence holds no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<P> Producer for Concatenate<P>
where
    P: Producer + Clone + Send + 'static,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, consumer: DynConsumer<Self::Output, Self::Failure>) {
        Relay::attach(
            "concatenate",
            consumer,
            SequenceCursor::new(self.sources.clone()),
        );
    }
}

impl<P> FromIterator<P> for Concatenate<P>
where
    P: Producer + Clone + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
