//! The subscription relay: the shared core of the sequencing combinators.
//!
//! A relay sits between one downstream consumer and one upstream producer
//! at a time. It implements the downstream-facing [`Subscription`] contract
//! and the upstream-facing [`Consumer`] contract, tracks unfulfilled
//! downstream demand in a [`DemandLedger`], and, when the current upstream
//! completes normally, advances a [`SourceCursor`] to the next producer
//! and re-subscribes itself, carrying the outstanding demand across the
//! switch.
//!
//! Locking discipline: all mutable state lives behind one mutex, acquired
//! only long enough to read-or-update the state and capture a snapshot of
//! the handle needed for the side effect; calls into upstream or downstream
//! handles always happen outside the lock, on the snapshot. The lifecycle
//! stage is mirrored in a lock-free cell so late upstream signals can be
//! dropped without contending for the mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crossbeam::atomic::AtomicCell;
use tracing::{debug, trace};

use super::demand::{Demand, DemandLedger};
use super::protocol::{
    Completion, Consumer, DynConsumer, DynSubscription, Producer, Subscription,
};

/// Where a relay is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// Waiting for the first upstream producer to accept the subscription.
    Idle,
    /// An upstream handle is live.
    Subscribed,
    /// The previous upstream completed; the next source is being attached.
    Switching,
    /// Terminal: the stream finished or failed.
    Completed,
    /// Terminal: downstream cancelled.
    Cancelled,
}

impl Lifecycle {
    pub(crate) const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A monotonic cursor over the sequence of upstream producers.
///
/// The cursor only ever moves forward; it is never rewound. A finite cursor
/// signals exhaustion by returning `None`, which the relay translates into
/// normal completion downstream.
pub(crate) trait SourceCursor: Send + 'static {
    type Source: Producer;

    /// Yields the next upstream producer, or `None` when the sequence is
    /// exhausted.
    fn advance(&mut self) -> Option<Self::Source>;
}

/// Cursor over a finite, ordered sequence of producers (concatenation).
pub(crate) struct SequenceCursor<P> {
    sources: std::vec::IntoIter<P>,
}

impl<P> SequenceCursor<P> {
    pub(crate) fn new(sources: Vec<P>) -> Self {
        Self {
            sources: sources.into_iter(),
        }
    }
}

impl<P> SourceCursor for SequenceCursor<P>
where
    P: Producer + Send + 'static,
{
    type Source = P;

    fn advance(&mut self) -> Option<P> {
        self.sources.next()
    }
}

/// Cursor that yields the same producer indefinitely (repetition).
pub(crate) struct RepeatCursor<P> {
    source: P,
}

impl<P> RepeatCursor<P> {
    pub(crate) fn new(source: P) -> Self {
        Self { source }
    }
}

impl<P> SourceCursor for RepeatCursor<P>
where
    P: Producer + Clone + Send + 'static,
{
    type Source = P;

    fn advance(&mut self) -> Option<P> {
        Some(self.source.clone())
    }
}

type OutputOf<C> = <<C as SourceCursor>::Source as Producer>::Output;
type FailureOf<C> = <<C as SourceCursor>::Source as Producer>::Failure;

struct RelayState<C: SourceCursor> {
    upstream: Option<DynSubscription>,
    ledger: DemandLedger,
    cursor: C,
}

/// The relay object shared by the sequencing combinators.
pub(crate) struct Relay<C: SourceCursor> {
    weak: Weak<Self>,
    label: &'static str,
    downstream: DynConsumer<OutputOf<C>, FailureOf<C>>,
    lifecycle: AtomicCell<Lifecycle>,
    state: Mutex<RelayState<C>>,
}

impl<C: SourceCursor> Relay<C> {
    /// Builds a relay, hands it to the downstream consumer as its
    /// subscription, and initiates the first upstream attachment.
    pub(crate) fn attach(
        label: &'static str,
        downstream: DynConsumer<OutputOf<C>, FailureOf<C>>,
        cursor: C,
    ) {
        let relay = Arc::new_cyclic(|weak| Relay {
            weak: weak.clone(),
            label,
            downstream,
            lifecycle: AtomicCell::new(Lifecycle::Idle),
            state: Mutex::new(RelayState {
                upstream: None,
                ledger: DemandLedger::new(),
                cursor,
            }),
        });
        relay.downstream.on_subscribe(relay.clone());
        relay.initiate();
    }

    fn lock(&self) -> MutexGuard<'_, RelayState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pulls the next source from the cursor and subscribes to it, or
    /// finishes downstream when the cursor is exhausted.
    fn initiate(&self) {
        let next = self.lock().cursor.advance();
        match next {
            Some(source) => {
                let Some(this) = self.weak.upgrade() else {
                    return;
                };
                source.subscribe(this);
            }
            None => {
                debug!("{}: source sequence exhausted, finishing", self.label);
                self.lifecycle.store(Lifecycle::Completed);
                self.downstream.on_complete(Completion::Finished);
            }
        }
    }
}

impl<C: SourceCursor> Subscription for Relay<C> {
    fn request(&self, demand: Demand) {
        assert!(
            demand.has_demand(),
            "requested demand must be positive, got {demand:?}"
        );
        if self.lifecycle.load().is_terminal() {
            return;
        }
        trace!("{}: downstream requested {:?}", self.label, demand);
        let upstream = {
            let mut state = self.lock();
            state.ledger.add(demand);
            state.upstream.clone()
        };
        // Forward the delta; demand recorded before the upstream handle
        // arrives is forwarded by on_subscribe instead.
        if let Some(upstream) = upstream {
            upstream.request(demand);
        }
    }

    fn cancel(&self) {
        let upstream = {
            let mut state = self.lock();
            self.lifecycle.store(Lifecycle::Cancelled);
            state.ledger.reset();
            state.upstream.take()
        };
        if let Some(upstream) = upstream {
            debug!("{}: cancelled by downstream", self.label);
            upstream.cancel();
        }
    }
}

impl<C: SourceCursor> Consumer for Relay<C> {
    type Input = OutputOf<C>;
    type Failure = FailureOf<C>;

    fn on_subscribe(&self, subscription: DynSubscription) {
        if self.lifecycle.load() == Lifecycle::Cancelled {
            subscription.cancel();
            return;
        }
        let pending = {
            let mut state = self.lock();
            assert!(
                state.upstream.is_none(),
                "{}: received a second subscription while one is live",
                self.label
            );
            state.upstream = Some(subscription.clone());
            self.lifecycle.store(Lifecycle::Subscribed);
            state.ledger.current()
        };
        // Demand granted against an earlier source (or before any source
        // attached) carries over to the new upstream.
        if pending.has_demand() {
            trace!("{}: forwarding carried demand {:?}", self.label, pending);
            subscription.request(pending);
        }
    }

    fn on_next(&self, value: Self::Input) -> Demand {
        if self.lifecycle.load().is_terminal() {
            return Demand::NONE;
        }
        let additional = self.downstream.on_next(value);
        let upstream = {
            let mut state = self.lock();
            if self.lifecycle.load().is_terminal() {
                return Demand::NONE;
            }
            state.ledger.add(additional);
            let _ = state.ledger.take();
            if additional.has_demand() {
                state.upstream.clone()
            } else {
                None
            }
        };
        // Demand granted inline by the downstream is pushed upstream as an
        // explicit request; nothing is ever returned through the upstream's
        // on_next result.
        if let Some(upstream) = upstream {
            upstream.request(additional);
        }
        Demand::NONE
    }

    fn on_complete(&self, completion: Completion<Self::Failure>) {
        if self.lifecycle.load().is_terminal() {
            return;
        }
        match completion {
            Completion::Failed(error) => {
                debug!("{}: upstream failed, terminating", self.label);
                {
                    let mut state = self.lock();
                    state.upstream = None;
                    state.ledger.reset();
                    self.lifecycle.store(Lifecycle::Completed);
                }
                self.downstream.on_complete(Completion::Failed(error));
            }
            Completion::Finished => {
                // Completed normally: keep sequencing.
                {
                    let mut state = self.lock();
                    state.upstream = None;
                    self.lifecycle.store(Lifecycle::Switching);
                }
                trace!("{}: source finished, advancing", self.label);
                self.initiate();
            }
        }
    }
}
