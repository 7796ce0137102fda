//! Interval pacing: scheduler-timed delays between upstream pulls.
//!
//! [`IntervalProducer`] wraps a single upstream producer and inserts a
//! computed delay before each upstream pull. Pacing governs the *pull*
//! rate: the relay asks the upstream for exactly one value at a time, which
//! is what makes the computed interval meaningful as "time between
//! deliveries" rather than "time before a burst".
//!
//! Unlike the sequencing relay, this relay is confined to the scheduler's
//! serial execution context: every mutating entry point is submitted as a
//! unit of work to the scheduler, which serializes them by construction.
//! The state mutex is therefore uncontended and acts as the safety
//! primitive, not the serialization primitive. One consequence is that
//! cancellation takes effect asynchronously upstream: `cancel()` records
//! the cancellation before returning (so no further values reach
//! downstream), but the upstream handle is only cancelled once the
//! scheduled task runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use tracing::{debug, trace};

use super::demand::{Demand, DemandLedger};
use super::protocol::{
    Completion, Consumer, DynConsumer, DynSubscription, Producer, Subscription,
};
use super::relay::Lifecycle;
use super::scheduler::Scheduler;

type IntervalFn<T> = Arc<dyn Fn(Option<&T>, &T) -> Duration + Send + Sync>;
type InitialIntervalFn<T> = Arc<dyn Fn(Option<&T>) -> Duration + Send + Sync>;

/// Paces the values of an upstream producer by a caller-supplied interval
/// function.
///
/// After each delivered value the relay computes
/// `interval(previous, current)` and defers the next single-item upstream
/// pull until that delay has elapsed on the scheduler. `previous` is `None`
/// for the first delivered value unless a seed was supplied with
/// [`IntervalProducer::with_seed`]. The delay before the very first pull
/// comes from the initial-interval function
/// ([`IntervalProducer::with_initial_interval`], zero by default).
///
/// An interval of exactly zero bypasses the timer entirely and pulls
/// immediately, avoiding scheduler-queue latency for the common
/// constant-zero case.
pub struct IntervalProducer<P: Producer> {
    source: P,
    scheduler: Arc<dyn Scheduler>,
    interval: IntervalFn<P::Output>,
    initial_interval: InitialIntervalFn<P::Output>,
    seed: Option<P::Output>,
}

impl<P> IntervalProducer<P>
where
    P: Producer,
    P::Output: Clone,
{
    /// Creates a pacer computing each delay from the previous and current
    /// values.
    pub fn new<F>(source: P, scheduler: Arc<dyn Scheduler>, interval: F) -> Self
    where
        F: Fn(Option<&P::Output>, &P::Output) -> Duration + Send + Sync + 'static,
    {
        Self {
            source,
            scheduler,
            interval: Arc::new(interval),
            initial_interval: Arc::new(|_| Duration::ZERO),
            seed: None,
        }
    }

    /// Creates a pacer with the same fixed delay before every pull.
    pub fn constant(source: P, scheduler: Arc<dyn Scheduler>, period: Duration) -> Self {
        Self::new(source, scheduler, move |_, _| period)
    }

    /// Creates a pacer whose delay depends on whether the current value
    /// equals the previous one.
    ///
    /// The predicate sees `false` for the first value when no seed was
    /// supplied. This covers the common "slow down only when values
    /// repeat" case.
    pub fn on_repeats<F>(source: P, scheduler: Arc<dyn Scheduler>, interval: F) -> Self
    where
        P::Output: PartialEq,
        F: Fn(bool) -> Duration + Send + Sync + 'static,
    {
        Self::new(source, scheduler, move |previous, current| {
            interval(previous.is_some_and(|value| value == current))
        })
    }

    /// Seeds the `previous` value used by the interval functions before any
    /// element has arrived.
    #[must_use]
    pub fn with_seed(mut self, seed: P::Output) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the delay computed once before the very first upstream pull,
    /// from the optional seed value. Defaults to zero.
    #[must_use]
    pub fn with_initial_interval<F>(mut self, initial_interval: F) -> Self
    where
        F: Fn(Option<&P::Output>) -> Duration + Send + Sync + 'static,
    {
        self.initial_interval = Arc::new(initial_interval);
        self
    }
}

impl<P> Producer for IntervalProducer<P>
where
    P: Producer,
    P::Output: Clone,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, consumer: DynConsumer<Self::Output, Self::Failure>) {
        let relay = PacerRelay::attach(
            consumer,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.interval),
            Arc::clone(&self.initial_interval),
            self.seed.clone(),
        );
        self.source.subscribe(relay);
    }
}

struct PacerState<T> {
    upstream: Option<DynSubscription>,
    ledger: DemandLedger,
    /// Last value observed, seeded with the configured initial value.
    previous: Option<T>,
    /// A single-item pull has been issued or armed and not yet settled.
    pull_in_flight: bool,
    /// The initial-interval delay has already been consumed.
    primed: bool,
}

/// Scheduler-confined relay behind [`IntervalProducer`].
struct PacerRelay<T, E> {
    weak: Weak<Self>,
    downstream: DynConsumer<T, E>,
    scheduler: Arc<dyn Scheduler>,
    interval: IntervalFn<T>,
    initial_interval: InitialIntervalFn<T>,
    lifecycle: AtomicCell<Lifecycle>,
    state: Mutex<PacerState<T>>,
}

impl<T, E> PacerRelay<T, E>
where
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    fn attach(
        downstream: DynConsumer<T, E>,
        scheduler: Arc<dyn Scheduler>,
        interval: IntervalFn<T>,
        initial_interval: InitialIntervalFn<T>,
        seed: Option<T>,
    ) -> Arc<Self> {
        let relay = Arc::new_cyclic(|weak| PacerRelay {
            weak: weak.clone(),
            downstream,
            scheduler,
            interval,
            initial_interval,
            lifecycle: AtomicCell::new(Lifecycle::Idle),
            state: Mutex::new(PacerState {
                upstream: None,
                ledger: DemandLedger::new(),
                previous: seed,
                pull_in_flight: false,
                primed: false,
            }),
        });
        relay.downstream.on_subscribe(relay.clone());
        relay
    }

    fn lock(&self) -> MutexGuard<'_, PacerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn strong(&self) -> Option<Arc<Self>> {
        self.weak.upgrade()
    }

    /// Issues the next single-item pull, either immediately or after
    /// `delay` on the scheduler's timer.
    fn pull_after(self: &Arc<Self>, delay: Duration, upstream: DynSubscription) {
        if delay.is_zero() {
            upstream.request(Demand::ONE);
            return;
        }
        trace!("pacer: next pull in {delay:?}");
        let weak = Arc::downgrade(self);
        self.scheduler.schedule_after(
            delay,
            Box::new(move || {
                if let Some(relay) = weak.upgrade() {
                    relay.fire_pull();
                }
            }),
        );
    }

    fn fire_pull(self: &Arc<Self>) {
        if self.lifecycle.load().is_terminal() {
            return;
        }
        let upstream = {
            let mut state = self.lock();
            if state.ledger.current().has_demand() {
                state.upstream.clone()
            } else {
                state.pull_in_flight = false;
                None
            }
        };
        if let Some(upstream) = upstream {
            upstream.request(Demand::ONE);
        }
    }

    fn do_request(self: &Arc<Self>, demand: Demand) {
        if self.lifecycle.load().is_terminal() {
            return;
        }
        let armed = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.ledger.add(demand);
            match (&state.upstream, state.pull_in_flight) {
                (Some(upstream), false) => {
                    state.pull_in_flight = true;
                    let first = !state.primed;
                    state.primed = true;
                    Some((Arc::clone(upstream), first, state.previous.clone()))
                }
                _ => None,
            }
        };
        if let Some((upstream, first, seed)) = armed {
            // The first pull waits out the initial interval; a pull resumed
            // after the demand ran dry goes out immediately.
            let delay = if first {
                (self.initial_interval)(seed.as_ref())
            } else {
                Duration::ZERO
            };
            self.pull_after(delay, upstream);
        }
    }

    fn do_cancel(&self) {
        let upstream = {
            let mut state = self.lock();
            state.ledger.reset();
            state.pull_in_flight = false;
            state.upstream.take()
        };
        if let Some(upstream) = upstream {
            debug!("pacer: cancelled by downstream");
            upstream.cancel();
        }
    }

    fn do_on_subscribe(self: &Arc<Self>, subscription: DynSubscription) {
        if self.lifecycle.load() == Lifecycle::Cancelled {
            subscription.cancel();
            return;
        }
        let armed = {
            let mut state = self.lock();
            assert!(
                state.upstream.is_none(),
                "pacer: received a second subscription while one is live"
            );
            state.upstream = Some(subscription.clone());
            self.lifecycle.store(Lifecycle::Subscribed);
            if state.ledger.current().has_demand() && !state.pull_in_flight {
                state.pull_in_flight = true;
                state.primed = true;
                Some(state.previous.clone())
            } else {
                None
            }
        };
        // Demand that arrived before the upstream did starts the first
        // pull cycle now.
        if let Some(seed) = armed {
            let delay = (self.initial_interval)(seed.as_ref());
            self.pull_after(delay, subscription);
        }
    }

    fn do_on_next(self: &Arc<Self>, value: T) {
        if self.lifecycle.load() != Lifecycle::Subscribed {
            return;
        }
        let additional = self.downstream.on_next(value.clone());
        let (upstream, previous) = {
            let mut state = self.lock();
            state.ledger.add(additional);
            let _ = state.ledger.take();
            let previous = state.previous.take();
            let upstream = if state.ledger.current().has_demand() {
                state.upstream.clone()
            } else {
                None
            };
            state.pull_in_flight = upstream.is_some();
            (upstream, previous)
        };
        match upstream {
            Some(upstream) => {
                // Interval functions are caller-supplied; keep them outside
                // the critical section.
                let delay = (self.interval)(previous.as_ref(), &value);
                self.record_previous(value);
                self.pull_after(delay, upstream);
            }
            None => {
                // Demand ran dry: idle until the next request.
                self.record_previous(value);
            }
        }
    }

    fn record_previous(&self, value: T) {
        self.lock().previous = Some(value);
    }

    fn do_on_complete(&self, completion: Completion<E>) {
        if self.lifecycle.load().is_terminal() {
            return;
        }
        {
            let mut state = self.lock();
            state.upstream = None;
            state.ledger.reset();
            state.pull_in_flight = false;
            self.lifecycle.store(Lifecycle::Completed);
        }
        debug!("pacer: upstream terminated, forwarding");
        self.downstream.on_complete(completion);
    }
}

impl<T, E> Subscription for PacerRelay<T, E>
where
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        assert!(
            demand.has_demand(),
            "requested demand must be positive, got {demand:?}"
        );
        if self.lifecycle.load().is_terminal() {
            return;
        }
        let Some(this) = self.strong() else {
            return;
        };
        self.scheduler
            .schedule(Box::new(move || this.do_request(demand)));
    }

    fn cancel(&self) {
        if self.lifecycle.load() == Lifecycle::Cancelled {
            return;
        }
        // Recorded synchronously: later deliveries are dropped even before
        // the scheduled upstream cancel runs.
        self.lifecycle.store(Lifecycle::Cancelled);
        let Some(this) = self.strong() else {
            return;
        };
        self.scheduler.schedule(Box::new(move || this.do_cancel()));
    }
}

impl<T, E> Consumer for PacerRelay<T, E>
where
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn on_subscribe(&self, subscription: DynSubscription) {
        let Some(this) = self.strong() else {
            subscription.cancel();
            return;
        };
        self.scheduler
            .schedule(Box::new(move || this.do_on_subscribe(subscription)));
    }

    fn on_next(&self, value: Self::Input) -> Demand {
        if let Some(this) = self.strong() {
            self.scheduler
                .schedule(Box::new(move || this.do_on_next(value)));
        }
        Demand::NONE
    }

    fn on_complete(&self, completion: Completion<Self::Failure>) {
        let Some(this) = self.strong() else {
            return;
        };
        self.scheduler
            .schedule(Box::new(move || this.do_on_complete(completion)));
    }
}
