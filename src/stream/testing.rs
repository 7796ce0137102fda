//! Instrumented protocol endpoints for exercising combinators.
//!
//! These producers and consumers honor the full backpressure contract and
//! additionally record what happened to them (subscription counts, demand
//! requests, delivered values, terminal signals) so tests can assert on
//! the protocol traffic rather than just the values. They are published
//! (not test-gated) so downstream crates can drive their own pipelines
//! with them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::demand::{Demand, DemandLedger};
use super::protocol::{
    Completion, Consumer, DynConsumer, DynSubscription, Producer, Subscription,
};

/// Opaque failure value used by the instrumented producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("test failure {0}")]
pub struct TestFailure(pub u32);

/// Emits a fixed sequence of values honoring demand, then terminates.
///
/// Each subscription gets its own pass over the items; clones share the
/// subscription counter, so a test can hand a clone to a combinator and
/// still observe whether the producer was ever subscribed to. Emission
/// stops as soon as the subscription is cancelled, even mid-drain.
#[derive(Debug, Clone)]
pub struct SequenceProducer<T, E = TestFailure>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    items: Vec<T>,
    outcome: Completion<E>,
    subscriptions: Arc<AtomicUsize>,
}

impl<T, E> SequenceProducer<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A producer that emits `items` and then finishes normally.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            outcome: Completion::Finished,
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A producer that emits `items` and then fails with `error`.
    ///
    /// With no items this fails straight from `subscribe`, since terminal
    /// signals need no demand.
    #[must_use]
    pub fn failing(items: Vec<T>, error: E) -> Self {
        Self {
            items,
            outcome: Completion::Failed(error),
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times this producer (or any clone of it) was subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl<T, E> Producer for SequenceProducer<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, consumer: DynConsumer<T, E>) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let subscription = Arc::new(SequenceSubscription {
            consumer: Arc::clone(&consumer),
            cancelled: AtomicBool::new(false),
            state: Mutex::new(SequenceEmission {
                pending: self.items.clone().into_iter(),
                outcome: Some(self.outcome.clone()),
                ledger: DemandLedger::new(),
                emitting: false,
                done: false,
            }),
        });
        consumer.on_subscribe(subscription.clone());
        // An empty sequence terminates without waiting for demand.
        subscription.drain();
    }
}

struct SequenceEmission<T, E> {
    pending: std::vec::IntoIter<T>,
    outcome: Option<Completion<E>>,
    ledger: DemandLedger,
    emitting: bool,
    done: bool,
}

struct SequenceSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    consumer: DynConsumer<T, E>,
    cancelled: AtomicBool,
    state: Mutex<SequenceEmission<T, E>>,
}

enum EmissionStep<T, E> {
    Emit(T),
    Complete(Completion<E>),
    Park,
}

impl<T, E> SequenceSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, SequenceEmission<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain(&self) {
        {
            let mut state = self.lock();
            if state.emitting || state.done {
                return;
            }
            state.emitting = true;
        }
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                self.lock().emitting = false;
                return;
            }
            let step = {
                let mut state = self.lock();
                if state.ledger.current().has_demand() {
                    match state.pending.next() {
                        Some(value) => {
                            let _ = state.ledger.take();
                            EmissionStep::Emit(value)
                        }
                        None => {
                            state.done = true;
                            state.emitting = false;
                            EmissionStep::Complete(
                                state.outcome.take().unwrap_or(Completion::Finished),
                            )
                        }
                    }
                } else if state.pending.as_slice().is_empty() {
                    state.done = true;
                    state.emitting = false;
                    EmissionStep::Complete(state.outcome.take().unwrap_or(Completion::Finished))
                } else {
                    state.emitting = false;
                    EmissionStep::Park
                }
            };
            match step {
                EmissionStep::Emit(value) => {
                    let additional = self.consumer.on_next(value);
                    if additional.has_demand() {
                        self.lock().ledger.add(additional);
                    }
                }
                EmissionStep::Complete(completion) => {
                    self.consumer.on_complete(completion);
                    return;
                }
                EmissionStep::Park => return,
            }
        }
    }
}

impl<T, E> Subscription for SequenceSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.lock().ledger.add(demand);
        self.drain();
    }

    fn cancel(&self) {
        // Lock-free so a consumer can cancel from inside its own on_next
        // while the drain loop holds (or is about to take) the state lock.
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Infinite producer emitting `0, 1, 2, …`, recording every demand request
/// it receives.
///
/// Pair it with bounded demand: unbounded demand would drain forever.
#[derive(Debug, Clone, Default)]
pub struct CounterProducer {
    requests: Arc<Mutex<Vec<Demand>>>,
    subscriptions: Arc<AtomicUsize>,
}

impl CounterProducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every demand request made against this producer, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Demand> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times this producer (or any clone of it) was subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl Producer for CounterProducer {
    type Output = u64;
    type Failure = TestFailure;

    fn subscribe(&self, consumer: DynConsumer<u64, TestFailure>) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let subscription = Arc::new(CounterSubscription {
            consumer,
            requests: Arc::clone(&self.requests),
            cancelled: AtomicBool::new(false),
            state: Mutex::new(CounterEmission {
                next: 0,
                ledger: DemandLedger::new(),
                emitting: false,
            }),
        });
        let downstream = Arc::clone(&subscription.consumer);
        downstream.on_subscribe(subscription);
    }
}

struct CounterEmission {
    next: u64,
    ledger: DemandLedger,
    emitting: bool,
}

struct CounterSubscription {
    consumer: DynConsumer<u64, TestFailure>,
    requests: Arc<Mutex<Vec<Demand>>>,
    cancelled: AtomicBool,
    state: Mutex<CounterEmission>,
}

impl CounterSubscription {
    fn lock(&self) -> MutexGuard<'_, CounterEmission> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain(&self) {
        {
            let mut state = self.lock();
            if state.emitting {
                return;
            }
            state.emitting = true;
        }
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                self.lock().emitting = false;
                return;
            }
            let value = {
                let mut state = self.lock();
                if state.ledger.take() {
                    let value = state.next;
                    state.next += 1;
                    Some(value)
                } else {
                    state.emitting = false;
                    None
                }
            };
            match value {
                Some(value) => {
                    let additional = self.consumer.on_next(value);
                    if additional.has_demand() {
                        self.lock().ledger.add(additional);
                    }
                }
                None => return,
            }
        }
    }
}

impl Subscription for CounterSubscription {
    fn request(&self, demand: Demand) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(demand);
        self.lock().ledger.add(demand);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Producer driven entirely by the test: values and terminal signals are
/// pushed by hand, regardless of granted demand, so tests can play a rogue
/// upstream and exercise late-signal handling.
#[derive(Debug)]
pub struct ManualProducer<T, E = TestFailure>
where
    T: Send + 'static,
    E: Send + 'static,
{
    core: Arc<ManualCore<T, E>>,
}

struct ManualCore<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    consumer: Mutex<Option<DynConsumer<T, E>>>,
    requests: Mutex<Vec<Demand>>,
    cancelled: AtomicBool,
    subscriptions: AtomicUsize,
}

impl<T, E> std::fmt::Debug for ManualCore<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualCore")
            .field("cancelled", &self.cancelled)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl<T, E> Clone for ManualProducer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T, E> ManualProducer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(ManualCore {
                consumer: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                cancelled: AtomicBool::new(false),
                subscriptions: AtomicUsize::new(0),
            }),
        }
    }

    fn current_consumer(&self) -> Option<DynConsumer<T, E>> {
        self.core
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pushes a value at the consumer, returning the additional demand the
    /// consumer granted inline. No-op returning [`Demand::NONE`] before
    /// subscription.
    pub fn emit(&self, value: T) -> Demand {
        match self.current_consumer() {
            Some(consumer) => consumer.on_next(value),
            None => Demand::NONE,
        }
    }

    /// Pushes a terminal signal at the consumer.
    pub fn complete(&self, completion: Completion<E>) {
        if let Some(consumer) = self.current_consumer() {
            consumer.on_complete(completion);
        }
    }

    /// Hands the consumer a second subscription handle, violating the
    /// one-live-subscription contract on purpose.
    pub fn offer_subscription(&self) {
        if let Some(consumer) = self.current_consumer() {
            consumer.on_subscribe(Arc::new(ManualSubscription {
                core: Arc::clone(&self.core),
            }));
        }
    }

    /// Every demand request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Demand> {
        self.core
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any handed-out subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.cancelled.load(Ordering::SeqCst)
    }

    /// How many times this producer (or any clone of it) was subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.core.subscriptions.load(Ordering::SeqCst)
    }
}

impl<T, E> Default for ManualProducer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Producer for ManualProducer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, consumer: DynConsumer<T, E>) {
        self.core.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self
            .core
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&consumer));
        consumer.on_subscribe(Arc::new(ManualSubscription {
            core: Arc::clone(&self.core),
        }));
    }
}

struct ManualSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    core: Arc<ManualCore<T, E>>,
}

impl<T, E> Subscription for ManualSubscription<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.core
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(demand);
    }

    fn cancel(&self) {
        self.core.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Consumer that records everything delivered to it.
///
/// `initial_demand` is requested as soon as the subscription arrives
/// (pass [`Demand::NONE`] to request nothing up front), each delivery
/// returns `additional_demand` inline, and `cancel_after` cancels the
/// subscription once that many values have been recorded.
pub struct ProbeConsumer<T, E = TestFailure>
where
    T: Send + 'static,
    E: Send + 'static,
{
    initial_demand: Demand,
    additional_demand: Demand,
    cancel_after: Option<usize>,
    state: Mutex<ProbeState<T, E>>,
}

struct ProbeState<T, E> {
    subscription: Option<DynSubscription>,
    values: Vec<T>,
    completions: Vec<Completion<E>>,
}

impl<T, E> ProbeConsumer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    #[must_use]
    pub fn new(initial_demand: Demand) -> Self {
        Self {
            initial_demand,
            additional_demand: Demand::NONE,
            cancel_after: None,
            state: Mutex::new(ProbeState {
                subscription: None,
                values: Vec::new(),
                completions: Vec::new(),
            }),
        }
    }

    /// Demand returned inline from every delivery.
    #[must_use]
    pub fn with_additional_demand(mut self, demand: Demand) -> Self {
        self.additional_demand = demand;
        self
    }

    /// Cancels the subscription once `count` values have arrived.
    #[must_use]
    pub fn with_cancel_after(mut self, count: usize) -> Self {
        self.cancel_after = Some(count);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> Option<DynSubscription> {
        self.lock().subscription.clone()
    }

    /// Values recorded so far.
    #[must_use]
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().values.clone()
    }

    /// Number of values recorded so far.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.lock().values.len()
    }

    /// First terminal signal recorded, if any.
    #[must_use]
    pub fn completion(&self) -> Option<Completion<E>>
    where
        E: Clone,
    {
        self.lock().completions.first().cloned()
    }

    /// Number of terminal signals recorded; more than one is a protocol
    /// violation by whatever this probe subscribed to.
    #[must_use]
    pub fn completion_count(&self) -> usize {
        self.lock().completions.len()
    }

    /// Whether any terminal signal has arrived.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.completion_count() > 0
    }

    /// Grants further demand through the captured subscription.
    pub fn request_more(&self, demand: Demand) {
        if let Some(subscription) = self.subscription() {
            subscription.request(demand);
        }
    }

    /// Cancels the captured subscription.
    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }
}

impl<T, E> Consumer for ProbeConsumer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn on_subscribe(&self, subscription: DynSubscription) {
        self.lock().subscription = Some(subscription.clone());
        if self.initial_demand.has_demand() {
            subscription.request(self.initial_demand);
        }
    }

    fn on_next(&self, value: T) -> Demand {
        let should_cancel = {
            let mut state = self.lock();
            state.values.push(value);
            self.cancel_after
                .is_some_and(|limit| state.values.len() >= limit)
        };
        if should_cancel {
            self.cancel();
            return Demand::NONE;
        }
        self.additional_demand
    }

    fn on_complete(&self, completion: Completion<E>) {
        self.lock().completions.push(completion);
    }
}
