//! # Demand-Driven Stream Combinators
//!
//! A small family of stream combinators that compose upstream producers of
//! values into a single downstream-visible producer while honoring a
//! pull-based backpressure protocol: a consumer grants a bounded amount of
//! demand, and a producer never emits more than granted.
//!
//! The heart of the crate is the **subscription relay**: the stateful
//! object that bridges one downstream consumer to one upstream producer at
//! a time. It tracks unfulfilled downstream demand in a saturating ledger,
//! forwards and re-derives demand to upstream producers over time,
//! serializes concurrent mutation of that shared state, chains upstream
//! producers sequentially on completion, and inserts scheduler-timed
//! delays between upstream pulls.
//!
//! ## Combinators
//!
//! - [`Concatenate`]: delivers all values of one source, then moves to the
//!   next, preserving outstanding demand across the switch. Order is
//!   strict (all of source *k* before any of source *k + 1*), and a
//!   failure in any source terminates the whole chain without touching the
//!   remaining sources.
//! - [`Repeat`]: re-subscribes to the same source each time it completes
//!   normally; terminates only through upstream failure or downstream
//!   cancellation.
//! - [`IntervalProducer`]: paces a single source by computing a delay from
//!   each delivered value (or a seed, before the first) and deferring the
//!   next single-item upstream pull until the delay elapses on an external
//!   [`Scheduler`].
//!
//! ## Concurrency model
//!
//! Two strategies serialize relay state, chosen per combinator:
//!
//! 1. **Lock-protected** ([`Concatenate`], [`Repeat`]): one mutex guards
//!    the demand ledger and the upstream handle; critical sections only
//!    read-or-update state and capture handle snapshots, and every call
//!    into an upstream or downstream handle happens outside the lock. The
//!    relay is safe to drive from downstream and upstream threads
//!    simultaneously.
//! 2. **Scheduler-confined** ([`IntervalProducer`]): every mutating entry
//!    point is submitted to the scheduler's single FIFO execution context,
//!    which serializes them by construction, trading lock contention for
//!    scheduler-queue latency.
//!
//! Nothing here blocks a thread to wait: timers are expressed as scheduled
//! callbacks.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use streamrelay_rs::prelude::*;
//!
//! let first = SequenceProducer::<i32>::new(vec![1, 2]);
//! let second = SequenceProducer::<i32>::new(vec![3]);
//! let concatenated = Concatenate::new(vec![first, second]);
//!
//! let probe = Arc::new(ProbeConsumer::<i32>::new(Demand::Unbounded));
//! concatenated.subscribe(probe.clone());
//!
//! assert_eq!(probe.values(), vec![1, 2, 3]);
//! assert_eq!(probe.completion(), Some(Completion::Finished));
//! ```
//!
//! ## Error handling
//!
//! There is exactly one failure channel: an upstream failure carried by
//! [`Completion::Failed`], forwarded verbatim and immediately to the
//! downstream consumer. Failures are never retried or suppressed.
//! Programmer contract violations such as requesting zero demand or
//! delivering a second subscription to a live relay are fatal assertions, not
//! recoverable errors.

pub mod stream;

pub mod prelude;

pub use stream::concat::Concatenate;
pub use stream::demand::{Demand, DemandLedger};
pub use stream::error::RelayError;
pub use stream::interval::IntervalProducer;
pub use stream::protocol::{
    Completion, Consumer, DynConsumer, DynSubscription, Producer, Subscription,
};
pub use stream::repeat::Repeat;
pub use stream::scheduler::{Scheduler, Task, TokioScheduler, VirtualScheduler};
