//! Demand-driven stream combinators built on a shared subscription relay.

/// Sequential concatenation of a finite sequence of producers.
pub mod concat;
/// Demand accounting: the saturating counter and its ledger.
pub mod demand;
pub mod error;
/// Interval pacing of upstream pulls via an external scheduler.
pub mod interval;
/// The generic Producer/Consumer/Subscription protocol.
pub mod protocol;
mod relay;
/// Unbounded repetition of a single producer.
pub mod repeat;
/// Scheduler capability and the Tokio/virtual-time adapters.
pub mod scheduler;
/// Instrumented protocol endpoints for tests and demos.
pub mod testing;
mod tests;

pub use concat::Concatenate;
pub use demand::{Demand, DemandLedger};
pub use error::RelayError;
pub use interval::IntervalProducer;
pub use protocol::{Completion, Consumer, DynConsumer, DynSubscription, Producer, Subscription};
pub use repeat::Repeat;
pub use scheduler::{Scheduler, Task, TokioScheduler, VirtualScheduler};
