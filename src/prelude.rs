//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each item individually, pipeline-building code can
//! use:
//!
//! ```rust
//! use streamrelay_rs::prelude::*;
//! ```

// Protocol capabilities
pub use crate::stream::protocol::{
    Completion, Consumer, DynConsumer, DynSubscription, Producer, Subscription,
};

// Demand accounting
pub use crate::stream::demand::{Demand, DemandLedger};

// Combinators
pub use crate::stream::concat::Concatenate;
pub use crate::stream::interval::IntervalProducer;
pub use crate::stream::repeat::Repeat;

// Schedulers
pub use crate::stream::scheduler::{Scheduler, Task, TokioScheduler, VirtualScheduler};

// Errors
pub use crate::stream::error::RelayError;

// Instrumented endpoints for tests and demos
pub use crate::stream::testing::{
    CounterProducer, ManualProducer, ProbeConsumer, SequenceProducer, TestFailure,
};
