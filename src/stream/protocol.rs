//! The generic stream protocol: the three capabilities every combinator in
//! this crate consumes and exposes.
//!
//! A [`Producer`] accepts a [`Consumer`] and begins the protocol by
//! eventually handing it a [`Subscription`]. The consumer pulls values by
//! granting demand through that subscription; the producer must never emit
//! more values than granted. Terminal signals travel as a [`Completion`].
//!
//! All capabilities are object-safe and cross module seams as shared
//! handles ([`DynConsumer`], [`DynSubscription`]), mirroring how listener
//! callbacks are shared elsewhere in the ecosystem.

use std::sync::Arc;

use super::demand::Demand;

/// Terminal status of a stream: either normal exhaustion or an upstream
/// failure carrying an opaque error value.
///
/// Failures are never retried or suppressed by this crate; they propagate
/// verbatim to the downstream consumer and terminate the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    /// The producer delivered every value it will ever deliver.
    Finished,
    /// The producer failed; no further values follow.
    Failed(E),
}

impl<E> Completion<E> {
    /// Returns `true` for [`Completion::Failed`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Handle a consumer holds on a producer, used to grant demand and to
/// cancel the stream.
pub trait Subscription: Send + Sync {
    /// Authorizes `demand` further deliveries.
    ///
    /// # Panics
    ///
    /// Requesting zero demand is a caller contract violation and asserts.
    fn request(&self, demand: Demand);

    /// Cancels the stream. Idempotent; after it returns, the consumer
    /// receives no further values, though an in-flight upstream may take
    /// effect asynchronously.
    fn cancel(&self);
}

/// A receiver of values.
///
/// `on_next` returns the *additional* demand the consumer grants inline
/// with the delivery; relays in this crate always report
/// [`Demand::NONE`] to their own upstream and push demand explicitly via
/// [`Subscription::request`] instead, decoupling the downstream pull rate
/// from the upstream pull rate.
pub trait Consumer: Send + Sync {
    /// The value type flowing into this consumer.
    type Input: Send + 'static;
    /// The opaque failure type of the upstream.
    type Failure: Send + 'static;

    /// Delivers the subscription handle. Called exactly once per
    /// subscription.
    fn on_subscribe(&self, subscription: DynSubscription);

    /// Delivers one value; returns any additional demand granted inline.
    fn on_next(&self, value: Self::Input) -> Demand;

    /// Delivers the terminal signal.
    fn on_complete(&self, completion: Completion<Self::Failure>);
}

/// A source of values.
///
/// `subscribe` accepts a consumer and begins the protocol by eventually
/// invoking the consumer's [`Consumer::on_subscribe`] with a
/// [`Subscription`] handle. The subscription handed out must be
/// self-contained: it stays valid after the `Producer` value itself is
/// dropped.
pub trait Producer {
    /// The value type this producer emits.
    type Output: Send + 'static;
    /// The opaque failure type this producer may terminate with.
    type Failure: Send + 'static;

    /// Attaches `consumer` to this producer.
    fn subscribe(&self, consumer: DynConsumer<Self::Output, Self::Failure>);
}

/// Shared consumer handle crossing a protocol seam.
pub type DynConsumer<T, E> = Arc<dyn Consumer<Input = T, Failure = E>>;

/// Shared subscription handle crossing a protocol seam.
pub type DynSubscription = Arc<dyn Subscription>;
