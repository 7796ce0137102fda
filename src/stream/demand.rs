//! Demand accounting for the pull-based backpressure protocol.
//!
//! A [`Demand`] is the number of values a consumer has authorized a producer
//! to send, tracked as a saturating counter with an unbounded sentinel. The
//! [`DemandLedger`] wraps a `Demand` with the three mutations every relay
//! needs: fold in a new grant, consume one unit per delivered value, and
//! zero out on a terminal transition.

use std::ops::{Add, AddAssign};

/// A saturating, non-negative quantity of authorized deliveries.
///
/// Adding two demands saturates at [`Demand::Unbounded`]; an unbounded
/// demand absorbs every further addition and never decrements. The unsigned
/// representation makes a negative demand unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// Finite demand with a remaining count.
    Finite(u64),
    /// Unbounded demand: the consumer accepts everything the producer has.
    Unbounded,
}

impl Demand {
    /// Zero demand.
    pub const NONE: Demand = Demand::Finite(0);

    /// Demand for exactly one value.
    pub const ONE: Demand = Demand::Finite(1);

    /// Creates a finite demand of `count` values.
    #[must_use]
    pub const fn finite(count: u64) -> Self {
        Self::Finite(count)
    }

    /// Returns `true` if the demand is unbounded.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// Returns `true` if at least one more value is authorized.
    #[must_use]
    pub const fn has_demand(&self) -> bool {
        matches!(self, Self::Unbounded) || matches!(self, Self::Finite(remaining) if *remaining > 0)
    }

    /// Returns the remaining finite count, or `None` when unbounded.
    #[must_use]
    pub const fn remaining(&self) -> Option<u64> {
        match self {
            Self::Finite(value) => Some(*value),
            Self::Unbounded => None,
        }
    }

    /// Adds two demands, saturating at [`Demand::Unbounded`] on overflow.
    #[must_use]
    pub const fn saturating_add(self, other: Demand) -> Demand {
        match (self, other) {
            (Self::Unbounded, _) | (_, Self::Unbounded) => Self::Unbounded,
            (Self::Finite(lhs), Self::Finite(rhs)) => match lhs.checked_add(rhs) {
                Some(total) => Self::Finite(total),
                None => Self::Unbounded,
            },
        }
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = self.saturating_add(rhs);
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::NONE
    }
}

/// Tracks the outstanding downstream demand of a single relay.
///
/// The ledger value reflects exactly: the sum of all downstream grants
/// received so far, minus one unit per value already delivered downstream,
/// floored at zero by construction and zeroed on terminal transitions.
#[derive(Debug, Clone)]
pub struct DemandLedger {
    current: Demand,
}

impl DemandLedger {
    /// Creates a ledger with zero demand.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Demand::NONE,
        }
    }

    /// Returns the current outstanding demand.
    #[must_use]
    pub const fn current(&self) -> Demand {
        self.current
    }

    /// Folds an additional grant into the ledger, saturating at unbounded.
    pub const fn add(&mut self, amount: Demand) {
        self.current = self.current.saturating_add(amount);
    }

    /// Consumes one unit of demand for a delivered value.
    ///
    /// Returns `true` when a unit was available. Unbounded demand never
    /// decrements; consuming from an empty ledger is a no-op returning
    /// `false`.
    pub const fn take(&mut self) -> bool {
        match self.current {
            Demand::Unbounded => true,
            Demand::Finite(remaining) if remaining > 0 => {
                self.current = Demand::Finite(remaining - 1);
                true
            }
            Demand::Finite(_) => false,
        }
    }

    /// Zeroes the ledger on a terminal transition (completion, failure,
    /// cancellation).
    pub const fn reset(&mut self) {
        self.current = Demand::NONE;
    }
}

impl Default for DemandLedger {
    fn default() -> Self {
        Self::new()
    }
}
