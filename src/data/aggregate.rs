//! Merge operators for sync buffers.
//!
//! A merge folds an `incoming` value into `current` and reports whether the
//! stored value changed. Operators must be monotone and idempotent, and the
//! final value must not depend on the order incoming values arrive in.

use std::fmt::Debug;

/// Folds incoming values into a stored value.
pub trait Aggregator<T>: Send + Sync + 'static {
    /// Apply `incoming` to `current`; `true` iff `current` changed.
    fn merge(&self, current: &mut T, incoming: T) -> bool;
}

impl<T, F> Aggregator<T> for F
where
    F: Fn(&mut T, T) -> bool + Send + Sync + 'static,
{
    #[inline]
    fn merge(&self, current: &mut T, incoming: T) -> bool {
        self(current, incoming)
    }
}

/// Keep the smaller value.
#[derive(Copy, Clone, Debug, Default)]
pub struct MinAggregator;

impl<T: PartialOrd + Send + Sync + 'static> Aggregator<T> for MinAggregator {
    #[inline]
    fn merge(&self, current: &mut T, incoming: T) -> bool {
        if incoming < *current {
            *current = incoming;
            true
        } else {
            false
        }
    }
}

/// Keep the larger value.
#[derive(Copy, Clone, Debug, Default)]
pub struct MaxAggregator;

impl<T: PartialOrd + Send + Sync + 'static> Aggregator<T> for MaxAggregator {
    #[inline]
    fn merge(&self, current: &mut T, incoming: T) -> bool {
        if incoming > *current {
            *current = incoming;
            true
        } else {
            false
        }
    }
}

/// Last writer wins; reports a change only when the value differs.
///
/// Not order independent: use only when every writer agrees on the value.
#[derive(Copy, Clone, Debug, Default)]
pub struct OverwriteAggregator;

impl<T: PartialEq + Send + Sync + 'static> Aggregator<T> for OverwriteAggregator {
    #[inline]
    fn merge(&self, current: &mut T, incoming: T) -> bool {
        if *current != incoming {
            *current = incoming;
            true
        } else {
            false
        }
    }
}
