//! Composed retry delays: pooled jitter plus a minimum-delay floor.

use std::sync::Arc;

use tracing::trace;

use super::curve::BackoffCurve;
use crate::error::Result;

/// Fraction of the floor below which the whole floor is added rather than
/// half of it.
const FLOOR_SPLIT: f64 = 0.777;

/// Computes the delay before the next retry from the previous delay and an
/// optional minimum.
///
/// Thin glue over a shared [`BackoffCurve`]; each retry policy owns its
/// calculator (and curve) rather than sharing process-wide state.
#[derive(Clone)]
pub struct DelayCalculator {
    curve: Arc<BackoffCurve>,
}

impl DelayCalculator {
    pub fn new(curve: Arc<BackoffCurve>) -> Self {
        Self { curve }
    }

    /// Compute the next retry delay.
    ///
    /// A fresh jitter value is drawn from the curve's pools. When a
    /// previous delay exists the jitter's reciprocal is added to it,
    /// growing the delay slowly; otherwise the jitter itself is the delay.
    /// A delay at or under `min_val` is then lifted above it. The result
    /// is intentionally unclamped; callers wanting a ceiling apply the
    /// curve's bounds themselves.
    pub fn next_delay(&self, previous_delay: Option<f64>, min_val: Option<f64>) -> Result<f64> {
        let jitter = self.curve.pooled_sample(None, true)?;

        let mut delay = match previous_delay {
            Some(previous) if previous != 0.0 => previous + 1.0 / jitter,
            _ => jitter,
        };

        if let Some(floor) = min_val {
            delay = apply_min_floor(delay, floor);
        }

        trace!(delay, jitter, "Computed next retry delay");
        Ok(delay)
    }
}

/// Lift a delay sitting at or under the floor above it.
fn apply_min_floor(mut delay: f64, floor: f64) -> f64 {
    if floor != 0.0 && delay <= floor {
        if delay <= floor * FLOOR_SPLIT {
            delay += floor;
        } else {
            delay += floor / 2.0;
        }
    }
    delay
}
