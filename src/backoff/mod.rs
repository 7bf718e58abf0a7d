//! Retry backoff: precomputed delay curves and composed retry delays.

mod curve;
mod delay;

pub use curve::{BackoffConfig, BackoffCurve};
pub use delay::DelayCalculator;
