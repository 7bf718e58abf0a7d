//! Rate limiting logic and state management.

mod limiter;
mod presets;
mod queue;

pub use limiter::{Permit, SlidingWindowLimiter};
pub use presets::{
    LimiterConfig, PresetKey, PresetRegistry, API_ACTION_NAMESPACE, SEND_MESSAGE_GROUP,
    SEND_MESSAGE_USER,
};
pub use queue::TimestampQueue;
