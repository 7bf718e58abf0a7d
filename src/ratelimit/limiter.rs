//! Core sliding-window limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::queue::TimestampQueue;

/// Throttles a class of actions to a burst limit within a rolling window.
///
/// One limiter serves blocking worker threads and async tasks at the same
/// time: a single [`tokio::sync::Mutex`] guards the timestamp queue, which
/// async callers await (suspending the task only) and worker threads block
/// on. Cloning is cheap and every clone shares the same window state.
///
/// Waiting callers are woken in best-effort FIFO order within a single
/// execution context; there is no fairness guarantee across the blocking
/// and async flavors.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    shared: Arc<LimiterShared>,
}

struct LimiterShared {
    /// Effective burst limit, already normalized.
    burst_limit: usize,
    /// Rolling window length in seconds.
    window_size_sec: f64,
    /// Disabled limiters skip all queue logic.
    disabled: bool,
    /// Anchor for monotonic timestamps.
    epoch: Instant,
    queue: Mutex<TimestampQueue>,
}

impl LimiterShared {
    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    async fn record(&self, now: f64) {
        self.queue.lock().await.record(now, self.window_size_sec);
    }

    fn record_blocking(&self, now: f64) {
        self.queue
            .blocking_lock()
            .record(now, self.window_size_sec);
    }
}

impl SlidingWindowLimiter {
    /// Create a limiter from a requested burst limit and window length.
    ///
    /// The burst limit is normalized to `max(floor(requested) - 1, 1)`, so
    /// a requested limit of 1 still yields an effective limit of 1. A
    /// window of zero or less disables the limiter entirely: every
    /// acquisition passes through instantly and nothing is recorded.
    pub fn new(burst_limit: f64, window_size_sec: f64) -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                burst_limit: normalize_burst(burst_limit),
                window_size_sec,
                disabled: window_size_sec <= 0.0,
                epoch: Instant::now(),
                queue: Mutex::new(TimestampQueue::new()),
            }),
        }
    }

    /// Acquire a permit from an async task, suspending while the window
    /// is full.
    ///
    /// The wait happens outside the critical section, so other callers
    /// can inspect the queue while this task sleeps. Cancelling the
    /// returned future during the wait leaves no trace in the queue: a
    /// timestamp is recorded only when the permit is dropped.
    pub async fn acquire(&self) -> Permit {
        if !self.shared.disabled {
            let wait = {
                let queue = self.shared.queue.lock().await;
                queue.wait_needed(self.shared.burst_limit, self.shared.window_size_sec)
            };
            match wait {
                Some(wait) => {
                    debug!(wait, "Window full, suspending until room opens");
                    tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                }
                None => trace!("Window has room, not suspending"),
            }
        }
        Permit {
            shared: self.shared.clone(),
            flavor: Flavor::Task,
        }
    }

    /// Acquire a permit from a worker thread, blocking while the window
    /// is full.
    ///
    /// The thread sleeps inside the critical section; async callers
    /// waiting for the same queue suspend rather than spin, so the
    /// scheduler is unaffected.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context; use
    /// [`acquire`](Self::acquire) there instead.
    pub fn acquire_blocking(&self) -> Permit {
        if !self.shared.disabled {
            let queue = self.shared.queue.blocking_lock();
            if let Some(wait) =
                queue.wait_needed(self.shared.burst_limit, self.shared.window_size_sec)
            {
                debug!(wait, "Window full, blocking until room opens");
                std::thread::sleep(Duration::from_secs_f64(wait));
            } else {
                trace!("Window has room, not blocking");
            }
        }
        Permit {
            shared: self.shared.clone(),
            flavor: Flavor::Blocking,
        }
    }

    /// Effective (normalized) burst limit.
    pub fn burst_limit(&self) -> usize {
        self.shared.burst_limit
    }

    /// Window length in seconds.
    pub fn window_size_sec(&self) -> f64 {
        self.shared.window_size_sec
    }

    /// Whether this limiter was disabled by a non-positive window.
    pub fn is_disabled(&self) -> bool {
        self.shared.disabled
    }

    /// Current number of recorded timestamps.
    ///
    /// This is primarily useful for testing.
    pub async fn queue_len(&self) -> usize {
        if self.shared.disabled {
            return 0;
        }
        self.shared.queue.lock().await.len()
    }

    /// Blocking counterpart of [`queue_len`](Self::queue_len).
    pub fn queue_len_blocking(&self) -> usize {
        if self.shared.disabled {
            return 0;
        }
        self.shared.queue.blocking_lock().len()
    }
}

/// A scoped acquisition of a [`SlidingWindowLimiter`].
///
/// Dropping the permit releases the scope and records the action's
/// timestamp, on every exit path, whether the guarded action succeeded or
/// failed.
#[must_use = "dropping the permit immediately records an instant, unguarded action"]
pub struct Permit {
    shared: Arc<LimiterShared>,
    flavor: Flavor,
}

enum Flavor {
    /// Acquired from an async task.
    Task,
    /// Acquired from a worker thread.
    Blocking,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.shared.disabled {
            return;
        }
        let now = self.shared.now_secs();
        trace!(now, "Releasing limiter permit");

        // The queue is uncontended unless another caller is inspecting it
        // at this very moment; record synchronously when possible.
        if let Ok(mut queue) = self.shared.queue.try_lock() {
            queue.record(now, self.shared.window_size_sec);
            return;
        }

        match self.flavor {
            Flavor::Blocking => self.shared.record_blocking(now),
            Flavor::Task => {
                if let Ok(handle) = Handle::try_current() {
                    let shared = self.shared.clone();
                    handle.spawn(async move { shared.record(now).await });
                } else {
                    self.shared.record_blocking(now);
                }
            }
        }
    }
}

fn normalize_burst(requested: f64) -> usize {
    (requested.floor() as i64 - 1).max(1) as usize
}
