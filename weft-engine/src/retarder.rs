//! Delayed-retry scheduler
//!
//! A ring buffer of one-second buckets. [`Retarder::add`] drops a payload into
//! the bucket `delay` seconds ahead of the cursor; every tick swaps the bucket
//! under the cursor out for an empty one, advances the cursor and hands each
//! payload to the callback outside the lock.
//!
//! A payload added with delay `d` fires on the `d + 1`th tick after `add`, so
//! it never fires before `d` seconds have passed and at most one second
//! after. The ring keeps one bucket more than the maximum delay so a
//! full-length delay never lands under the cursor. Nothing is persisted:
//! pending payloads are lost on shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Bucket count used when a zero-length buffer is requested
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Bucket width
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetarderError {
    #[error("invalid time")]
    InvalidDelay,

    #[error("over maximum length: delay {delay}s exceeds {max} buckets")]
    OverMaximumLength { delay: u64, max: u64 },
}

/// Callback invoked once per payload when its delay elapses
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct Retarder<T> {
    max_delay: usize,
    cursor: AtomicUsize,
    buckets: Mutex<Vec<Vec<T>>>,
    call: Callback<T>,
}

impl<T: Send + 'static> Retarder<T> {
    /// Creates a retarder with `buffer_size` one-second buckets.
    ///
    /// A `buffer_size` of zero selects [`DEFAULT_BUFFER_SIZE`].
    pub fn new(buffer_size: usize, call: impl Fn(T) + Send + Sync + 'static) -> Self {
        let max_delay = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        Self {
            max_delay,
            cursor: AtomicUsize::new(0),
            buckets: Mutex::new((0..=max_delay).map(|_| Vec::new()).collect()),
            call: Arc::new(call),
        }
    }

    /// Maximum delay in seconds
    pub fn len(&self) -> usize {
        self.max_delay
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter().all(Vec::is_empty)
    }

    /// Schedules `data` to fire after `delay` seconds.
    pub fn add(&self, data: T, delay: u64) -> Result<(), RetarderError> {
        if delay > self.max_delay as u64 {
            return Err(RetarderError::OverMaximumLength {
                delay,
                max: self.max_delay as u64,
            });
        }
        if delay == 0 {
            return Err(RetarderError::InvalidDelay);
        }

        let mut buckets = self.lock();
        let slot = (self.cursor.load(Ordering::Acquire) + delay as usize) % buckets.len();
        buckets[slot].push(data);
        Ok(())
    }

    /// Runs the callback for every payload in the bucket under the cursor,
    /// then advances the clock by one bucket. Returns how many fired.
    pub fn tick(&self) -> usize {
        let due = self.advance();
        let fired = due.len();
        for data in due {
            (self.call)(data);
        }
        fired
    }

    /// Drives the clock once per [`TICK`] until `cancel` fires.
    ///
    /// Due payloads are dispatched on a spawned task so a slow callback never
    /// delays the next tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(max_delay = self.len(), "Retarder clock started");

        let mut ticker = tokio::time::interval(TICK);
        // A stalled runtime must not burst ticks and fire payloads early.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retarder clock stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let due = self.advance();
                    if due.is_empty() {
                        continue;
                    }
                    debug!(count = due.len(), "Retarder firing delayed payloads");
                    let call = Arc::clone(&self.call);
                    tokio::spawn(async move {
                        for data in due {
                            call(data);
                        }
                    });
                }
            }
        }
    }

    /// Swaps out the bucket under the cursor and moves the cursor forward.
    fn advance(&self) -> Vec<T> {
        let mut buckets = self.lock();
        let current = self.cursor.load(Ordering::Acquire);
        let due = std::mem::take(&mut buckets[current]);
        self.cursor.store((current + 1) % buckets.len(), Ordering::Release);
        due
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<T>>> {
        // A panicking callback never holds this lock, so poisoning only
        // happens on a panic inside add/advance; the buckets stay usable.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}
