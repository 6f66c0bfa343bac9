//! Deduplicating, rate-limited work queue of object keys
//!
//! Keys are `namespace/name` strings. The queue guarantees that a key is
//! handed to at most one worker at a time: re-adding a key while it is being
//! processed marks it dirty, and [`WorkQueue::done`] puts it back so it is
//! delivered again once the current processing finishes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

use crate::metrics;

/// Default delay after the first failure of a key
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound for the per-key retry delay
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Per-key exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RateLimit {
    /// Delay before the retry following `failures` earlier failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Default)]
struct State {
    /// Keys ready to be handed out, in order
    queue: VecDeque<String>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Consecutive failures per key
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    rate_limit: RateLimit,
}

/// Cloneable handle to a shared work queue
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Create a queue with the default rate limit
    pub fn new() -> Self {
        Self::with_rate_limit(RateLimit::default())
    }

    /// Create a queue with a custom rate limit
    pub fn with_rate_limit(rate_limit: RateLimit) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                rate_limit,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a key as needing processing
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }

        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(key = %key, "Key is being processed, deferring");
            return;
        }

        state.queue.push_back(key);
        metrics::QUEUE_DEPTH.set(state.queue.len() as f64);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Add a key once `delay` has elapsed
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.is_shutting_down() {
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add a key after its backoff delay, counting one more failure
    pub fn add_rate_limited(&self, key: impl Into<String>) {
        let key = key.into();
        let delay = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.inner.rate_limit.delay_for(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
    }

    /// Reset the failure count of a key
    pub fn forget(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    /// Number of failures recorded for a key since it was last forgotten
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key to process.
    ///
    /// Returns `None` once the queue has been shut down. Every key returned
    /// must be handed back through [`WorkQueue::done`].
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    metrics::QUEUE_DEPTH.set(state.queue.len() as f64);
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release a key obtained from [`WorkQueue::get`]
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.to_string());
            metrics::QUEUE_DEPTH.set(state.queue.len() as f64);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Number of keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no keys are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and ignore further adds
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Whether [`WorkQueue::shut_down`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    #[test]
    fn duplicate_adds_are_collapsed() {
        let queue = WorkQueue::new();
        queue.add("ns/a");
        queue.add("ns/a");
        queue.add("ns/b");

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn keys_are_delivered_in_order() {
        let queue = WorkQueue::new();
        queue.add("ns/a");
        queue.add("ns/b");

        let mut first = task::spawn(queue.get());
        assert_ready_eq!(first.poll(), Some("ns/a".to_string()));
        let mut second = task::spawn(queue.get());
        assert_ready_eq!(second.poll(), Some("ns/b".to_string()));
    }

    #[test]
    fn key_readded_while_processing_waits_for_done() {
        let queue = WorkQueue::new();
        queue.add("ns/a");

        let mut first = task::spawn(queue.get());
        assert_ready_eq!(first.poll(), Some("ns/a".to_string()));

        // Re-added while held: must not be handed to a second worker yet.
        queue.add("ns/a");
        assert_eq!(queue.len(), 0);
        let mut second = task::spawn(queue.get());
        assert_pending!(second.poll());

        queue.done("ns/a");
        assert!(second.is_woken());
        assert_ready_eq!(second.poll(), Some("ns/a".to_string()));
    }

    #[test]
    fn done_without_readd_does_not_redeliver() {
        let queue = WorkQueue::new();
        queue.add("ns/a");

        let mut first = task::spawn(queue.get());
        assert_ready_eq!(first.poll(), Some("ns/a".to_string()));
        queue.done("ns/a");

        assert!(queue.is_empty());
    }

    #[test]
    fn shut_down_releases_waiters_and_ignores_adds() {
        let queue = WorkQueue::new();
        let mut waiter = task::spawn(queue.get());
        assert_pending!(waiter.poll());

        queue.shut_down();
        assert!(waiter.is_woken());
        assert_ready_eq!(waiter.poll(), None);

        queue.add("ns/a");
        assert!(queue.is_empty());
        assert!(queue.is_shutting_down());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let limit = RateLimit {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(100),
        };

        assert_eq!(limit.delay_for(0), Duration::from_millis(5));
        assert_eq!(limit.delay_for(1), Duration::from_millis(10));
        assert_eq!(limit.delay_for(3), Duration::from_millis(40));
        assert_eq!(limit.delay_for(5), Duration::from_millis(100));
        assert_eq!(limit.delay_for(64), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn rate_limited_keys_are_redelivered_and_counted() {
        let queue = WorkQueue::with_rate_limit(RateLimit {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        });

        queue.add_rate_limited("ns/a");
        queue.add_rate_limited("ns/a");
        assert_eq!(queue.num_requeues("ns/a"), 2);

        let key = tokio::time::timeout(Duration::from_secs(5), queue.get())
            .await
            .expect("rate limited key was not redelivered");
        assert_eq!(key.as_deref(), Some("ns/a"));

        queue.forget("ns/a");
        assert_eq!(queue.num_requeues("ns/a"), 0);
    }
}
