//! Keyed timer queue for Croupier.
//!
//! Every timer the connector runs (request timeouts, "still waiting"
//! nags, delayed sends, the idle watchdog) lives in one [`TimerQueue`],
//! keyed by what it is for. Arming a key replaces whatever timer that key
//! had, so there is never more than one timer of a kind per owner.
//!
//! # Integration
//!
//! The queue sits inside the connector actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* handle commands */ }
//!         key = timers.expired() => { /* handle the timer */ }
//!     }
//! }
//! ```
//!
//! [`TimerQueue::expired`] pends forever while nothing is armed and only
//! mutates the queue after it wakes, so dropping it inside `select!` is
//! safe.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{trace, warn};

/// Shortest period a repeating timer may have.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Instant,
    /// `Some` for repeating timers.
    period: Option<Duration>,
}

/// A set of keyed timers on the Tokio clock.
///
/// `K` is usually a small `Copy` enum. Ties between equal deadlines are
/// broken by key order, so firing order is deterministic.
#[derive(Debug)]
pub struct TimerQueue<K> {
    timers: BTreeMap<K, Timer>,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
        }
    }
}

impl<K: Copy + Ord + Debug> TimerQueue<K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` to fire once, `after` from now. Replaces any timer
    /// already armed under `key`.
    pub fn arm_once(&mut self, key: K, after: Duration) {
        trace!(?key, after_ms = after.as_millis() as u64, "single-shot timer armed");
        self.timers.insert(
            key,
            Timer {
                deadline: Instant::now() + after,
                period: None,
            },
        );
    }

    /// Arms `key` to fire every `period`, first at `now + period`.
    /// Replaces any timer already armed under `key`.
    pub fn arm_every(&mut self, key: K, period: Duration) {
        let period = if period < MIN_PERIOD {
            warn!(?key, "repeating timer period below minimum — clamping");
            MIN_PERIOD
        } else {
            period
        };
        trace!(?key, period_ms = period.as_millis() as u64, "repeating timer armed");
        self.timers.insert(
            key,
            Timer {
                deadline: Instant::now() + period,
                period: Some(period),
            },
        );
    }

    /// Disarms `key`. Returns `true` if it was armed.
    pub fn cancel(&mut self, key: K) -> bool {
        self.timers.remove(&key).is_some()
    }

    /// Disarms every key matching `pred`.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) {
        self.timers.retain(|key, _| !pred(key));
    }

    /// Whether `key` currently has a timer.
    pub fn is_armed(&self, key: K) -> bool {
        self.timers.contains_key(&key)
    }

    /// When `key` fires next, if armed.
    pub fn deadline(&self, key: K) -> Option<Instant> {
        self.timers.get(&key).map(|t| t.deadline)
    }

    /// The earliest armed timer.
    pub fn next_deadline(&self) -> Option<(K, Instant)> {
        self.timers
            .iter()
            .min_by_key(|(key, timer)| (timer.deadline, **key))
            .map(|(key, timer)| (*key, timer.deadline))
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Fires the earliest timer due at `now`, if any.
    ///
    /// Single-shot timers are removed. Repeating timers are rescheduled one
    /// period later; if that is still in the past the missed firings are
    /// skipped and the timer resumes from `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<K> {
        let (key, deadline) = self.next_deadline()?;
        if deadline > now {
            return None;
        }

        let timer = self.timers.remove(&key)?;
        if let Some(period) = timer.period {
            let mut next = timer.deadline + period;
            if next <= now {
                let behind = now.saturating_duration_since(timer.deadline);
                let skipped = behind.as_nanos() / period.as_nanos();
                trace!(?key, skipped = skipped as u64, "repeating timer fell behind — skipping");
                next = now + period;
            }
            self.timers.insert(
                key,
                Timer {
                    deadline: next,
                    period: Some(period),
                },
            );
        }

        trace!(?key, "timer fired");
        Some(key)
    }

    /// Waits for the next timer and returns its key.
    ///
    /// Pends forever while the queue is empty; `tokio::select!` keeps
    /// serving its other branches.
    pub async fn expired(&mut self) -> K {
        loop {
            let Some((_, deadline)) = self.next_deadline() else {
                std::future::pending::<()>().await;
                unreachable!()
            };

            time::sleep_until(deadline).await;

            if let Some(key) = self.pop_expired(Instant::now()) {
                return key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Key {
        A,
        B,
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_previous_timer() {
        let mut q = TimerQueue::new();
        q.arm_once(Key::A, Duration::from_secs(10));
        q.arm_once(Key::A, Duration::from_secs(1));
        assert_eq!(q.len(), 1);
        let deadline = q.deadline(Key::A).unwrap();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_deadlines_fire_in_key_order() {
        let mut q = TimerQueue::new();
        q.arm_once(Key::B, Duration::from_secs(1));
        q.arm_once(Key::A, Duration::from_secs(1));
        assert_eq!(q.next_deadline().map(|(k, _)| k), Some(Key::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_expired_ignores_future_timers() {
        let mut q = TimerQueue::new();
        q.arm_once(Key::A, Duration::from_secs(1));
        assert_eq!(q.pop_expired(Instant::now()), None);
        assert!(q.is_armed(Key::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_clamped() {
        let mut q = TimerQueue::new();
        q.arm_every(Key::A, Duration::ZERO);
        let deadline = q.deadline(Key::A).unwrap();
        assert_eq!(deadline - Instant::now(), MIN_PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_where_filters_keys() {
        let mut q = TimerQueue::new();
        q.arm_once(Key::A, Duration::from_secs(1));
        q.arm_every(Key::B, Duration::from_secs(1));
        q.cancel_where(|k| *k == Key::B);
        assert!(q.is_armed(Key::A));
        assert!(!q.is_armed(Key::B));
    }
}
