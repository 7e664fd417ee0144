//! Caller-owned cancellation and deadlines.
//!
//! A `Context` is passed to every executing operation. Clones share one
//! cancellation flag, so a caller can keep a clone, hand the other to a
//! worker thread and call `cancel` from either side.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ApiError, Cancelled};

#[derive(Debug, Default)]
struct Signal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cancellation flag plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    signal: Arc<Signal>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline, until `cancel`
    /// is called on it or one of its clones.
    pub fn background() -> Self {
        Self::default()
    }

    /// Same cancellation flag, deadline `timeout` from now. An earlier
    /// existing deadline is kept, and a timeout too large to represent adds
    /// no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Same cancellation flag, deadline at `deadline`. An earlier existing
    /// deadline is kept.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            signal: self.signal,
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every clone of it. Wakes any `sleep` or
    /// `run` in progress.
    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        *cancelled = true;
        self.signal.wake.notify_all();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` without one. Saturates at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the context is done, if it is. Explicit cancellation wins over an
    /// expired deadline.
    pub fn err(&self) -> Option<Cancelled> {
        if self.is_cancelled() {
            return Some(Cancelled::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Cancelled::DeadlineExceeded),
            _ => None,
        }
    }

    /// `Err` with the reason when the context is done.
    pub fn check(&self) -> Result<(), Cancelled> {
        match self.err() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Blocks for `duration`, returning early with an error when the context
    /// is cancelled or its deadline arrives first. A duration too large to
    /// represent sleeps until one of those happens.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let wake_at = Instant::now().checked_add(duration);
        let mut cancelled = self.lock();
        loop {
            if *cancelled {
                return Err(Cancelled::Canceled);
            }
            let now = Instant::now();
            if let Some(deadline) = self.deadline {
                if now >= deadline {
                    return Err(Cancelled::DeadlineExceeded);
                }
            }
            if wake_at.is_some_and(|wake_at| now >= wake_at) {
                return Ok(());
            }
            cancelled = self.wait(cancelled, earliest(wake_at, self.deadline), now);
        }
    }

    /// Runs `work` on a worker thread and waits for its result, the
    /// cancellation flag or the deadline, whichever comes first. When the
    /// context wins, the worker is left to finish on its own and its result
    /// is dropped.
    pub fn run<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let worker_slot = Arc::clone(&slot);
        let signal = Arc::clone(&self.signal);
        thread::Builder::new()
            .name("f3-client-request".to_string())
            .spawn(move || {
                let result = work();
                *worker_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                // Taking the signal lock orders the store before the waiter's
                // next check, so the wake-up cannot be missed.
                let _guard = signal.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
                signal.wake.notify_all();
            })
            .map_err(|e| ApiError::Transport(format!("cannot spawn request thread: {e}")))?;

        let mut cancelled = self.lock();
        loop {
            if let Some(result) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                return Ok(result);
            }
            if *cancelled {
                return Err(Cancelled::Canceled.into());
            }
            let now = Instant::now();
            if let Some(deadline) = self.deadline {
                if now >= deadline {
                    return Err(Cancelled::DeadlineExceeded.into());
                }
            }
            cancelled = self.wait(cancelled, self.deadline, now);
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.signal
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits on the signal until notified or `until` passes; without `until`
    /// only a notification wakes it.
    fn wait<'a>(
        &'a self,
        guard: MutexGuard<'a, bool>,
        until: Option<Instant>,
        now: Instant,
    ) -> MutexGuard<'a, bool> {
        match until {
            Some(until) => {
                self.signal
                    .wake
                    .wait_timeout(guard, until.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .signal
                .wake
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.lock()
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_done() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let clone = ctx.clone().with_timeout(Duration::from_secs(60));
        ctx.cancel();
        assert_eq!(clone.err(), Some(Cancelled::Canceled));
    }

    #[test]
    fn expired_deadline_is_reported() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert_eq!(ctx.err(), Some(Cancelled::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let ctx = Context::background().with_deadline(Instant::now());
        ctx.cancel();
        assert_eq!(ctx.err(), Some(Cancelled::Canceled));
    }

    #[test]
    fn earlier_deadline_is_kept() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let first = ctx.deadline().unwrap();
        let ctx = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(first));
    }

    #[test]
    fn sleep_completes_without_deadline() {
        let ctx = Context::background();
        assert!(ctx.sleep(Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let started = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10));
        assert_eq!(result, Err(Cancelled::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn huge_timeout_means_no_deadline() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());
    }

    #[test]
    fn huge_sleep_still_stops_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        assert_eq!(ctx.sleep(Duration::MAX), Err(Cancelled::DeadlineExceeded));
    }

    #[test]
    fn run_returns_worker_result() {
        let ctx = Context::background();
        assert_eq!(ctx.run(|| 41 + 1).unwrap(), 42);
    }

    #[test]
    fn run_returns_when_cancelled_mid_work() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let started = Instant::now();
        let err = ctx
            .run(|| std::thread::sleep(Duration::from_secs(10)))
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled(Cancelled::Canceled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn run_stops_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let err = ctx
            .run(|| std::thread::sleep(Duration::from_secs(10)))
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled(Cancelled::DeadlineExceeded)));
    }

    #[test]
    fn sleep_wakes_on_cancel_from_another_thread() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let started = Instant::now();
        assert_eq!(ctx.sleep(Duration::from_secs(10)), Err(Cancelled::Canceled));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
