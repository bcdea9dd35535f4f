//! The frame-wait primitive.
//!
//! The interrupt path broadcasts a payload-free signal; every waiter re-checks
//! its own predicate at wake time. The signal alone proves nothing: one frame
//! event may wake several waiters whose predicates differ, and a waiter whose
//! predicate does not hold re-blocks rather than reporting success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Fault, WaitError};

#[derive(Debug, Default)]
struct WaitInner {
    /// Count of broadcast signals. Waiters gate their predicate re-check on
    /// seeing this advance, so a latched-but-stale coordinate can never turn
    /// into a success without a fresh signal.
    signals: Mutex<u64>,
    cond: Condvar,
}

/// Broadcast condition shared by the interrupt handler (single writer, from
/// interrupt context) and any number of process-context waiters.
#[derive(Debug, Default)]
pub struct FrameWait {
    inner: Arc<WaitInner>,
}

/// Per-waiter cancellation handle. Cloneable so another thread can cancel a
/// wait in progress; a cancelled waiter returns [`WaitError::Interrupted`]
/// and leaves nothing registered on the condition.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    inner: Arc<WaitInner>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Take the wait lock before notifying. A waiter checks the flag under
        // this lock and then parks atomically; notifying without it can land
        // in the gap between the check and the park and be lost, leaving the
        // cancelled waiter asleep until its deadline.
        let guard = self
            .inner
            .signals
            .lock()
            .expect("frame wait lock poisoned");
        drop(guard);
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl FrameWait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt-context wake: bump the signal count and wake everyone.
    /// Bounded work only; the lock protects a single counter and is never
    /// held across a blocking operation.
    pub fn notify_frame(&self) {
        let mut signals = self
            .inner
            .signals
            .lock()
            .expect("frame wait lock poisoned");
        *signals += 1;
        drop(signals);
        self.inner.cond.notify_all();
    }

    /// Number of broadcast signals so far.
    pub fn signal_count(&self) -> u64 {
        *self
            .inner
            .signals
            .lock()
            .expect("frame wait lock poisoned")
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Blocks until a broadcast signal arrives and `predicate` then holds.
    ///
    /// The predicate runs at every wake that follows a fresh signal; returning
    /// `Ok(false)` re-blocks the waiter. Returns [`WaitError::Timeout`] when
    /// `timeout` elapses without a qualifying wake and
    /// [`WaitError::Interrupted`] when `cancel` fires.
    pub fn wait_for_frame<F>(
        &self,
        timeout: Duration,
        cancel: &CancelToken,
        mut predicate: F,
    ) -> Result<(), WaitError>
    where
        F: FnMut() -> Result<bool, Fault>,
    {
        let deadline = Instant::now() + timeout;
        let mut signals = self
            .inner
            .signals
            .lock()
            .expect("frame wait lock poisoned");
        let mut seen = *signals;

        loop {
            if cancel.is_cancelled() {
                return Err(WaitError::Interrupted);
            }
            if *signals != seen {
                seen = *signals;
                if predicate()? {
                    return Ok(());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout);
            }
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(signals, deadline - now)
                .expect("frame wait lock poisoned");
            signals = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn times_out_without_a_signal() {
        let wait = FrameWait::new();
        let token = wait.cancel_token();
        let started = Instant::now();
        let result = wait.wait_for_frame(Duration::from_millis(20), &token, || Ok(true));
        assert_eq!(result, Err(WaitError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn signal_with_holding_predicate_succeeds() {
        let wait = Arc::new(FrameWait::new());
        let token = wait.cancel_token();
        let signaller = Arc::clone(&wait);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            signaller.notify_frame();
        });
        let result = wait.wait_for_frame(Duration::from_secs(2), &token, || Ok(true));
        handle.join().unwrap();
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn failing_predicate_reblocks_until_timeout() {
        let wait = Arc::new(FrameWait::new());
        let token = wait.cancel_token();
        let signaller = Arc::clone(&wait);
        let handle = thread::spawn(move || {
            for _ in 0..3 {
                thread::sleep(Duration::from_millis(2));
                signaller.notify_frame();
            }
        });
        let mut checks = 0;
        let result = wait.wait_for_frame(Duration::from_millis(40), &token, || {
            checks += 1;
            Ok(false)
        });
        handle.join().unwrap();
        assert_eq!(result, Err(WaitError::Timeout));
        assert!(checks >= 1, "predicate must be re-checked on wake");
    }

    #[test]
    fn cancellation_interrupts_the_wait() {
        let wait = Arc::new(FrameWait::new());
        let token = wait.cancel_token();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            canceller.cancel();
        });
        let started = Instant::now();
        let result = wait.wait_for_frame(Duration::from_secs(10), &token, || Ok(true));
        handle.join().unwrap();
        assert_eq!(result, Err(WaitError::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_racing_the_park_is_never_lost() {
        // The canceller fires with no delay, so many iterations land the
        // notify inside the window between the waiter's flag check and its
        // park. Each wait must still return promptly, well inside the
        // deadline, or the notify was lost.
        for _ in 0..200 {
            let wait = Arc::new(FrameWait::new());
            let token = wait.cancel_token();
            let canceller = token.clone();
            let handle = thread::spawn(move || {
                canceller.cancel();
            });
            let started = Instant::now();
            let result = wait.wait_for_frame(Duration::from_secs(10), &token, || Ok(true));
            handle.join().unwrap();
            assert_eq!(result, Err(WaitError::Interrupted));
            assert!(
                started.elapsed() < Duration::from_secs(1),
                "cancellation took {:?}",
                started.elapsed()
            );
        }
    }

    #[test]
    fn predicate_fault_propagates() {
        let wait = Arc::new(FrameWait::new());
        let token = wait.cancel_token();
        let signaller = Arc::clone(&wait);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(2));
            signaller.notify_frame();
        });
        let result = wait.wait_for_frame(Duration::from_secs(2), &token, || {
            Err(Fault::SpuriousInterrupt)
        });
        handle.join().unwrap();
        assert_eq!(result, Err(WaitError::Fault(Fault::SpuriousInterrupt)));
    }
}
