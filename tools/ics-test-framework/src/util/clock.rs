/*!
   Clocks and deadlines.

   Every operation that waits for a chain reads the time through a [`Clock`]
   instead of calling [`SystemTime::now`] or [`std::thread::sleep`] directly.
   Real test runs use [`SystemClock`]. Tests running against the simulated
   network use [`MockClock`], where sleeping advances a shared virtual
   timestamp instantly.
*/

use core::fmt::{self, Debug};
use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;

    fn sleep(&self, duration: Duration);

    /**
       Block until the clock reaches the given time. Returns immediately
       if the time is already in the past.
    */
    fn sleep_until(&self, time: SystemTime) {
        if let Ok(remaining) = time.duration_since(self.now()) {
            self.sleep(remaining);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/**
   A virtual clock shared by all participants of a simulated test run.

   Sleeping advances the timestamp by the requested duration and returns
   immediately. When several threads sleep concurrently the clock advances
   by the sum of their sleeps, which keeps time monotonic but lets it run
   ahead of any single participant.
*/
pub struct MockClock {
    now: Mutex<SystemTime>,
}

/// Fixed starting point of virtual time, so that simulated runs are reproducible.
pub const MOCK_CLOCK_EPOCH: Duration = Duration::from_secs(1_700_000_000);

impl MockClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(UNIX_EPOCH + MOCK_CLOCK_EPOCH)
    }
}

impl Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MockClock({:?})", self.now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        thread::yield_now();
    }
}

/**
   A point in time after which a waiting operation gives up, together with
   a cancellation flag shared by every deadline derived from it.

   Polling loops check the deadline once per iteration. A cancelled deadline
   stops the loop with [`Error::cancelled`](crate::error::Error::cancelled),
   while an expired one yields a timeout outcome that callers can tell apart
   from inner failures.
*/
#[derive(Clone)]
pub struct Deadline {
    clock: Arc<dyn Clock>,
    started: SystemTime,
    at: SystemTime,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    pub fn after(clock: &Arc<dyn Clock>, timeout: Duration) -> Self {
        let started = clock.now();

        Self {
            clock: clock.clone(),
            started,
            at: started + timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /**
       Derive a deadline that expires after `timeout`, or when this deadline
       expires, whichever comes first. Cancelling either cancels both.
    */
    pub fn child(&self, timeout: Duration) -> Self {
        let started = self.clock.now();

        Self {
            clock: self.clock.clone(),
            started,
            at: (started + timeout).min(self.at),
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn expires_at(&self) -> SystemTime {
        self.at
    }

    /// The total duration this deadline was created with.
    pub fn timeout(&self) -> Duration {
        self.at.duration_since(self.started).unwrap_or_default()
    }

    pub fn remaining(&self) -> Duration {
        self.at.duration_since(self.clock.now()).unwrap_or_default()
    }

    pub fn is_expired(&self) -> bool {
        self.clock.now() >= self.at
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /**
       Sleep until `time` in steps of at most `step`, so that a cancellation
       or the expiry of this deadline interrupts a long wait.
    */
    pub fn sleep_until(
        &self,
        task_name: &str,
        time: SystemTime,
        step: Duration,
    ) -> Result<(), Error> {
        loop {
            if self.is_cancelled() {
                return Err(Error::cancelled(task_name.to_string()));
            }

            let remaining = match time.duration_since(self.clock.now()) {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => return Ok(()),
            };

            if self.is_expired() {
                return Err(Error::deadline_exceeded(
                    task_name.to_string(),
                    self.timeout(),
                ));
            }

            self.clock.sleep(remaining.min(step).min(self.remaining()));
        }
    }
}

impl Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("timeout", &self.timeout())
            .field("remaining", &self.remaining())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
