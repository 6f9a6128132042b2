/*!
   Bounded polling for eventual consistency.

   Each chain advances at its own pace, so almost every "did X happen"
   check is a loop that reads the current state, compares it, and sleeps
   for one interval, until a [`Deadline`] fires.
*/

use core::time::Duration;
use tracing::trace;

use crate::error::Error;
use crate::util::clock::Deadline;

/**
   The outcome of a polling loop that did not fail.

   A failing inner call is not an outcome: it is returned as an error
   immediately, without retrying.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<R> {
    Ready(R),
    DeadlineExceeded,
}

impl<R> PollOutcome<R> {
    /// Convert a timeout into [`Error::deadline_exceeded`].
    pub fn into_result(self, task_name: &str, deadline: &Deadline) -> Result<R, Error> {
        match self {
            Self::Ready(res) => Ok(res),
            Self::DeadlineExceeded => Err(Error::deadline_exceeded(
                task_name.to_string(),
                deadline.timeout(),
            )),
        }
    }
}

/**
   Repeatedly run `task` every `interval` until it returns `Some`, or
   until the deadline expires.

   The condition is checked once before the first sleep, so a condition
   that already holds returns without waiting.
*/
pub fn poll_until<R>(
    task_name: &str,
    deadline: &Deadline,
    interval: Duration,
    mut task: impl FnMut() -> Result<Option<R>, Error>,
) -> Result<PollOutcome<R>, Error> {
    loop {
        if deadline.is_cancelled() {
            return Err(Error::cancelled(task_name.to_string()));
        }

        if let Some(res) = task()? {
            return Ok(PollOutcome::Ready(res));
        }

        if deadline.is_expired() {
            trace!("deadline expired while polling for {}", task_name);
            return Ok(PollOutcome::DeadlineExceeded);
        }

        trace!("condition not yet reached for {}, polling again", task_name);

        deadline
            .clock()
            .sleep(interval.min(deadline.remaining().max(Duration::from_millis(1))));
    }
}

/**
   Like [`poll_until`], but treats an expired deadline as an error.
*/
pub fn assert_eventually<R>(
    task_name: &str,
    deadline: &Deadline,
    interval: Duration,
    task: impl FnMut() -> Result<Option<R>, Error>,
) -> Result<R, Error> {
    poll_until(task_name, deadline, interval, task)?.into_result(task_name, deadline)
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::sync::Arc;
    use eyre::eyre;

    use crate::util::clock::{Clock, MockClock};

    fn mock_deadline(timeout: Duration) -> (Arc<dyn Clock>, Deadline) {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
        let deadline = Deadline::after(&clock, timeout);
        (clock, deadline)
    }

    #[test]
    fn returns_ready_once_condition_holds() {
        let (_clock, deadline) = mock_deadline(Duration::from_secs(60));
        let mut attempts = 0;

        let outcome = poll_until("three attempts", &deadline, Duration::from_secs(1), || {
            attempts += 1;
            Ok((attempts == 3).then_some(attempts))
        })
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready(3));
    }

    #[test]
    fn times_out_without_error() {
        let (clock, deadline) = mock_deadline(Duration::from_secs(10));
        let start = clock.now();

        let outcome = poll_until("never", &deadline, Duration::from_secs(3), || {
            Ok(None::<()>)
        })
        .unwrap();

        assert_eq!(outcome, PollOutcome::DeadlineExceeded);
        assert!(clock.now() >= start + Duration::from_secs(10));
    }

    #[test]
    fn inner_error_is_not_retried() {
        let (_clock, deadline) = mock_deadline(Duration::from_secs(10));
        let mut attempts = 0;

        let res = poll_until("failing", &deadline, Duration::from_secs(1), || {
            attempts += 1;
            Err::<Option<()>, _>(Error::generic(eyre!("query failed")))
        });

        assert!(res.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn cancellation_is_distinct_from_timeout() {
        let (_clock, deadline) = mock_deadline(Duration::from_secs(10));
        deadline.cancel();

        let res = poll_until("cancelled", &deadline, Duration::from_secs(1), || {
            Ok(None::<()>)
        });

        match res {
            Err(e) => assert!(e.to_string().contains("cancelled")),
            Ok(outcome) => panic!("expected cancellation, got {outcome:?}"),
        }
    }
}
