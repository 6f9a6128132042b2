/*!
   Utilities for suspending the test.
*/

use core::time::Duration;
use std::panic::{self, AssertUnwindSafe};
use std::thread::sleep;
use tracing::{error, warn};

use crate::error::Error;

/**
   Call this function in the middle of a test code of interest,
   so that we can suspend the test and still interact with the
   spawned chains for debugging.
*/
pub fn suspend<R>() -> R {
    warn!("suspending the test indefinitely. you can still interact with any spawned chains and relayers");

    loop {
        sleep(Duration::from_secs(999_999_999))
    }
}

/**
   Suspends the test using [`suspend`] if `hang_on_fail` is `true` and if
   the continuation returns an error or panics.

   This is activated by setting the `HANG_ON_FAIL` environment variable
   to `1`, so that a failed test can be debugged by inspecting the
   chains it left behind.
*/
pub fn hang_on_error<R>(
    hang_on_fail: bool,
    cont: impl FnOnce() -> Result<R, Error>,
) -> Result<R, Error> {
    let result = panic::catch_unwind(AssertUnwindSafe(cont));

    match result {
        Err(e) => {
            if hang_on_fail {
                error!("test panicked with HANG_ON_FAIL=1, suspending the test to allow debugging");
                suspend()
            } else {
                error!("test panicked. set HANG_ON_FAIL=1 to suspend the test on failure for debugging.");
                panic::resume_unwind(e)
            }
        }
        Ok(Err(e)) => {
            if hang_on_fail {
                error!("test failure occured with HANG_ON_FAIL=1, suspending the test to allow debugging: {:?}", e);
                suspend()
            } else {
                error!("test failure occured. set HANG_ON_FAIL=1 to suspend the test on failure for debugging: {:?}", e);
                Err(e)
            }
        }
        Ok(Ok(res)) => Ok(res),
    }
}
