/*!
   Assertions that fail the test with an [`Error`] instead of panicking, so
   that teardown and `HANG_ON_FAIL` still run.
*/

use core::fmt::Debug;

use crate::error::Error;

/// Check that the observed value equals the expected one.
pub fn assert_eq<T: Eq + Debug>(message: &str, observed: &T, expected: &T) -> Result<(), Error> {
    if observed == expected {
        return Ok(());
    }

    Err(Error::assertion(format!(
        "{}: expected {:?}, observed {:?}",
        message, expected, observed
    )))
}

pub fn assert_not_eq<T: Eq + Debug>(message: &str, observed: &T, unexpected: &T) -> Result<(), Error> {
    if observed != unexpected {
        return Ok(());
    }

    Err(Error::assertion(format!(
        "{}: observed {:?}, which should differ",
        message, observed
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_reports_both_values() {
        let err = assert_eq("validator count", &3, &4).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("expected 4"));
        assert!(message.contains("observed 3"));
    }

    #[test]
    fn not_eq_accepts_distinct_values() {
        assert!(assert_not_eq("consensus key", &"a", &"b").is_ok());
        assert!(assert_not_eq("consensus key", &"a", &"a").is_err());
    }
}
