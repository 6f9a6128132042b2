/*!
   Definition for the test configuration.
*/

use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{handle_generic_error, Error};

/**
   The test configuration, loaded by
   [`init_test`](crate::bootstrap::init::init_test) from an optional TOML
   file and environment variables.

   A single `TestConfig` is shared read-only by every operation of a test
   run through the [`TestContext`](crate::framework::base::TestContext).
*/
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    /**
       The directory in which the data of the current test run is stored.
       A random sub-directory is created for each run.
    */
    pub chain_store_dir: PathBuf,

    /// Binary of the provider chain. Defaults to `interchain-security-pd`.
    pub provider_command: String,

    /// Binary of generic consumer chains. Defaults to `interchain-security-cd`.
    pub consumer_command: String,

    /// Binary of the relayer. Defaults to `hermes`.
    pub relayer_command: String,

    /**
       The keyring name of each node's validator key, fixed by the genesis
       tooling. Validator identities are matched on this name.
    */
    pub validator_key_name: String,

    pub validator_count: usize,

    pub denom: String,

    /// Expected wall-clock time between two blocks.
    #[serde(with = "humantime_serde")]
    pub commit_interval: Duration,

    /// Number of consecutive missed blocks after which a validator is jailed.
    pub downtime_window_blocks: u64,

    #[serde(with = "humantime_serde")]
    pub voting_period: Duration,

    #[serde(with = "humantime_serde")]
    pub max_deposit_period: Duration,

    /// Time between submitting a consumer addition and the consumer spawn time.
    #[serde(with = "humantime_serde")]
    pub consumer_spawn_delay: Duration,

    /// Upper bound for a whole consumer onboarding.
    #[serde(with = "humantime_serde")]
    pub onboarding_timeout: Duration,

    /**
       Suspend a failed test instead of tearing it down, so that the
       chains can still be inspected.
    */
    pub hang_on_fail: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            chain_store_dir: PathBuf::from("data"),
            provider_command: "interchain-security-pd".to_string(),
            consumer_command: "interchain-security-cd".to_string(),
            relayer_command: "hermes".to_string(),
            validator_key_name: "validator".to_string(),
            validator_count: 4,
            denom: "stake".to_string(),
            commit_interval: Duration::from_secs(2),
            downtime_window_blocks: 20,
            voting_period: Duration::from_secs(20),
            max_deposit_period: Duration::from_secs(60),
            consumer_spawn_delay: Duration::from_secs(90),
            onboarding_timeout: Duration::from_secs(15 * 60),
            hang_on_fail: false,
        }
    }
}

impl TestConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(handle_generic_error)
    }

    /**
       Reject settings that would make every onboarding fail, before any
       chain is touched.
    */
    pub fn validate(&self) -> Result<(), Error> {
        if self.validator_count == 0 {
            return Err(Error::config("validator_count must be positive".to_string()));
        }

        if self.commit_interval.is_zero() {
            return Err(Error::config("commit_interval must be positive".to_string()));
        }

        if self.consumer_spawn_delay <= self.voting_period {
            return Err(Error::config(format!(
                "consumer_spawn_delay ({:?}) must exceed voting_period ({:?})",
                self.consumer_spawn_delay, self.voting_period
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_toml() {
        let config: TestConfig = toml::from_str(
            r#"
                validator_count = 6
                commit_interval = "4s"
                downtime_window_blocks = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.validator_count, 6);
        assert_eq!(config.commit_interval, Duration::from_secs(4));
        assert_eq!(config.validator_key_name, "validator");
        config.validate().unwrap();
    }

    #[test]
    fn reject_unknown_fields() {
        assert!(toml::from_str::<TestConfig>("chain_binary = \"gaiad\"").is_err());
    }

    #[test]
    fn spawn_delay_must_exceed_voting_period() {
        let config = TestConfig {
            consumer_spawn_delay: Duration::from_secs(10),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
