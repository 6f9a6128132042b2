/*!
   Configuration of a consumer chain to be onboarded onto a provider.
*/

use alloc::sync::Arc;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::chain::chain_type::ChainFamily;
use crate::chain::driver::ChainDriver;
use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::types::id::ChainId;

/**
   Parameters that decide which provider validators must validate the
   consumer chain, and with how much power.
*/
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerShaping {
    /**
       Percentage (0 to 100) of the provider's voting power whose
       validators must validate the consumer. 0 makes the chain opt-in.
    */
    #[serde(rename = "top_N")]
    pub top_n: u32,

    /// Maximum number of validators; 0 means no limit.
    pub validator_set_cap: u32,

    /// Maximum percentage of power any single validator may hold; 0 means no limit.
    pub validators_power_cap: u32,

    /// Consensus addresses allowed to validate; empty means everyone.
    pub allowlist: Vec<String>,

    /// Consensus addresses never allowed to validate.
    pub denylist: Vec<String>,
}

impl Default for PowerShaping {
    fn default() -> Self {
        Self {
            top_n: 100,
            validator_set_cap: 0,
            validators_power_cap: 0,
            allowlist: Vec::new(),
            denylist: Vec::new(),
        }
    }
}

/**
   What a hook sees when it is invoked during onboarding. The consumer
   driver refers to a chain whose nodes have not started yet.
*/
pub struct OnboardingStage<'a> {
    pub provider: &'a ChainHandle,
    pub consumer_chain_id: &'a ChainId,
    pub consumer: &'a dyn ChainDriver,
    pub proposal_id: Option<u64>,
    pub spawn_time: SystemTime,
}

pub type ConsumerHook = Arc<dyn Fn(&OnboardingStage<'_>) -> Result<(), Error> + Send + Sync>;

/**
   Callbacks invoked by the pre-genesis hook at the proposal checkpoints.
*/
#[derive(Clone, Default)]
pub struct ConsumerHooks {
    pub during_deposit_period: Option<ConsumerHook>,
    pub during_voting_period: Option<ConsumerHook>,
    pub before_spawn_time: Option<ConsumerHook>,
    pub after_spawn_time: Option<ConsumerHook>,
}

impl fmt::Debug for ConsumerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHooks")
            .field("during_deposit_period", &self.during_deposit_period.is_some())
            .field("during_voting_period", &self.during_voting_period.is_some())
            .field("before_spawn_time", &self.before_spawn_time.is_some())
            .field("after_spawn_time", &self.after_spawn_time.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub family: ChainFamily,

    /// Base name of the chain; the chain id is derived from it.
    pub name: String,

    pub version: String,

    /**
       One flag per provider validator. When set, the consumer node reuses
       the provider node's consensus key; otherwise a distinct key is
       assigned on the provider.
    */
    pub copy_provider_key: Vec<bool>,

    pub denom: String,

    pub power_shaping: PowerShaping,

    pub hooks: ConsumerHooks,
}

impl ConsumerConfig {
    pub fn new(family: ChainFamily, name: &str, version: &str, copy_provider_key: Vec<bool>) -> Self {
        Self {
            family,
            name: name.to_string(),
            version: version.to_string(),
            copy_provider_key,
            denom: family.spec().default_denom.to_string(),
            power_shaping: PowerShaping::default(),
            hooks: ConsumerHooks::default(),
        }
    }

    pub fn with_top_n(mut self, top_n: u32) -> Self {
        self.power_shaping.top_n = top_n;
        self
    }

    pub fn with_power_shaping(mut self, power_shaping: PowerShaping) -> Self {
        self.power_shaping = power_shaping;
        self
    }

    pub fn with_hooks(mut self, hooks: ConsumerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /**
       Check the configuration against the provider it will be onboarded
       onto. Runs before any chain process is touched.
    */
    pub fn validate(&self, provider_validator_count: usize) -> Result<(), Error> {
        if self.copy_provider_key.len() != provider_validator_count {
            return Err(Error::key_flags_mismatch(
                self.name.clone(),
                provider_validator_count,
                self.copy_provider_key.len(),
            ));
        }

        if self.power_shaping.top_n > 100 {
            return Err(Error::config(format!(
                "top_N of consumer {} must be between 0 and 100, got {}",
                self.name, self.power_shaping.top_n
            )));
        }

        if self.power_shaping.validators_power_cap > 100 {
            return Err(Error::config(format!(
                "validators_power_cap of consumer {} must be between 0 and 100, got {}",
                self.name, self.power_shaping.validators_power_cap
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_count_must_match_validators() {
        let config = ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", vec![true; 3]);

        assert!(config.validate(3).is_ok());
        assert!(config.validate(4).is_err());
    }

    #[test]
    fn top_n_is_a_percentage() {
        let config =
            ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", vec![false]).with_top_n(101);

        assert!(config.validate(1).is_err());
    }

    #[test]
    fn power_cap_is_a_percentage() {
        let config = ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", vec![false])
            .with_power_shaping(PowerShaping {
                validators_power_cap: 150,
                ..PowerShaping::default()
            });

        assert!(config.validate(1).is_err());
    }
}
