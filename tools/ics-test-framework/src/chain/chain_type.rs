/*!
   The chain families known to the framework.

   Everything that differs between chain families is kept in one static
   table of [`ChainFamilySpec`] entries, so the rest of the framework
   never branches on the chain name.
*/

use core::fmt::{self, Display};
use core::str::FromStr;
use core::time::Duration;
use serde_json::{json, Value};

use crate::chain::config;
use crate::error::Error;
use crate::types::config::TestConfig;
use crate::types::token::Token;
use crate::util::json::set_field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Provider,
    Consumer,
    Neutron,
    Stride,
}

/**
   Chain parameters applied to every genesis file before the chain starts,
   derived from the [`TestConfig`].
*/
#[derive(Debug, Clone)]
pub struct GenesisParams {
    pub voting_period: Duration,
    pub max_deposit_period: Duration,
    pub min_deposit: Token,
    pub downtime_window_blocks: u64,
}

impl GenesisParams {
    pub fn from_config(config: &TestConfig, denom: &str) -> Self {
        Self {
            voting_period: config.voting_period,
            max_deposit_period: config.max_deposit_period,
            min_deposit: Token::new(MIN_DEPOSIT_AMOUNT, denom),
            downtime_window_blocks: config.downtime_window_blocks,
        }
    }
}

/// Minimum deposit required for a proposal to enter its voting period.
pub const MIN_DEPOSIT_AMOUNT: u128 = 10_000_000;

pub type GenesisPatch = fn(&mut Value, &GenesisParams) -> Result<(), Error>;

pub struct ChainFamilySpec {
    pub family: ChainFamily,
    pub name: &'static str,

    /// Default binary name, used when the test config does not override it.
    pub command: &'static str,

    pub account_prefix: &'static str,
    pub default_denom: &'static str,
    pub is_provider: bool,
    pub patch_genesis: GenesisPatch,
}

static CHAIN_FAMILIES: [ChainFamilySpec; 4] = [
    ChainFamilySpec {
        family: ChainFamily::Provider,
        name: "provider",
        command: "interchain-security-pd",
        account_prefix: "cosmos",
        default_denom: "stake",
        is_provider: true,
        patch_genesis: patch_provider_genesis,
    },
    ChainFamilySpec {
        family: ChainFamily::Consumer,
        name: "consumer",
        command: "interchain-security-cd",
        account_prefix: "consumer",
        default_denom: "stake",
        is_provider: false,
        patch_genesis: patch_consumer_genesis,
    },
    ChainFamilySpec {
        family: ChainFamily::Neutron,
        name: "neutron",
        command: "neutrond",
        account_prefix: "neutron",
        default_denom: "untrn",
        is_provider: false,
        patch_genesis: patch_neutron_genesis,
    },
    ChainFamilySpec {
        family: ChainFamily::Stride,
        name: "stride",
        command: "strided",
        account_prefix: "stride",
        default_denom: "ustrd",
        is_provider: false,
        patch_genesis: patch_stride_genesis,
    },
];

impl ChainFamily {
    pub fn spec(self) -> &'static ChainFamilySpec {
        // The table is ordered like the enum variants.
        &CHAIN_FAMILIES[self as usize]
    }

    pub fn all() -> impl Iterator<Item = ChainFamily> {
        CHAIN_FAMILIES.iter().map(|spec| spec.family)
    }

    /**
       The binary to run for this family. The provider and generic consumer
       binaries can be overridden in the test config.
    */
    pub fn command(self, config: &TestConfig) -> String {
        match self {
            Self::Provider => config.provider_command.clone(),
            Self::Consumer => config.consumer_command.clone(),
            _ => self.spec().command.to_string(),
        }
    }

    pub fn patch_genesis(self, genesis: &mut Value, params: &GenesisParams) -> Result<(), Error> {
        (self.spec().patch_genesis)(genesis, params)
    }
}

impl Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec().name)
    }
}

/**
   Resolve a family from a chain name, chain id or binary name, e.g.
   `neutron-2` or `interchain-security-pd`.
*/
impl FromStr for ChainFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();

        match name.as_str() {
            name if name.contains("neutron") => Ok(Self::Neutron),
            name if name.contains("stride") => Ok(Self::Stride),
            name if name.contains("provider") || name.ends_with("-pd") => Ok(Self::Provider),
            name if name.contains("consumer") || name.ends_with("-cd") => Ok(Self::Consumer),
            _ => Err(Error::unknown_chain_family(s.to_string())),
        }
    }
}

fn patch_provider_genesis(genesis: &mut Value, params: &GenesisParams) -> Result<(), Error> {
    config::set_voting_period(genesis, params.voting_period)?;
    config::set_max_deposit_period(genesis, params.max_deposit_period)?;
    config::set_min_deposit(genesis, &params.min_deposit)?;
    config::set_bond_denom(genesis, &params.min_deposit.denom)?;
    config::set_downtime_window(genesis, params.downtime_window_blocks)?;

    Ok(())
}

fn patch_consumer_genesis(genesis: &mut Value, params: &GenesisParams) -> Result<(), Error> {
    // Not every consumer runs the gov module.
    if genesis.pointer("/app_state/gov").is_some() {
        config::set_voting_period(genesis, params.voting_period)?;
        config::set_max_deposit_period(genesis, params.max_deposit_period)?;
    }

    config::set_downtime_window(genesis, params.downtime_window_blocks)?;

    Ok(())
}

fn patch_neutron_genesis(genesis: &mut Value, params: &GenesisParams) -> Result<(), Error> {
    patch_consumer_genesis(genesis, params)?;

    set_field(
        genesis,
        "/app_state/ccvconsumer/params/reward_denoms",
        json!(["untrn"]),
    )?;
    set_field(
        genesis,
        "/app_state/ccvconsumer/params/provider_reward_denoms",
        json!([params.min_deposit.denom]),
    )
}

fn patch_stride_genesis(genesis: &mut Value, params: &GenesisParams) -> Result<(), Error> {
    patch_consumer_genesis(genesis, params)?;

    set_field(
        genesis,
        "/app_state/ccvconsumer/params/soft_opt_out_threshold",
        json!("0.05"),
    )?;
    set_field(
        genesis,
        "/app_state/stakeibc/params/default_min_redemption_rate_threshold",
        json!("90"),
    )
}
