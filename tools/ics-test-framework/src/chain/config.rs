/*!
    Helper functions for modifying the chain node config in TOML and the
    genesis file in JSON.

    Since we do not need to understand the full structure of the
    CosmosSDK config, we are updating the config as dynamic TOML
    values instead of serializing them into proper types.
*/

use core::time::Duration;
use eyre::eyre;
use serde_json::json;

use crate::chain::driver::ChainDriver;
use crate::error::{handle_generic_error, Error};
use crate::types::token::Token;
use crate::util::json::set_field;

pub const CONFIG_TOML_PATH: &str = "config/config.toml";
pub const GENESIS_PATH: &str = "config/genesis.json";
pub const PRIV_VALIDATOR_KEY_PATH: &str = "config/priv_validator_key.json";

/**
   Modify the genesis file of one node, which is saved in JSON format.
*/
pub fn update_genesis_file(
    driver: &dyn ChainDriver,
    node: usize,
    cont: impl FnOnce(&mut serde_json::Value) -> Result<(), Error>,
) -> Result<(), Error> {
    let mut genesis = driver.read_json(node, GENESIS_PATH)?;
    cont(&mut genesis)?;
    driver.write_json(node, GENESIS_PATH, &genesis)
}

/**
   Modify the full node config of one node, which is saved in TOML format.
*/
pub fn update_node_config(
    driver: &dyn ChainDriver,
    node: usize,
    cont: impl FnOnce(&mut toml::Value) -> Result<(), Error>,
) -> Result<(), Error> {
    let content = driver.read_file(node, CONFIG_TOML_PATH)?;
    let content = String::from_utf8(content).map_err(handle_generic_error)?;

    let mut config: toml::Value = toml::from_str(&content).map_err(handle_generic_error)?;
    cont(&mut config)?;

    let content = toml::to_string_pretty(&config).map_err(handle_generic_error)?;
    driver.write_file(node, CONFIG_TOML_PATH, content.as_bytes())
}

/// Set the `consensus.timeout_commit` field in the full node config.
pub fn set_timeout_commit(config: &mut toml::Value, duration: Duration) -> Result<(), Error> {
    config
        .get_mut("consensus")
        .ok_or_else(|| eyre!("expect consensus section"))?
        .as_table_mut()
        .ok_or_else(|| eyre!("expect object"))?
        .insert(
            "timeout_commit".to_string(),
            format!("{}ms", duration.as_millis()).into(),
        );

    Ok(())
}

/// Read back the `consensus.timeout_commit` field of the full node config.
pub fn get_timeout_commit(config: &toml::Value) -> Result<Duration, Error> {
    let raw = config
        .get("consensus")
        .and_then(|consensus| consensus.get("timeout_commit"))
        .and_then(|timeout| timeout.as_str())
        .ok_or_else(|| eyre!("expect consensus.timeout_commit string"))?;

    Ok(humantime::parse_duration(raw).map_err(|e| eyre!("invalid timeout_commit: {}", e))?)
}

pub fn set_voting_period(genesis: &mut serde_json::Value, period: Duration) -> Result<(), Error> {
    set_field(
        genesis,
        "/app_state/gov/params/voting_period",
        json!(humantime::format_duration(period).to_string()),
    )
}

pub fn set_max_deposit_period(
    genesis: &mut serde_json::Value,
    period: Duration,
) -> Result<(), Error> {
    set_field(
        genesis,
        "/app_state/gov/params/max_deposit_period",
        json!(humantime::format_duration(period).to_string()),
    )
}

pub fn set_min_deposit(genesis: &mut serde_json::Value, deposit: &Token) -> Result<(), Error> {
    set_field(
        genesis,
        "/app_state/gov/params/min_deposit",
        json!([{ "denom": deposit.denom, "amount": deposit.amount.to_string() }]),
    )
}

/**
   Configure the slashing module so that a validator missing
   `window_blocks` consecutive blocks is jailed.
*/
pub fn set_downtime_window(genesis: &mut serde_json::Value, window_blocks: u64) -> Result<(), Error> {
    set_field(
        genesis,
        "/app_state/slashing/params/signed_blocks_window",
        json!(window_blocks.to_string()),
    )?;

    set_field(
        genesis,
        "/app_state/slashing/params/min_signed_per_window",
        json!("0.050000000000000000"),
    )?;

    set_field(
        genesis,
        "/app_state/slashing/params/downtime_jail_duration",
        json!("60s"),
    )
}

pub fn set_bond_denom(genesis: &mut serde_json::Value, denom: &str) -> Result<(), Error> {
    set_field(genesis, "/app_state/staking/params/bond_denom", json!(denom))
}

/**
   Install the consumer genesis exported by the provider into the
   consumer chain's own genesis file.
*/
pub fn set_ccv_consumer_genesis(
    genesis: &mut serde_json::Value,
    consumer_genesis: serde_json::Value,
) -> Result<(), Error> {
    set_field(genesis, "/app_state/ccvconsumer", consumer_genesis)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::util::json::get_str;

    #[test]
    fn timeout_commit_round_trip() {
        let mut config: toml::Value = toml::from_str(
            r#"
                [consensus]
                timeout_commit = "5s"
            "#,
        )
        .unwrap();

        set_timeout_commit(&mut config, Duration::from_secs(4)).unwrap();

        assert_eq!(get_timeout_commit(&config).unwrap(), Duration::from_secs(4));
    }

    #[test]
    fn patch_gov_params() {
        let mut genesis = json!({ "app_state": {} });

        set_voting_period(&mut genesis, Duration::from_secs(20)).unwrap();
        set_min_deposit(&mut genesis, &Token::new(10_000_000, "stake")).unwrap();

        assert_eq!(
            get_str(&genesis, "/app_state/gov/params/voting_period").unwrap(),
            "20s"
        );
        assert_eq!(
            get_str(&genesis, "/app_state/gov/params/min_deposit/0/amount").unwrap(),
            "10000000"
        );
    }
}
