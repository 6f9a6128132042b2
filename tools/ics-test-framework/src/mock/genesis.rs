/*!
   Genesis files of simulated chains: the initial file written when the
   nodes are initialized, and the parameters read back when the chain
   starts.
*/

use core::time::Duration;
use serde_json::{json, Value};
use std::time::SystemTime;

use crate::chain::chain_type::{ChainFamily, MIN_DEPOSIT_AMOUNT};
use crate::chain::driver::ChainSpec;
use crate::error::{handle_generic_error, Error};
use crate::util::json::{get_field, get_str, get_u64};

/// Balance of every genesis validator account.
pub const GENESIS_BALANCE: u128 = 10_000_000_000_000;

/// Voting power of every genesis validator.
pub const VALIDATOR_POWER: u64 = 100;

const DEFAULT_GOV_PERIOD: &str = "172800s";

/**
   Whether a family runs the gov module. Consumer chains of the plain
   `consumer` and `neutron` families are governed by other means.
*/
pub fn has_gov(family: ChainFamily) -> bool {
    matches!(family, ChainFamily::Provider | ChainFamily::Stride)
}

pub fn initial_genesis(spec: &ChainSpec, accounts: &[String], genesis_time: SystemTime) -> Value {
    let balances: Vec<Value> = accounts
        .iter()
        .map(|address| {
            json!({
                "address": address,
                "coins": [{ "denom": spec.denom, "amount": GENESIS_BALANCE.to_string() }],
            })
        })
        .collect();

    let mut app_state = json!({
        "bank": { "balances": balances },
        "slashing": {
            "params": {
                "signed_blocks_window": "100",
                "min_signed_per_window": "0.500000000000000000",
                "downtime_jail_duration": "600s",
            }
        },
    });

    if spec.family.spec().is_provider {
        app_state["staking"] = json!({ "params": { "bond_denom": spec.denom } });
        app_state["provider"] = json!({ "params": {} });
    } else {
        app_state["ccvconsumer"] = json!({ "params": { "enabled": false } });
    }

    if has_gov(spec.family) {
        app_state["gov"] = json!({
            "params": {
                "min_deposit": [{ "denom": spec.denom, "amount": MIN_DEPOSIT_AMOUNT.to_string() }],
                "max_deposit_period": DEFAULT_GOV_PERIOD,
                "voting_period": DEFAULT_GOV_PERIOD,
            }
        });
    }

    json!({
        "genesis_time": humantime::format_rfc3339_seconds(genesis_time).to_string(),
        "chain_id": spec.chain_id.as_str(),
        "initial_height": "1",
        "app_state": app_state,
    })
}

/**
   The chain parameters a simulated chain reads from its genesis file
   when it starts.
*/
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub gov: Option<GovParams>,

    pub signed_blocks_window: u64,

    /// A validator missing more blocks than this within the window is jailed.
    pub max_missed_blocks: u64,
}

#[derive(Debug, Clone)]
pub struct GovParams {
    pub min_deposit: u128,
    pub deposit_denom: String,
    pub max_deposit_period: Duration,
    pub voting_period: Duration,
}

fn parse_duration(genesis: &Value, pointer: &str) -> Result<Duration, Error> {
    humantime::parse_duration(get_str(genesis, pointer)?).map_err(handle_generic_error)
}

pub fn load_params(genesis: &Value) -> Result<ChainParams, Error> {
    let gov = match genesis.pointer("/app_state/gov") {
        Some(_) => Some(GovParams {
            min_deposit: get_str(genesis, "/app_state/gov/params/min_deposit/0/amount")?
                .parse()
                .map_err(handle_generic_error)?,
            deposit_denom: get_str(genesis, "/app_state/gov/params/min_deposit/0/denom")?
                .to_string(),
            max_deposit_period: parse_duration(genesis, "/app_state/gov/params/max_deposit_period")?,
            voting_period: parse_duration(genesis, "/app_state/gov/params/voting_period")?,
        }),
        None => None,
    };

    let signed_blocks_window = get_u64(genesis, "/app_state/slashing/params/signed_blocks_window")?;

    let min_signed: f64 = get_str(genesis, "/app_state/slashing/params/min_signed_per_window")?
        .parse()
        .map_err(handle_generic_error)?;

    let min_signed_blocks = (min_signed * signed_blocks_window as f64).round() as u64;

    Ok(ChainParams {
        gov,
        signed_blocks_window,
        max_missed_blocks: signed_blocks_window.saturating_sub(min_signed_blocks),
    })
}

/// Genesis balances as `(address, amount)` pairs in the given denomination.
pub fn load_balances(genesis: &Value, denom: &str) -> Result<Vec<(String, u128)>, Error> {
    let balances = get_field(genesis, "/app_state/bank/balances")?
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut res = Vec::new();

    for balance in balances {
        let address = get_str(&balance, "/address")?.to_string();

        for coin in balance
            .get("coins")
            .and_then(|coins| coins.as_array())
            .cloned()
            .unwrap_or_default()
        {
            if get_str(&coin, "/denom")? == denom {
                let amount = get_str(&coin, "/amount")?
                    .parse()
                    .map_err(handle_generic_error)?;
                res.push((address.clone(), amount));
            }
        }
    }

    Ok(res)
}

/**
   The validator set a consumer chain starts with, as `(pub_key, power)`
   pairs, if the genesis contains a consumer genesis exported by a
   provider.
*/
pub fn load_consumer_val_set(genesis: &Value) -> Result<Option<Vec<(String, u64)>>, Error> {
    let Some(val_set) = genesis.pointer("/app_state/ccvconsumer/provider/initial_val_set") else {
        return Ok(None);
    };

    let entries = val_set.as_array().cloned().unwrap_or_default();

    let val_set = entries
        .iter()
        .map(|entry| {
            Ok((
                get_str(entry, "/pub_key/value")?.to_string(),
                get_u64(entry, "/power")?,
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Some(val_set))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chain::chain_type::GenesisParams;
    use crate::types::config::TestConfig;
    use crate::types::id::ChainId;

    fn provider_spec() -> ChainSpec {
        ChainSpec {
            chain_id: ChainId::new("provider"),
            family: ChainFamily::Provider,
            command: "interchain-security-pd".to_string(),
            version: String::new(),
            denom: "stake".to_string(),
            validator_count: 2,
            commit_interval: Duration::from_secs(2),
        }
    }

    #[test]
    fn patched_provider_genesis_is_loaded_back() {
        let mut genesis = initial_genesis(
            &provider_spec(),
            &["cosmos1a".to_string(), "cosmos1b".to_string()],
            SystemTime::UNIX_EPOCH,
        );

        let config = TestConfig::default();
        ChainFamily::Provider
            .patch_genesis(&mut genesis, &GenesisParams::from_config(&config, "stake"))
            .unwrap();

        let params = load_params(&genesis).unwrap();
        let gov = params.gov.unwrap();

        assert_eq!(gov.voting_period, config.voting_period);
        assert_eq!(params.signed_blocks_window, config.downtime_window_blocks);
        assert_eq!(params.max_missed_blocks, config.downtime_window_blocks - 1);

        let balances = load_balances(&genesis, "stake").unwrap();
        assert_eq!(balances.len(), 2);
        assert!(load_consumer_val_set(&genesis).unwrap().is_none());
    }
}
