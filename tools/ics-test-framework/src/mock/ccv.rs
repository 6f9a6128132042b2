/*!
   The cross-chain validation modules of simulated chains.

   On the provider side this covers consumer registration through
   governance, consumer key assignment, and the export of the consumer
   genesis at spawn time. On the consumer side it covers the slash
   packets queued for validators that were down.
*/

use core::time::Duration;
use eyre::eyre;
use serde_json::{json, Value};
use std::time::SystemTime;
use tracing::{info, warn};

use crate::error::Error;
use crate::mock::chain::{tx_event, LiveState, TxOutcome, TxRejection};
use crate::mock::keys;
use crate::types::id::ChainId;
use crate::types::proposal::MsgConsumerAddition;

#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub addition: MsgConsumerAddition,

    /// Exported once the consumer has spawned.
    pub genesis: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct CcvConsumerState {
    pub provider_chain_id: ChainId,

    /// Consensus keys of validators reported for downtime, not yet relayed.
    pub pending_slash_packets: Vec<String>,
}

impl CcvConsumerState {
    pub fn new(provider_chain_id: ChainId) -> Self {
        Self {
            provider_chain_id,
            pending_slash_packets: Vec::new(),
        }
    }
}

fn format_secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

impl LiveState {
    pub fn register_consumer(&mut self, addition: MsgConsumerAddition) -> Result<(), String> {
        if self.consumers.contains_key(&addition.chain_id) {
            return Err(format!(
                "consumer chain {} is already registered",
                addition.chain_id
            ));
        }

        info!(
            "provider {} registers consumer chain {}, spawning at {}",
            self.chain_id,
            addition.chain_id,
            humantime::format_rfc3339_seconds(addition.spawn_time)
        );

        self.consumers.insert(
            addition.chain_id.clone(),
            ConsumerRecord {
                addition,
                genesis: None,
            },
        );

        Ok(())
    }

    /// The consensus key validator `index` uses on the given consumer chain.
    fn consumer_key(&self, chain_id: &str, index: usize) -> Option<&str> {
        self.key_assignments
            .get(&(chain_id.to_string(), index))
            .map(String::as_str)
            .or_else(|| {
                self.validators
                    .get(index)
                    .map(|validator| validator.pub_key.as_str())
            })
    }

    pub fn assign_consensus_key(&mut self, sender: &str, chain_id: &str, pub_key: &str) -> TxOutcome {
        if !self.is_provider {
            return Err(TxRejection::invalid(format!(
                "chain {} is not a provider",
                self.chain_id
            )));
        }

        let index = self.validator_by_account(sender).ok_or_else(|| {
            TxRejection::invalid(format!("{sender} is not the account of a validator"))
        })?;

        let consumer = self
            .consumers
            .get(chain_id)
            .ok_or_else(|| TxRejection::invalid(format!("unknown consumer chain {chain_id}")))?;

        if consumer.genesis.is_some() {
            return Err(TxRejection::invalid(format!(
                "consumer chain {chain_id} has already spawned"
            )));
        }

        let in_use = (0..self.validators.len())
            .filter(|other| *other != index)
            .any(|other| {
                self.consumer_key(chain_id, other) == Some(pub_key)
                    || self.validators[other].pub_key == pub_key
            });

        if in_use {
            return Err(TxRejection::invalid(format!(
                "consumer key {pub_key} is already in use by another validator"
            )));
        }

        self.key_assignments
            .insert((chain_id.to_string(), index), pub_key.to_string());

        Ok(vec![tx_event(
            "assign_consumer_key",
            &[
                ("consumer_chain_id", chain_id.to_string()),
                ("consumer_consensus_pub_key", pub_key.to_string()),
            ],
        )])
    }

    /**
       The initial validator set of a consumer chain, as `(consumer key,
       power)` pairs: the smallest set of the largest validators covering
       the top-N share of the voting power, filtered by the allowlist and
       denylist, capped in size and in individual power.

       Chains that are not top-N chains are validated by all validators.
    */
    fn consumer_val_set(&self, addition: &MsgConsumerAddition) -> Vec<(String, u64)> {
        let total = self.total_power();

        let mut candidates: Vec<usize> = (0..self.validators.len())
            .filter(|index| !self.validators[*index].jailed)
            .collect();

        candidates.sort_by_key(|index| core::cmp::Reverse(self.validators[*index].power));

        if addition.top_n > 0 {
            let threshold = total * u64::from(addition.top_n.min(100));
            let mut covered = 0;

            candidates.retain(|index| {
                let keep = covered * 100 < threshold;
                covered += self.validators[*index].power;
                keep
            });
        }

        let consensus_address = |index: usize| {
            keys::consensus_address(self.account_prefix, &self.validators[index].pub_key)
        };

        if !addition.allowlist.is_empty() {
            candidates.retain(|index| addition.allowlist.contains(&consensus_address(*index)));
        }

        candidates.retain(|index| !addition.denylist.contains(&consensus_address(*index)));

        if addition.validator_set_cap > 0 {
            candidates.truncate(addition.validator_set_cap as usize);
        }

        let set_power: u64 = candidates
            .iter()
            .map(|index| self.validators[*index].power)
            .sum();

        let power_cap = if addition.validators_power_cap > 0 {
            (set_power * u64::from(addition.validators_power_cap) / 100).max(1)
        } else {
            u64::MAX
        };

        candidates
            .into_iter()
            .filter_map(|index| {
                let key = self.consumer_key(&addition.chain_id, index)?;
                Some((key.to_string(), self.validators[index].power.min(power_cap)))
            })
            .collect()
    }

    fn export_consumer_genesis(&self, addition: &MsgConsumerAddition) -> Value {
        let val_set: Vec<Value> = self
            .consumer_val_set(addition)
            .into_iter()
            .map(|(pub_key, power)| {
                json!({
                    "pub_key": { "type": keys::PUB_KEY_TYPE, "value": pub_key },
                    "power": power.to_string(),
                })
            })
            .collect();

        json!({
            "params": {
                "enabled": true,
                "blocks_per_distribution_transmission": addition.blocks_per_distribution_transmission.to_string(),
                "distribution_transmission_channel": addition.distribution_transmission_channel,
                "ccv_timeout_period": format_secs(addition.ccv_timeout_period),
                "transfer_timeout_period": format_secs(addition.transfer_timeout_period),
                "consumer_redistribution_fraction": addition.consumer_redistribution_fraction,
                "historical_entries": addition.historical_entries.to_string(),
                "unbonding_period": format_secs(addition.unbonding_period),
            },
            "provider": {
                "client_state": {
                    "chain_id": self.chain_id.as_str(),
                    "latest_height": {
                        "revision_number": "0",
                        "revision_height": self.height.to_string(),
                    },
                },
                "consensus_state": {
                    "timestamp": humantime::format_rfc3339_seconds(self.last_block_time).to_string(),
                },
                "initial_val_set": val_set,
            },
            "new_chain": true,
        })
    }

    /**
       Spawn every registered consumer whose spawn time is reached: export
       its genesis and create a client tracking it.
    */
    pub fn spawn_consumers(&mut self, time: SystemTime) {
        let due: Vec<MsgConsumerAddition> = self
            .consumers
            .values()
            .filter(|record| record.genesis.is_none() && record.addition.spawn_time <= time)
            .map(|record| record.addition.clone())
            .collect();

        for addition in due {
            let genesis = self.export_consumer_genesis(&addition);

            let val_set_size = genesis
                .pointer("/provider/initial_val_set")
                .and_then(|val_set| val_set.as_array())
                .map_or(0, |val_set| val_set.len());

            let client_id = self.ibc.add_client(&ChainId::new(addition.chain_id.clone()));

            info!(
                "consumer chain {} spawns on provider {} at height {} with {} validators, client {}",
                addition.chain_id, self.chain_id, self.height, val_set_size, client_id
            );

            if let Some(record) = self.consumers.get_mut(&addition.chain_id) {
                record.genesis = Some(genesis);
            }
        }
    }

    pub fn query_consumer_genesis(&self, chain_id: &str) -> Result<Value, Error> {
        let record = self
            .consumers
            .get(chain_id)
            .ok_or_else(|| eyre!("consumer chain {} is not registered", chain_id))?;

        record.genesis.clone().ok_or_else(|| {
            Error::generic(eyre!(
                "consumer chain {} has not spawned yet on provider {}",
                chain_id,
                self.chain_id
            ))
        })
    }

    /**
       Jail the provider validator that uses `pub_key` on the given
       consumer chain. Packets for unknown keys are ignored.
    */
    pub fn handle_slash_packet(&mut self, consumer_chain_id: &ChainId, pub_key: &str) {
        let index = (0..self.validators.len())
            .find(|index| self.consumer_key(consumer_chain_id.as_str(), *index) == Some(pub_key));

        match index {
            Some(index) => {
                let validator = &mut self.validators[index];

                if !validator.jailed {
                    validator.jailed = true;

                    info!(
                        "provider {} jails validator {} for downtime on consumer {}",
                        self.chain_id, validator.operator_address, consumer_chain_id
                    );
                }
            }
            None => warn!(
                "provider {} ignores a slash packet from {} for unknown consensus key {}",
                self.chain_id, consumer_chain_id, pub_key
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chain::chain_type::ChainFamily;
    use crate::chain::driver::ChainDriver;
    use crate::mock::chain::MockChain;
    use crate::types::proposal::{InitialHeight, MSG_CONSUMER_ADDITION_TYPE_URL};
    use test_log::test;

    fn addition(chain_id: &str, spawn_time: SystemTime, top_n: u32) -> MsgConsumerAddition {
        MsgConsumerAddition {
            type_url: MSG_CONSUMER_ADDITION_TYPE_URL.to_string(),
            chain_id: chain_id.to_string(),
            initial_height: InitialHeight {
                revision_number: 0,
                revision_height: 1,
            },
            genesis_hash: String::new(),
            binary_hash: String::new(),
            spawn_time,
            unbonding_period: Duration::from_secs(3600),
            ccv_timeout_period: Duration::from_secs(7200),
            transfer_timeout_period: Duration::from_secs(600),
            consumer_redistribution_fraction: "0.75".to_string(),
            blocks_per_distribution_transmission: 1000,
            historical_entries: 10000,
            distribution_transmission_channel: String::new(),
            top_n,
            validators_power_cap: 0,
            validator_set_cap: 0,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            authority: keys::module_address("cosmos", "gov"),
        }
    }

    fn with_live<R>(chain: &MockChain, f: impl FnOnce(&mut LiveState) -> R) -> R {
        chain.with_live_state(f).unwrap()
    }

    #[test]
    fn spawn_exports_assigned_keys() {
        let (clock, chain) = crate::mock::chain::started_test_chain(ChainFamily::Provider, 3);
        let spawn_time = clock.now() + Duration::from_secs(10);

        with_live(&chain, |live| {
            live.register_consumer(addition("consumer-1", spawn_time, 100)).unwrap()
        });

        assert!(chain
            .exec_query(&["query", "provider", "consumer-genesis", "consumer-1"])
            .is_err());

        let pub_key = r#"{"type":"tendermint/PubKeyEd25519","value":"abcd"}"#;

        chain
            .exec_tx(
                1,
                "validator",
                &["tx", "provider", "assign-consensus-key", "consumer-1", pub_key],
            )
            .unwrap()
            .check(chain.chain_id())
            .unwrap();

        // the same key cannot be assigned to two validators
        let duplicate = chain
            .exec_tx(
                2,
                "validator",
                &["tx", "provider", "assign-consensus-key", "consumer-1", pub_key],
            )
            .unwrap();

        assert_ne!(duplicate.code, 0);

        clock.sleep(Duration::from_secs(12));

        let genesis = chain
            .exec_query(&["query", "provider", "consumer-genesis", "consumer-1"])
            .unwrap();

        let val_set = genesis["provider"]["initial_val_set"].as_array().unwrap().clone();
        assert_eq!(val_set.len(), 3);

        assert!(val_set
            .iter()
            .any(|entry| entry["pub_key"]["value"] == "abcd"));

        assert_eq!(genesis["provider"]["client_state"]["chain_id"], "provider");
    }

    #[test]
    fn top_n_keeps_the_smallest_covering_set() {
        let (clock, chain) = crate::mock::chain::started_test_chain(ChainFamily::Provider, 4);

        let val_set_len = with_live(&chain, |live| {
            live.validators[0].power = 400;
            live.consumer_val_set(&addition("consumer-1", clock.now(), 50)).len()
        });

        // 400 of 700 covers the top 50 percent on its own
        assert_eq!(val_set_len, 1);
    }

    #[test]
    fn slash_packet_jails_the_mapped_validator() {
        let (_clock, chain) = crate::mock::chain::started_test_chain(ChainFamily::Provider, 3);
        let consumer = ChainId::new("consumer-1");

        let pub_key = with_live(&chain, |live| live.validators[2].pub_key.clone());

        chain.receive_slash_packet(&consumer, &pub_key).unwrap();
        chain.receive_slash_packet(&consumer, "unknown").unwrap();

        let jailed: Vec<bool> = with_live(&chain, |live| {
            live.validators.iter().map(|validator| validator.jailed).collect()
        });

        assert_eq!(jailed, vec![false, false, true]);
    }
}
