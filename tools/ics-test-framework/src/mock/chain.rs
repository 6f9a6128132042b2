/*!
   A simulated chain: a set of validator nodes sharing one replicated
   state, producing blocks on the virtual clock.

   Blocks are produced lazily. Every call first catches the state up to
   the current clock time, one block per commit interval, so that the
   chain appears to advance on its own between calls. A chain produces
   blocks only while more than two thirds of the voting power of its
   unjailed validators is running, and never after reaching the height
   of a scheduled upgrade.
*/

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::str;
use core::time::Duration;
use eyre::eyre;
use serde_json::{json, Map, Value};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::chain::chain_type::ChainFamily;
use crate::chain::config::{
    get_timeout_commit, CONFIG_TOML_PATH, GENESIS_PATH, PRIV_VALIDATOR_KEY_PATH,
};
use crate::chain::driver::{ChainDriver, ChainSpec};
use crate::error::{handle_generic_error, Error};
use crate::mock::ccv::{CcvConsumerState, ConsumerRecord};
use crate::mock::genesis::{
    initial_genesis, load_balances, load_consumer_val_set, load_params, ChainParams,
    VALIDATOR_POWER,
};
use crate::mock::gov::GovState;
use crate::mock::ibc::IbcState;
use crate::mock::keys;
use crate::relayer::driver::{ChannelInfo, ClientInfo};
use crate::types::id::ChainId;
use crate::types::proposal::{ProposalFile, UpgradePlan, VoteOption};
use crate::types::token::Token;
use crate::types::tx::{TxEvent, TxEventAttribute, TxResult};
use crate::types::wallet::Wallet;
use crate::util::clock::Clock;
use crate::util::json::get_str;
use crate::util::mutex::MutexUtil;

const MIN_COMMIT_INTERVAL: Duration = Duration::from_millis(10);

pub const CODE_UNAUTHORIZED: u32 = 4;
pub const CODE_INSUFFICIENT_FUNDS: u32 = 5;
pub const CODE_INVALID_REQUEST: u32 = 18;

/**
   A transaction that was included in a block but failed, reported by
   the CLI with a non-zero code.
*/
#[derive(Debug, Clone)]
pub struct TxRejection {
    pub code: u32,
    pub raw_log: String,
}

impl TxRejection {
    pub fn new(code: u32, raw_log: impl Into<String>) -> Self {
        Self {
            code,
            raw_log: raw_log.into(),
        }
    }

    pub fn invalid(raw_log: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_REQUEST, raw_log)
    }
}

pub type TxOutcome = Result<Vec<TxEvent>, TxRejection>;

pub fn tx_event(kind: &str, attributes: &[(&str, String)]) -> TxEvent {
    TxEvent {
        kind: kind.to_string(),
        attributes: attributes
            .iter()
            .map(|(key, value)| TxEventAttribute {
                key: key.to_string(),
                value: value.clone(),
            })
            .collect(),
    }
}

pub struct MockNode {
    pub moniker: String,
    pub running: bool,
    pub files: BTreeMap<String, Vec<u8>>,
    pub keyring: BTreeMap<String, Wallet>,
}

impl MockNode {
    fn read_json(&self, path: &str) -> Result<Value, Error> {
        let content = self
            .files
            .get(path)
            .ok_or_else(|| eyre!("node {} has no file {}", self.moniker, path))?;

        serde_json::from_slice(content).map_err(handle_generic_error)
    }

    fn pub_key(&self) -> Result<String, Error> {
        let key = self.read_json(PRIV_VALIDATOR_KEY_PATH)?;
        Ok(get_str(&key, "/pub_key/value")?.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct MockValidator {
    /// The account the validator signs governance transactions with.
    pub account: String,

    /// Empty on consumer chains, which have no staking module.
    pub operator_address: String,

    pub pub_key: String,
    pub power: u64,
    pub jailed: bool,

    /// The node running this validator, if any.
    pub node: Option<usize>,

    pub missed_blocks: u64,
    pub downtime_reported: bool,
}

/**
   The replicated state of a chain that has started.
*/
pub struct LiveState {
    pub chain_id: ChainId,
    pub account_prefix: &'static str,
    pub is_provider: bool,
    pub denom: String,
    pub height: u64,
    pub last_block_time: SystemTime,
    pub commit_interval: Duration,
    pub halted: bool,
    pub params: ChainParams,
    pub balances: BTreeMap<String, u128>,
    pub validators: Vec<MockValidator>,
    pub gov: GovState,
    pub upgrade_plan: Option<UpgradePlan>,

    /// Consumer chains registered on a provider, by chain id.
    pub consumers: BTreeMap<String, ConsumerRecord>,

    /// Consumer consensus keys assigned by provider validators, by consumer
    /// chain id and validator index.
    pub key_assignments: BTreeMap<(String, usize), String>,

    /// Set on chains started from a consumer genesis.
    pub ccv: Option<CcvConsumerState>,

    pub ibc: IbcState,
    pub tx_count: u64,
}

impl LiveState {
    fn is_online(validator: &MockValidator, nodes: &[MockNode]) -> bool {
        validator
            .node
            .and_then(|node| nodes.get(node))
            .map_or(false, |node| node.running)
    }

    pub fn total_power(&self) -> u64 {
        self.validators
            .iter()
            .filter(|validator| !validator.jailed)
            .map(|validator| validator.power)
            .sum()
    }

    fn can_produce(&self, nodes: &[MockNode]) -> bool {
        if self.halted {
            return false;
        }

        let online: u64 = self
            .validators
            .iter()
            .filter(|validator| !validator.jailed && Self::is_online(validator, nodes))
            .map(|validator| validator.power)
            .sum();

        let total = self.total_power();

        total > 0 && online * 3 > total * 2
    }

    fn catch_up(&mut self, nodes: &[MockNode], now: SystemTime) {
        while self.last_block_time + self.commit_interval <= now {
            if !self.can_produce(nodes) {
                self.last_block_time = now;
                return;
            }

            self.height += 1;
            self.last_block_time += self.commit_interval;

            self.end_block(nodes);
        }
    }

    fn end_block(&mut self, nodes: &[MockNode]) {
        let time = self.last_block_time;

        self.end_block_gov(time);
        self.spawn_consumers(time);
        self.track_downtime(nodes);

        if let Some(plan) = &self.upgrade_plan {
            if plan.height == self.height {
                info!(
                    "chain {} halts at height {} for upgrade {}",
                    self.chain_id, self.height, plan.name
                );

                self.halted = true;
            }
        }
    }

    /**
       Count consecutive missed blocks. A provider jails a validator
       directly, while a consumer queues a slash packet for the provider,
       once per downtime episode.
    */
    fn track_downtime(&mut self, nodes: &[MockNode]) {
        let max_missed = self.params.max_missed_blocks;
        let is_consumer = self.ccv.is_some();
        let mut slash_packets = Vec::new();

        for validator in self.validators.iter_mut().filter(|v| !v.jailed) {
            if Self::is_online(validator, nodes) {
                validator.missed_blocks = 0;
                validator.downtime_reported = false;
                continue;
            }

            validator.missed_blocks += 1;

            if validator.missed_blocks <= max_missed {
                continue;
            }

            if is_consumer {
                if !validator.downtime_reported {
                    validator.downtime_reported = true;
                    slash_packets.push(validator.pub_key.clone());
                }
            } else {
                validator.jailed = true;

                info!(
                    "validator {} is jailed on chain {} after missing {} blocks",
                    validator.operator_address, self.chain_id, validator.missed_blocks
                );
            }
        }

        if let Some(ccv) = &mut self.ccv {
            for pub_key in slash_packets {
                info!(
                    "chain {} queues a downtime slash packet for consensus key {}",
                    self.chain_id, pub_key
                );

                ccv.pending_slash_packets.push(pub_key);
            }
        }
    }

    pub fn validator_by_account(&self, account: &str) -> Option<usize> {
        self.validators
            .iter()
            .position(|validator| validator.account == account)
    }

    pub fn debit(&mut self, address: &str, amount: u128) -> Result<(), TxRejection> {
        let balance = self.balances.get(address).copied().unwrap_or(0);

        if balance < amount {
            return Err(TxRejection::new(
                CODE_INSUFFICIENT_FUNDS,
                format!(
                    "{}{} is smaller than {}{}: insufficient funds",
                    balance, self.denom, amount, self.denom
                ),
            ));
        }

        self.balances.insert(address.to_string(), balance - amount);

        Ok(())
    }

    fn bank_send(&mut self, sender: &str, recipient: &str, amount: &Token) -> TxOutcome {
        if amount.denom != self.denom {
            return Err(TxRejection::new(
                CODE_INSUFFICIENT_FUNDS,
                format!("no balance in denomination {}", amount.denom),
            ));
        }

        self.debit(sender, amount.amount)?;

        *self.balances.entry(recipient.to_string()).or_insert(0) += amount.amount;

        Ok(vec![tx_event(
            "transfer",
            &[
                ("recipient", recipient.to_string()),
                ("sender", sender.to_string()),
                ("amount", amount.to_string()),
            ],
        )])
    }

    fn execute_tx(
        &mut self,
        sender: &str,
        args: &[&str],
        files: &BTreeMap<String, Vec<u8>>,
    ) -> Result<TxOutcome, Error> {
        match args {
            ["tx", "bank", "send", _from, recipient, amount] => {
                let amount: Token = amount.parse()?;
                Ok(self.bank_send(sender, recipient, &amount))
            }
            ["tx", "gov", "submit-proposal", path] => {
                let content = files
                    .get(*path)
                    .ok_or_else(|| eyre!("proposal file {} does not exist", path))?;

                let proposal: ProposalFile<Value> =
                    serde_json::from_slice(content).map_err(handle_generic_error)?;

                let deposit: Token = proposal.deposit.parse()?;

                Ok(self.submit_proposal(sender, &proposal, &deposit))
            }
            ["tx", "gov", "deposit", proposal_id, amount] => {
                let proposal_id: u64 = proposal_id.parse().map_err(handle_generic_error)?;
                let amount: Token = amount.parse()?;

                Ok(self.deposit(sender, proposal_id, &amount))
            }
            ["tx", "gov", "vote", proposal_id, option] => {
                let proposal_id: u64 = proposal_id.parse().map_err(handle_generic_error)?;

                let option = match *option {
                    "yes" => VoteOption::Yes,
                    "no" => VoteOption::No,
                    "abstain" => VoteOption::Abstain,
                    "no_with_veto" => VoteOption::NoWithVeto,
                    other => return Err(Error::generic(eyre!("invalid vote option `{}`", other))),
                };

                Ok(self.vote(sender, proposal_id, option))
            }
            ["tx", "provider", "assign-consensus-key", chain_id, pub_key] => {
                let pub_key: Value = serde_json::from_str(pub_key).map_err(handle_generic_error)?;
                let pub_key = get_str(&pub_key, "/value")?;

                Ok(self.assign_consensus_key(sender, chain_id, pub_key))
            }
            _ => Err(Error::generic(eyre!(
                "unsupported transaction `{}`",
                args.join(" ")
            ))),
        }
    }

    fn execute_query(&self, args: &[&str]) -> Result<Value, Error> {
        match args {
            ["query", "gov", "proposal", proposal_id] => {
                let proposal_id: u64 = proposal_id.parse().map_err(handle_generic_error)?;
                self.query_proposal(proposal_id)
            }
            ["query", "auth", "module-account", module] => Ok(json!({
                "account": {
                    "type": "cosmos-sdk/ModuleAccount",
                    "value": {
                        "address": keys::module_address(self.account_prefix, module),
                        "name": module,
                    }
                }
            })),
            ["query", "staking", "validator", operator_address] => {
                self.query_validator(operator_address)
            }
            ["query", "provider", "consumer-genesis", chain_id] => {
                self.query_consumer_genesis(chain_id)
            }
            ["query", "comet-validator-set"] => Ok(self.query_validator_set()),
            ["query", "bank", "balances", address] => {
                let amount = self.balances.get(*address).copied().unwrap_or(0);

                Ok(json!({
                    "balances": [{ "denom": self.denom, "amount": amount.to_string() }]
                }))
            }
            _ => Err(Error::generic(eyre!(
                "unsupported query `{}`",
                args.join(" ")
            ))),
        }
    }

    fn query_validator(&self, operator_address: &str) -> Result<Value, Error> {
        let validator = self
            .validators
            .iter()
            .find(|validator| {
                !validator.operator_address.is_empty()
                    && validator.operator_address == operator_address
            })
            .ok_or_else(|| {
                eyre!(
                    "validator {} does not exist on chain {}",
                    operator_address,
                    self.chain_id
                )
            })?;

        let mut res = Map::new();

        res.insert(
            "operator_address".to_string(),
            json!(validator.operator_address),
        );
        res.insert(
            "tokens".to_string(),
            json!((u128::from(validator.power) * 1_000_000).to_string()),
        );

        if validator.jailed {
            res.insert("jailed".to_string(), json!(true));
            res.insert("status".to_string(), json!("BOND_STATUS_UNBONDING"));
        } else {
            res.insert("status".to_string(), json!("BOND_STATUS_BONDED"));
        }

        Ok(json!({ "validator": res }))
    }

    fn query_validator_set(&self) -> Value {
        let validators: Vec<Value> = self
            .validators
            .iter()
            .filter(|validator| !validator.jailed)
            .map(|validator| {
                json!({
                    "address": keys::consensus_address(self.account_prefix, &validator.pub_key),
                    "pub_key": {
                        "type": keys::PUB_KEY_TYPE,
                        "value": validator.pub_key,
                    },
                    "voting_power": validator.power.to_string(),
                    "proposer_priority": "0",
                })
            })
            .collect();

        json!({
            "block_height": self.height.to_string(),
            "total": validators.len().to_string(),
            "validators": validators,
        })
    }
}

pub struct ChainState {
    pub chain_id: ChainId,
    pub family: ChainFamily,
    pub denom: String,
    pub validator_key_name: String,
    pub version: String,
    pub nodes: Vec<MockNode>,
    pub live: Option<LiveState>,
}

impl ChainState {
    fn catch_up(&mut self, now: SystemTime) {
        let ChainState { nodes, live, .. } = self;

        if let Some(live) = live {
            live.catch_up(nodes, now);
        }
    }

    fn node(&self, node: usize) -> Result<&MockNode, Error> {
        self.nodes
            .get(node)
            .ok_or_else(|| Error::node_index(self.chain_id.to_string(), node, self.nodes.len()))
    }

    fn node_mut(&mut self, node: usize) -> Result<&mut MockNode, Error> {
        let count = self.nodes.len();
        let chain_id = &self.chain_id;

        self.nodes
            .get_mut(node)
            .ok_or_else(|| Error::node_index(chain_id.to_string(), node, count))
    }

    fn live(&self) -> Result<&LiveState, Error> {
        self.live
            .as_ref()
            .ok_or_else(|| Error::generic(eyre!("chain {} has not started", self.chain_id)))
    }

    fn live_mut(&mut self) -> Result<&mut LiveState, Error> {
        let chain_id = &self.chain_id;

        self.live
            .as_mut()
            .ok_or_else(|| Error::generic(eyre!("chain {} has not started", chain_id)))
    }

    fn require_running(&self) -> Result<(), Error> {
        if self.nodes.iter().any(|node| node.running) {
            Ok(())
        } else {
            Err(Error::generic(eyre!(
                "no node of chain {} is running",
                self.chain_id
            )))
        }
    }

    fn add_key(&mut self, node: usize, key_name: &str, mnemonic: String) -> Result<Wallet, Error> {
        let prefix = self.family.spec().account_prefix;
        let chain_id = self.chain_id.clone();
        let node_state = self.node_mut(node)?;

        if node_state.keyring.contains_key(key_name) {
            return Err(Error::generic(eyre!(
                "key {} already exists on node {} of chain {}",
                key_name,
                node,
                chain_id
            )));
        }

        let wallet = Wallet::new(
            key_name.to_string(),
            keys::account_address(prefix, &mnemonic),
            mnemonic,
        );

        node_state
            .keyring
            .insert(key_name.to_string(), wallet.clone());

        Ok(wallet)
    }

    /**
       Load the genesis file and node config written before the first
       start. All nodes must agree on the genesis file.
    */
    fn boot(&self, now: SystemTime) -> Result<LiveState, Error> {
        let spec = self.family.spec();
        let genesis = self.node(0)?.read_json(GENESIS_PATH)?;

        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            if node.read_json(GENESIS_PATH)? != genesis {
                return Err(Error::generic(eyre!(
                    "genesis file of node {} of chain {} differs from node 0",
                    i,
                    self.chain_id
                )));
            }
        }

        let config = self
            .node(0)?
            .files
            .get(CONFIG_TOML_PATH)
            .ok_or_else(|| eyre!("chain {} has no node config", self.chain_id))?;

        let config: toml::Value = toml::from_str(str::from_utf8(config).map_err(handle_generic_error)?)
            .map_err(handle_generic_error)?;

        let commit_interval = get_timeout_commit(&config)?.max(MIN_COMMIT_INTERVAL);

        let pub_keys = self
            .nodes
            .iter()
            .map(MockNode::pub_key)
            .collect::<Result<Vec<_>, Error>>()?;

        let mut ibc = IbcState::default();

        let (validators, ccv) = match load_consumer_val_set(&genesis)? {
            Some(val_set) => {
                let provider_chain_id = ChainId::new(get_str(
                    &genesis,
                    "/app_state/ccvconsumer/provider/client_state/chain_id",
                )?);

                ibc.add_client(&provider_chain_id);

                let validators = val_set
                    .into_iter()
                    .map(|(pub_key, power)| {
                        let node = pub_keys.iter().position(|key| key == &pub_key);

                        let account = node
                            .and_then(|node| self.nodes[node].keyring.get(&self.validator_key_name))
                            .map(|wallet| wallet.address.0.clone())
                            .unwrap_or_default();

                        MockValidator {
                            account,
                            operator_address: String::new(),
                            pub_key,
                            power,
                            jailed: false,
                            node,
                            missed_blocks: 0,
                            downtime_reported: false,
                        }
                    })
                    .collect::<Vec<_>>();

                for validator in validators.iter().filter(|v| v.node.is_none()) {
                    warn!(
                        "no node of consumer chain {} runs the validator with consensus key {}",
                        self.chain_id, validator.pub_key
                    );
                }

                (validators, Some(CcvConsumerState::new(provider_chain_id)))
            }
            None => {
                let validators = self
                    .nodes
                    .iter()
                    .zip(pub_keys)
                    .enumerate()
                    .map(|(i, (node, pub_key))| {
                        let wallet = node.keyring.get(&self.validator_key_name).ok_or_else(|| {
                            eyre!(
                                "node {} of chain {} has no key {}",
                                i,
                                self.chain_id,
                                self.validator_key_name
                            )
                        })?;

                        Ok(MockValidator {
                            account: wallet.address.0.clone(),
                            operator_address: keys::operator_address(
                                spec.account_prefix,
                                &wallet.mnemonic,
                            ),
                            pub_key,
                            power: VALIDATOR_POWER,
                            jailed: false,
                            node: Some(i),
                            missed_blocks: 0,
                            downtime_reported: false,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;

                (validators, None)
            }
        };

        Ok(LiveState {
            chain_id: self.chain_id.clone(),
            account_prefix: spec.account_prefix,
            is_provider: spec.is_provider,
            denom: self.denom.clone(),
            height: 0,
            last_block_time: now,
            commit_interval,
            halted: false,
            params: load_params(&genesis)?,
            balances: load_balances(&genesis, &self.denom)?.into_iter().collect(),
            validators,
            gov: GovState::default(),
            upgrade_plan: None,
            consumers: BTreeMap::new(),
            key_assignments: BTreeMap::new(),
            ccv,
            ibc,
            tx_count: 0,
        })
    }
}

pub struct MockChain {
    chain_id: ChainId,
    node_count: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<ChainState>,
}

impl MockChain {
    /**
       Initialize the home directories of all nodes: a validator key in
       each keyring, a consensus key, the node config and a genesis file
       funding every validator. No node is started.
    */
    pub fn init(
        spec: &ChainSpec,
        clock: Arc<dyn Clock>,
        validator_key_name: &str,
    ) -> Result<Self, Error> {
        let prefix = spec.family.spec().account_prefix;

        let mut nodes = (0..spec.validator_count)
            .map(|i| {
                let mnemonic = keys::generate_mnemonic();
                let wallet = Wallet::new(
                    validator_key_name.to_string(),
                    keys::account_address(prefix, &mnemonic),
                    mnemonic,
                );

                let priv_key = serde_json::to_vec_pretty(&keys::generate_priv_validator_key())
                    .map_err(handle_generic_error)?;

                let node_config = format!(
                    "moniker = \"validator-{}\"\n\n[consensus]\ntimeout_commit = \"{}ms\"\n",
                    i,
                    spec.commit_interval.as_millis()
                );

                Ok(MockNode {
                    moniker: format!("validator-{i}"),
                    running: false,
                    files: BTreeMap::from([
                        (PRIV_VALIDATOR_KEY_PATH.to_string(), priv_key),
                        (CONFIG_TOML_PATH.to_string(), node_config.into_bytes()),
                    ]),
                    keyring: BTreeMap::from([(validator_key_name.to_string(), wallet)]),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let accounts: Vec<String> = nodes
            .iter()
            .filter_map(|node| node.keyring.get(validator_key_name))
            .map(|wallet| wallet.address.0.clone())
            .collect();

        let genesis = serde_json::to_vec_pretty(&initial_genesis(spec, &accounts, clock.now()))
            .map_err(handle_generic_error)?;

        for node in nodes.iter_mut() {
            node.files.insert(GENESIS_PATH.to_string(), genesis.clone());
        }

        debug!(
            "initialized {} nodes of chain {} with version `{}`",
            spec.validator_count, spec.chain_id, spec.version
        );

        Ok(Self {
            chain_id: spec.chain_id.clone(),
            node_count: spec.validator_count,
            clock,
            state: Mutex::new(ChainState {
                chain_id: spec.chain_id.clone(),
                family: spec.family,
                denom: spec.denom.clone(),
                validator_key_name: validator_key_name.to_string(),
                version: spec.version.clone(),
                nodes,
                live: None,
            }),
        })
    }

    /// Lock the chain state, after producing every block due by now.
    fn synced_state(&self) -> Result<MutexGuard<'_, ChainState>, Error> {
        let mut state = self.state.acquire_mutex()?;
        state.catch_up(self.clock.now());
        Ok(state)
    }

    pub fn commit_interval(&self) -> Result<Duration, Error> {
        Ok(self.synced_state()?.live()?.commit_interval)
    }

    pub fn version(&self) -> Result<String, Error> {
        Ok(self.state.acquire_mutex()?.version.clone())
    }

    pub fn clients(&self) -> Result<Vec<ClientInfo>, Error> {
        let state = self.synced_state()?;
        state.require_running()?;
        Ok(state.live()?.ibc.clients())
    }

    pub fn open_connection(&self) -> Result<String, Error> {
        let mut state = self.synced_state()?;
        state.require_running()?;
        Ok(state.live_mut()?.ibc.open_connection())
    }

    /// Add a channel end that opens at `open_after`, and return its id.
    pub fn add_channel_end(&self, info: ChannelInfo, open_after: SystemTime) -> Result<String, Error> {
        let mut state = self.synced_state()?;
        state.require_running()?;
        Ok(state.live_mut()?.ibc.add_channel(info, open_after))
    }

    pub fn set_counterparty_channel(
        &self,
        channel_id: &str,
        counterparty_channel_id: &str,
    ) -> Result<(), Error> {
        let mut state = self.synced_state()?;

        state
            .live_mut()?
            .ibc
            .set_counterparty_channel(channel_id, counterparty_channel_id);

        Ok(())
    }

    pub fn channels(&self, counterparty: &ChainId) -> Result<Vec<ChannelInfo>, Error> {
        let now = self.clock.now();
        let state = self.synced_state()?;
        state.require_running()?;
        Ok(state.live()?.ibc.channels(counterparty, now))
    }

    pub fn channel(&self, port_id: &str, channel_id: &str) -> Result<Option<ChannelInfo>, Error> {
        let now = self.clock.now();
        let state = self.synced_state()?;

        Ok(state.live()?.ibc.channel(port_id, channel_id).map(|end| ChannelInfo {
            open: now >= end.open_after,
            ..end.info.clone()
        }))
    }

    /**
       Take the slash packets queued on the cross-chain validation channel
       `channel_id`. Returns an empty list on chains that are not consumers.
    */
    pub fn take_slash_packets(&self, port_id: &str, channel_id: &str) -> Result<Vec<String>, Error> {
        let mut state = self.synced_state()?;
        state.require_running()?;

        let live = state.live_mut()?;

        if live.ibc.channel(port_id, channel_id).is_none() {
            return Err(Error::generic(eyre!(
                "chain {} has no channel {} on port {}",
                live.chain_id,
                channel_id,
                port_id
            )));
        }

        Ok(live
            .ccv
            .as_mut()
            .map(|ccv| core::mem::take(&mut ccv.pending_slash_packets))
            .unwrap_or_default())
    }

    pub fn receive_slash_packet(&self, consumer_chain_id: &ChainId, pub_key: &str) -> Result<(), Error> {
        let mut state = self.synced_state()?;
        state.require_running()?;
        state.live_mut()?.handle_slash_packet(consumer_chain_id, pub_key);
        Ok(())
    }
}

impl ChainDriver for MockChain {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn node_count(&self) -> usize {
        self.node_count
    }

    fn moniker(&self, node: usize) -> Result<String, Error> {
        Ok(self.state.acquire_mutex()?.node(node)?.moniker.clone())
    }

    fn height(&self) -> Result<u64, Error> {
        let state = self.synced_state()?;
        state.require_running()?;
        Ok(state.live()?.height)
    }

    fn exec_tx(&self, node: usize, key_name: &str, args: &[&str]) -> Result<TxResult, Error> {
        let mut state = self.synced_state()?;
        let chain_id = state.chain_id.clone();

        state.node(node)?;

        let ChainState { nodes, live, .. } = &mut *state;

        let node_state = &nodes[node];

        if !node_state.running {
            return Err(Error::generic(eyre!(
                "node {} of chain {} is not running",
                node,
                chain_id
            )));
        }

        let sender = node_state
            .keyring
            .get(key_name)
            .ok_or_else(|| eyre!("key {} not found on node {} of chain {}", key_name, node, chain_id))?
            .address
            .0
            .clone();

        let live = live
            .as_mut()
            .ok_or_else(|| eyre!("chain {} has not started", chain_id))?;

        if live.halted {
            return Err(Error::generic(eyre!(
                "chain {} is halted at height {}, the transaction was not included",
                chain_id,
                live.height
            )));
        }

        let outcome = live.execute_tx(&sender, args, &node_state.files)?;

        live.tx_count += 1;

        let tx_hash = keys::tx_hash(&format!("{}/{}/{}", chain_id, live.height, live.tx_count));

        Ok(match outcome {
            Ok(events) => TxResult {
                tx_hash,
                code: 0,
                raw_log: String::new(),
                events,
            },
            Err(rejection) => {
                debug!(
                    "transaction `{}` on chain {} failed: {}",
                    args.join(" "),
                    chain_id,
                    rejection.raw_log
                );

                TxResult {
                    tx_hash,
                    code: rejection.code,
                    raw_log: rejection.raw_log,
                    events: Vec::new(),
                }
            }
        })
    }

    fn exec_query(&self, args: &[&str]) -> Result<Value, Error> {
        let state = self.synced_state()?;
        state.require_running()?;
        state.live()?.execute_query(args)
    }

    fn exec_node(&self, node: usize, args: &[&str]) -> Result<String, Error> {
        let state = self.state.acquire_mutex()?;
        let node_state = state.node(node)?;

        match args {
            ["keys", "list", ..] => {
                let keys: Vec<Value> = node_state
                    .keyring
                    .values()
                    .map(|wallet| {
                        json!({
                            "name": wallet.key_name,
                            "type": "local",
                            "address": wallet.address.0,
                        })
                    })
                    .collect();

                serde_json::to_string(&keys).map_err(handle_generic_error)
            }
            ["version"] => Ok(state.version.clone()),
            _ => Err(Error::generic(eyre!(
                "unsupported node command `{}`",
                args.join(" ")
            ))),
        }
    }

    fn read_file(&self, node: usize, path: &str) -> Result<Vec<u8>, Error> {
        let state = self.state.acquire_mutex()?;

        state
            .node(node)?
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| {
                Error::generic(eyre!(
                    "file {} not found on node {} of chain {}",
                    path,
                    node,
                    self.chain_id
                ))
            })
    }

    fn write_file(&self, node: usize, path: &str, content: &[u8]) -> Result<(), Error> {
        let mut state = self.state.acquire_mutex()?;

        state
            .node_mut(node)?
            .files
            .insert(path.to_string(), content.to_vec());

        Ok(())
    }

    fn stop_all_nodes(&self) -> Result<(), Error> {
        let mut state = self.synced_state()?;

        for node in state.nodes.iter_mut() {
            node.running = false;
        }

        info!("stopped all nodes of chain {}", self.chain_id);

        Ok(())
    }

    fn start_all_nodes(&self) -> Result<(), Error> {
        let now = self.clock.now();
        let mut state = self.synced_state()?;

        if state.live.is_none() {
            let live = state.boot(now)?;

            info!(
                "chain {} starts with {} validators and a commit interval of {:?}",
                self.chain_id,
                live.validators.len(),
                live.commit_interval
            );

            state.live = Some(live);
        }

        for node in state.nodes.iter_mut() {
            node.running = true;
        }

        Ok(())
    }

    fn stop_node(&self, node: usize) -> Result<(), Error> {
        self.synced_state()?.node_mut(node)?.running = false;
        Ok(())
    }

    fn start_node(&self, node: usize) -> Result<(), Error> {
        let mut state = self.synced_state()?;

        state.live()?;
        state.node_mut(node)?.running = true;

        Ok(())
    }

    fn upgrade_binary(&self, version: &str) -> Result<(), Error> {
        let mut state = self.synced_state()?;

        if let Some(node) = state.nodes.iter().position(|node| node.running) {
            return Err(Error::generic(eyre!(
                "cannot replace the binary of chain {} while node {} is running",
                self.chain_id,
                node
            )));
        }

        state.version = version.to_string();

        if let Some(live) = &mut state.live {
            if let Some(plan) = live.upgrade_plan.take() {
                info!(
                    "chain {} applies upgrade {} with version `{}` at height {}",
                    self.chain_id, plan.name, version, live.height
                );
            }

            live.halted = false;
        }

        Ok(())
    }

    fn wallet(&self, node: usize, key_name: &str) -> Result<Wallet, Error> {
        let state = self.state.acquire_mutex()?;

        state
            .node(node)?
            .keyring
            .get(key_name)
            .cloned()
            .ok_or_else(|| {
                Error::generic(eyre!(
                    "key {} not found on node {} of chain {}",
                    key_name,
                    node,
                    self.chain_id
                ))
            })
    }

    fn create_wallet(&self, node: usize, key_name: &str) -> Result<Wallet, Error> {
        self.state
            .acquire_mutex()?
            .add_key(node, key_name, keys::generate_mnemonic())
    }

    fn recover_wallet(&self, node: usize, key_name: &str, mnemonic: &str) -> Result<Wallet, Error> {
        self.state
            .acquire_mutex()?
            .add_key(node, key_name, mnemonic.to_string())
    }

    fn operator_address(&self, node: usize, key_name: &str) -> Result<String, Error> {
        let wallet = self.wallet(node, key_name)?;
        let family = self.state.acquire_mutex()?.family;

        Ok(keys::operator_address(
            family.spec().account_prefix,
            &wallet.mnemonic,
        ))
    }

    fn consensus_address(&self, node: usize) -> Result<String, Error> {
        let state = self.state.acquire_mutex()?;
        let pub_key = state.node(node)?.pub_key()?;

        Ok(keys::consensus_address(
            state.family.spec().account_prefix,
            &pub_key,
        ))
    }
}

#[cfg(test)]
impl MockChain {
    pub fn with_live_state<R>(&self, f: impl FnOnce(&mut LiveState) -> R) -> Result<R, Error> {
        let mut state = self.synced_state()?;
        Ok(f(state.live_mut()?))
    }
}

/**
   A chain with `validator_count` nodes, its genesis patched
   with the default test parameters, started on a fresh mock clock.
*/
#[cfg(test)]
pub fn started_test_chain(family: ChainFamily, validator_count: usize) -> (Arc<dyn Clock>, MockChain) {
    use crate::chain::chain_type::GenesisParams;
    use crate::chain::config::update_genesis_file;
    use crate::types::config::TestConfig;
    use crate::util::clock::MockClock;

    let config = TestConfig::default();
    let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
    let denom = family.spec().default_denom;

    let spec = ChainSpec {
        chain_id: ChainId::new(family.spec().name),
        family,
        command: family.spec().command.to_string(),
        version: "v1".to_string(),
        denom: denom.to_string(),
        validator_count,
        commit_interval: config.commit_interval,
    };

    let chain = MockChain::init(&spec, clock.clone(), &config.validator_key_name).unwrap();
    let params = GenesisParams::from_config(&config, denom);

    for node in 0..validator_count {
        update_genesis_file(&chain, node, |genesis| family.patch_genesis(genesis, &params)).unwrap();
    }

    chain.start_all_nodes().unwrap();

    (clock, chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chain::config::update_genesis_file;
    use crate::util::json::set_field;

    #[test]
    fn produces_one_block_per_commit_interval() {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 4);

        assert_eq!(chain.height().unwrap(), 0);

        clock.sleep(Duration::from_secs(10));
        assert_eq!(chain.height().unwrap(), 5);
    }

    #[test]
    fn stalls_without_two_thirds_of_the_power() {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 4);

        clock.sleep(Duration::from_secs(4));
        chain.stop_node(0).unwrap();
        clock.sleep(Duration::from_secs(4));

        // three of four validators are still more than two thirds
        assert_eq!(chain.height().unwrap(), 4);

        chain.stop_node(1).unwrap();
        clock.sleep(Duration::from_secs(10));
        assert_eq!(chain.height().unwrap(), 4);

        chain.start_node(1).unwrap();
        clock.sleep(Duration::from_secs(2));
        assert_eq!(chain.height().unwrap(), 5);
    }

    #[test]
    fn nodes_must_agree_on_genesis() {
        let config = crate::types::config::TestConfig::default();
        let clock: Arc<dyn Clock> = Arc::new(crate::util::clock::MockClock::default());

        let spec = ChainSpec {
            chain_id: ChainId::new("provider"),
            family: ChainFamily::Provider,
            command: "interchain-security-pd".to_string(),
            version: String::new(),
            denom: "stake".to_string(),
            validator_count: 2,
            commit_interval: config.commit_interval,
        };

        let chain = MockChain::init(&spec, clock, &config.validator_key_name).unwrap();

        update_genesis_file(&chain, 1, |genesis| {
            set_field(genesis, "/app_state/staking/params/bond_denom", json!("other"))
        })
        .unwrap();

        assert!(chain.start_all_nodes().is_err());
    }

    #[test]
    fn bank_send_moves_funds() {
        let (_clock, chain) = started_test_chain(ChainFamily::Provider, 2);

        let relayer = chain.create_wallet(0, "relayer").unwrap();

        chain
            .exec_tx(
                0,
                "validator",
                &["tx", "bank", "send", "validator", &relayer.address.0, "1000stake"],
            )
            .unwrap()
            .check(chain.chain_id())
            .unwrap();

        let balance = chain
            .query_json(
                "/balances/0/amount",
                &["query", "bank", "balances", &relayer.address.0],
            )
            .unwrap();

        assert_eq!(balance, json!("1000"));

        let overdraft = chain
            .exec_tx(
                0,
                "relayer",
                &["tx", "bank", "send", "relayer", "cosmos1x", "5000stake"],
            )
            .unwrap();

        assert_eq!(overdraft.code, CODE_INSUFFICIENT_FUNDS);
    }

    #[test]
    fn stopped_chain_is_unreachable() {
        let (_clock, chain) = started_test_chain(ChainFamily::Provider, 2);

        chain.stop_all_nodes().unwrap();

        assert!(chain.height().is_err());
        assert!(chain
            .exec_query(&["query", "bank", "balances", "cosmos1x"])
            .is_err());

        chain.upgrade_binary("v2").unwrap();
        chain.start_all_nodes().unwrap();

        assert_eq!(chain.exec_node(0, &["version"]).unwrap(), "v2");
        assert_eq!(chain.height().unwrap(), 0);
    }
}
