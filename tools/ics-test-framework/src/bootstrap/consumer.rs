/*!
   Onboard a consumer chain onto a running provider chain.

   The consumer chain can only start from a genesis file that contains
   the validator set exported by the provider, and the provider only
   exports it once the consumer-addition proposal has passed and the
   spawn time is reached. [`bootstrap_consumer_chain`] therefore runs the
   proposal and the provisioning of the consumer nodes side by side, and
   lets them meet through a [`ProposalWaiter`].
*/

use alloc::sync::Arc;
use core::time::Duration;
use std::sync::OnceLock;
use std::thread;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::chain::chain_type::{GenesisParams, MIN_DEPOSIT_AMOUNT};
use crate::chain::config::{
    set_ccv_consumer_genesis, set_timeout_commit, update_genesis_file, update_node_config,
    PRIV_VALIDATOR_KEY_PATH,
};
use crate::chain::driver::{ChainDriver, ChainProvisioner, ChainSpec};
use crate::chain::ext::proposal::ChainProposalMethodsExt;
use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::relayer::driver::{ChannelOptions, Ordering, RelayerDriver};
use crate::types::config::TestConfig;
use crate::types::consumer::{ConsumerConfig, ConsumerHook, OnboardingStage};
use crate::types::id::{ChainId, CONSUMER_PORT, PROVIDER_PORT};
use crate::types::proposal::{
    InitialHeight, MsgConsumerAddition, ProposalFile, ProposalStatus, MSG_CONSUMER_ADDITION_TYPE_URL,
};
use crate::util::clock::{Clock, Deadline};
use crate::util::completion::{completion_pair, CompletionSender};
use crate::util::json::get_field;
use crate::util::retry::assert_eventually;
use crate::util::waiter::ProposalWaiter;

/// Provider blocks to wait for after the spawn time, before the consumer genesis is exported.
pub const BLOCKS_AFTER_SPAWN: u64 = 3;

/// Bound on the wait for the transfer channel, in consumer commit intervals.
pub const TRANSFER_CHANNEL_WAIT_INTERVALS: u32 = 30;

/// Version of the cross-chain validation channel.
pub const CCV_CHANNEL_VERSION: &str = "1";

/// Deposit sent with the proposal, kept below the minimum so that the
/// proposal starts in its deposit period.
pub const INITIAL_DEPOSIT_AMOUNT: u128 = 1;

const UNBONDING_PERIOD: Duration = Duration::from_secs(20 * 24 * 3600);
const CCV_TIMEOUT_PERIOD: Duration = Duration::from_secs(28 * 24 * 3600);
const TRANSFER_TIMEOUT_PERIOD: Duration = Duration::from_secs(3600);

/**
   Onboard a new consumer chain onto `provider` and return its handle.

   The copy-provider-key flags are checked against the provider before
   anything else happens. On success the consumer chain runs with the
   validator set exported by the provider, the relayer has an ordered
   `consumer`/`provider` channel and a transfer channel between the two
   chains, and the consumer is registered on the provider handle.

   Resources created before a failure (chain nodes, relayer paths) are
   not cleaned up here.
*/
pub fn bootstrap_consumer_chain(
    config: &TestConfig,
    clock: &Arc<dyn Clock>,
    provisioner: &dyn ChainProvisioner,
    relayer: &dyn RelayerDriver,
    provider: &Arc<ChainHandle>,
    consumer_config: &ConsumerConfig,
) -> Result<Arc<ChainHandle>, Error> {
    consumer_config.validate(provider.validators.len())?;

    let spawn_time = clock.now() + config.consumer_spawn_delay;

    let chain_id = ChainId::new(format!(
        "{}-{}",
        consumer_config.name,
        provider.consumer_count() + 1
    ));

    info!(
        "onboarding consumer chain {} onto provider {}, spawn time {}",
        chain_id,
        provider.chain_id,
        humantime::format_rfc3339_seconds(spawn_time)
    );

    let deadline = Deadline::after(clock, config.onboarding_timeout);
    let waiter = ProposalWaiter::new();
    let proposal_id = OnceLock::new();

    let onboarding = ConsumerOnboarding {
        config,
        provider,
        consumer_config,
        chain_id: &chain_id,
        spawn_time,
        deadline: &deadline,
        waiter: &waiter,
        proposal_id: &proposal_id,
    };

    let spec = ChainSpec {
        chain_id: chain_id.clone(),
        family: consumer_config.family,
        command: consumer_config.family.command(config),
        version: consumer_config.version.clone(),
        denom: consumer_config.denom.clone(),
        validator_count: provider.validators.len(),
        commit_interval: config.commit_interval,
    };

    let (sender, completion) = completion_pair("consumer addition proposal");

    let provisioned = thread::scope(|s| {
        s.spawn(|| onboarding.run_proposal(sender));

        let provisioned = provisioner.provision(
            &spec,
            Box::new(|driver: &dyn ChainDriver| onboarding.pre_genesis(driver)),
        );

        if let Err(e) = &provisioned {
            warn!("provisioning of consumer chain {} failed: {}", chain_id, e);

            // Release the proposal driver, which may be blocked on a gate
            // or polling the provider.
            waiter.abort(&e.to_string());
            deadline.cancel();
        }

        provisioned
    });

    let consumer_driver = match provisioned {
        Ok(driver) => driver,
        Err(e) => {
            if let Err(proposal_error) = completion.wait() {
                debug!("consumer addition proposal stopped: {}", proposal_error);
            }

            return Err(e);
        }
    };

    // A proposal failure after the chain was provisioned still fails the onboarding.
    completion.wait()?;

    let wallets = provider
        .validators
        .iter()
        .enumerate()
        .map(|(node, validator)| {
            consumer_driver.recover_wallet(node, &validator.moniker, &validator.wallet.mnemonic)
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let consumer = ChainHandle::build(
        consumer_driver,
        consumer_config.family,
        &consumer_config.denom,
        config.commit_interval,
        &config.validator_key_name,
    )?
    .with_validator_wallets(wallets)?;

    connect_consumer(relayer, provider, &consumer, &deadline)?;

    let consumer = Arc::new(consumer);
    provider.add_consumer(consumer.clone());

    info!(
        "consumer chain {} is onboarded onto provider {}",
        consumer.chain_id, provider.chain_id
    );

    Ok(consumer)
}

/**
   The state shared by the two halves of an onboarding: the proposal
   driver running in the background, and the pre-genesis hook run by the
   provisioner.
*/
struct ConsumerOnboarding<'a> {
    config: &'a TestConfig,
    provider: &'a Arc<ChainHandle>,
    consumer_config: &'a ConsumerConfig,
    chain_id: &'a ChainId,
    spawn_time: SystemTime,
    deadline: &'a Deadline,
    waiter: &'a ProposalWaiter,
    proposal_id: &'a OnceLock<u64>,
}

impl<'a> ConsumerOnboarding<'a> {
    fn run_proposal(&self, sender: CompletionSender) {
        let result = self.drive_proposal();

        if let Err(e) = &result {
            warn!(
                "consumer addition proposal for {} failed: {}",
                self.chain_id, e
            );

            // Release the pre-genesis hook, whether it waits on a gate or
            // for the spawn time.
            self.waiter.abort(&e.to_string());
            self.deadline.cancel();
        }

        sender.complete(result);
    }

    fn drive_proposal(&self) -> Result<(), Error> {
        let provider = self.provider.as_ref();
        let shaping = &self.consumer_config.power_shaping;

        let message = MsgConsumerAddition {
            type_url: MSG_CONSUMER_ADDITION_TYPE_URL.to_string(),
            chain_id: self.chain_id.to_string(),
            initial_height: InitialHeight {
                revision_number: 0,
                revision_height: 1,
            },
            genesis_hash: "Z2VuX2hhc2g=".to_string(),
            binary_hash: "YmluX2hhc2g=".to_string(),
            spawn_time: self.spawn_time,
            unbonding_period: UNBONDING_PERIOD,
            ccv_timeout_period: CCV_TIMEOUT_PERIOD,
            transfer_timeout_period: TRANSFER_TIMEOUT_PERIOD,
            consumer_redistribution_fraction: "0.75".to_string(),
            blocks_per_distribution_transmission: 1000,
            historical_entries: 10000,
            distribution_transmission_channel: String::new(),
            top_n: shaping.top_n,
            validators_power_cap: shaping.validators_power_cap,
            validator_set_cap: shaping.validator_set_cap,
            allowlist: shaping.allowlist.clone(),
            denylist: shaping.denylist.clone(),
            authority: provider.query_module_address("gov")?,
        };

        let proposal = ProposalFile::new(
            message,
            &format!("Add consumer chain {}", self.chain_id),
            &provider.token(INITIAL_DEPOSIT_AMOUNT),
        );

        let proposal_id = provider.submit_proposal(0, &proposal)?;
        let _ = self.proposal_id.set(proposal_id);

        provider.wait_for_proposal_status(self.deadline, proposal_id, ProposalStatus::DepositPeriod)?;

        self.waiter.await_deposit_allowed()?;

        provider.deposit_proposal(
            0,
            proposal_id,
            &provider.token(MIN_DEPOSIT_AMOUNT - INITIAL_DEPOSIT_AMOUNT),
        )?;

        provider.wait_for_proposal_status(self.deadline, proposal_id, ProposalStatus::VotingPeriod)?;

        self.waiter.enter_voting()?;
        self.waiter.await_vote_allowed()?;

        provider.vote_yes_all_validators(proposal_id)?;

        provider.wait_for_proposal_status(self.deadline, proposal_id, ProposalStatus::Passed)?;

        self.waiter.mark_passed()?;

        info!(
            "consumer addition proposal {} for {} has passed",
            proposal_id, self.chain_id
        );

        Ok(())
    }

    fn pre_genesis(&self, consumer: &dyn ChainDriver) -> Result<(), Error> {
        let hooks = &self.consumer_config.hooks;

        self.run_hook(&hooks.during_deposit_period, consumer)?;
        self.waiter.open_deposit()?;

        self.waiter.await_voting_entered()?;
        self.run_hook(&hooks.during_voting_period, consumer)?;
        self.waiter.open_vote()?;

        self.waiter.await_passed()?;

        self.assign_consumer_keys(consumer)?;

        self.deadline.sleep_until(
            &format!("spawn time of {}", self.chain_id),
            self.spawn_time,
            self.config.commit_interval,
        )?;
        self.run_hook(&hooks.before_spawn_time, consumer)?;

        self.provider
            .wait_for_blocks(self.deadline, BLOCKS_AFTER_SPAWN)?;

        self.install_consumer_genesis(consumer)?;

        self.run_hook(&hooks.after_spawn_time, consumer)
    }

    /**
       Give each consumer node either the consensus key of its provider
       validator, or register the node's own key as the validator's
       consumer key on the provider.
    */
    fn assign_consumer_keys(&self, consumer: &dyn ChainDriver) -> Result<(), Error> {
        let provider = self.provider.as_ref();

        for (node, copy_key) in self.consumer_config.copy_provider_key.iter().enumerate() {
            if *copy_key {
                let key = provider.driver.read_file(node, PRIV_VALIDATOR_KEY_PATH)?;
                consumer.write_file(node, PRIV_VALIDATOR_KEY_PATH, &key)?;

                debug!(
                    "consumer {} node {} reuses the provider consensus key",
                    self.chain_id, node
                );
            } else {
                let key = consumer.read_json(node, PRIV_VALIDATOR_KEY_PATH)?;
                let pub_key = get_field(&key, "/pub_key")?.to_string();

                provider
                    .driver
                    .exec_tx(
                        node,
                        &provider.validator_key_name,
                        &[
                            "tx",
                            "provider",
                            "assign-consensus-key",
                            self.chain_id.as_str(),
                            &pub_key,
                        ],
                    )?
                    .check(&provider.chain_id)?;

                debug!(
                    "assigned a distinct consensus key to consumer {} node {}",
                    self.chain_id, node
                );
            }
        }

        Ok(())
    }

    fn install_consumer_genesis(&self, consumer: &dyn ChainDriver) -> Result<(), Error> {
        let consumer_genesis = self.provider.driver.exec_query(&[
            "query",
            "provider",
            "consumer-genesis",
            self.chain_id.as_str(),
        ])?;

        let family = self.consumer_config.family;
        let params = GenesisParams::from_config(self.config, &self.consumer_config.denom);

        for node in 0..consumer.node_count() {
            update_node_config(consumer, node, |node_config| {
                set_timeout_commit(node_config, self.config.commit_interval)
            })?;

            update_genesis_file(consumer, node, |genesis| {
                set_ccv_consumer_genesis(genesis, consumer_genesis.clone())?;
                family.patch_genesis(genesis, &params)
            })?;
        }

        info!(
            "installed the consumer genesis exported by {} on {} nodes of {}",
            self.provider.chain_id,
            consumer.node_count(),
            self.chain_id
        );

        Ok(())
    }

    fn run_hook(&self, hook: &Option<ConsumerHook>, consumer: &dyn ChainDriver) -> Result<(), Error> {
        match hook {
            Some(hook) => hook(&OnboardingStage {
                provider: self.provider.as_ref(),
                consumer_chain_id: self.chain_id,
                consumer,
                proposal_id: self.proposal_id.get().copied(),
                spawn_time: self.spawn_time,
            }),
            None => Ok(()),
        }
    }
}

/**
   Link a freshly started consumer to its provider through the relayer:
   register the relayer key, reuse the clients created by the
   cross-chain validation modules, and open the ordered
   `consumer`/`provider` channel. Returns once the transfer channel the
   consumer opens in response is visible.
*/
fn connect_consumer(
    relayer: &dyn RelayerDriver,
    provider: &ChainHandle,
    consumer: &ChainHandle,
    deadline: &Deadline,
) -> Result<(), Error> {
    relayer.restore_key(&consumer.chain_id, &consumer.relayer_wallet)?;

    // The relayer only picks up new chains when it starts.
    relayer.stop()?;
    relayer.start()?;

    let path_name = format!("{}-{}", provider.chain_id, consumer.chain_id);

    if relayer.find_path(&path_name)?.is_none() {
        relayer.create_path(&path_name, &consumer.chain_id, &provider.chain_id)?;
    }

    let consumer_client = relayer.find_client(&consumer.chain_id, &provider.chain_id)?;
    let provider_client = relayer.find_client(&provider.chain_id, &consumer.chain_id)?;

    debug!(
        "relaying {} over clients {} and {}",
        path_name, consumer_client.client_id, provider_client.client_id
    );

    relayer.update_path(
        &path_name,
        &consumer_client.client_id,
        &provider_client.client_id,
    )?;

    relayer.create_connection(&path_name)?;

    relayer.create_channel(
        &path_name,
        &ChannelOptions {
            src_port: CONSUMER_PORT.to_string(),
            dst_port: PROVIDER_PORT.to_string(),
            ordering: Ordering::Ordered,
            version: CCV_CHANNEL_VERSION.to_string(),
        },
    )?;

    let transfer_channel = assert_eventually(
        &format!(
            "transfer channel between {} and {}",
            consumer.chain_id, provider.chain_id
        ),
        &deadline.child(consumer.commit_interval * TRANSFER_CHANNEL_WAIT_INTERVALS),
        consumer.commit_interval,
        || relayer.transfer_channel(&consumer.chain_id, &provider.chain_id),
    )?;

    info!(
        "consumer {} is linked to provider {}, transfer channel {}",
        consumer.chain_id, provider.chain_id, transfer_channel.channel_id
    );

    Ok(())
}
