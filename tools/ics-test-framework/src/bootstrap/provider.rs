/*!
   Bootstrap the provider chain.
*/

use alloc::sync::Arc;
use tracing::info;

use crate::chain::chain_type::{ChainFamily, GenesisParams};
use crate::chain::config::{set_timeout_commit, update_genesis_file, update_node_config};
use crate::chain::driver::{ChainDriver, ChainProvisioner, ChainSpec};
use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::relayer::driver::RelayerDriver;
use crate::types::config::TestConfig;
use crate::types::id::ChainId;

/// Chain id of the provider chain. There is one provider per test run.
pub const PROVIDER_CHAIN_ID: &str = "provider";

/**
   Provision the provider chain and return its handle.

   Before the nodes start, every node gets the configured commit interval
   and a genesis file with short governance periods and the configured
   downtime window, followed by `modify_genesis` for per-test changes.
   Once the chain runs, the validator records are resolved, a relayer
   wallet is funded, and its key is handed to the relayer.
*/
pub fn bootstrap_provider_chain(
    config: &TestConfig,
    provisioner: &dyn ChainProvisioner,
    relayer: &dyn RelayerDriver,
    modify_genesis: &dyn Fn(&mut serde_json::Value) -> Result<(), Error>,
) -> Result<Arc<ChainHandle>, Error> {
    let family = ChainFamily::Provider;

    let spec = ChainSpec {
        chain_id: ChainId::new(PROVIDER_CHAIN_ID),
        family,
        command: family.command(config),
        version: String::new(),
        denom: config.denom.clone(),
        validator_count: config.validator_count,
        commit_interval: config.commit_interval,
    };

    let params = GenesisParams::from_config(config, &config.denom);
    let commit_interval = config.commit_interval;

    let driver = provisioner.provision(
        &spec,
        Box::new(move |driver: &dyn ChainDriver| {
            for node in 0..driver.node_count() {
                update_node_config(driver, node, |node_config| {
                    set_timeout_commit(node_config, commit_interval)
                })?;

                update_genesis_file(driver, node, |genesis| {
                    family.patch_genesis(genesis, &params)?;
                    modify_genesis(genesis)
                })?;
            }

            Ok(())
        }),
    )?;

    let provider = ChainHandle::build(
        driver,
        family,
        &config.denom,
        config.commit_interval,
        &config.validator_key_name,
    )?;

    relayer.restore_key(&provider.chain_id, &provider.relayer_wallet)?;

    info!(
        "bootstrapped provider chain {} with {} validators",
        provider.chain_id,
        provider.validators.len()
    );

    Ok(Arc::new(provider))
}
