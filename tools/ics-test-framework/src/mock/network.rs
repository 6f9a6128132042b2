/*!
   An in-memory network of simulated chains sharing one virtual clock.

   [`MockNetwork`] hands out the two collaborators the framework needs:
   a [`MockProvisioner`] that creates chains, and a
   [`MockRelayer`](crate::mock::relayer::MockRelayer) that links them.
*/

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use eyre::eyre;
use std::sync::Mutex;
use tracing::info;

use crate::chain::driver::{ChainDriver, ChainProvisioner, ChainSpec, PreGenesisHook};
use crate::error::Error;
use crate::mock::chain::MockChain;
use crate::mock::relayer::MockRelayer;
use crate::types::id::ChainId;
use crate::util::clock::{Clock, Deadline};
use crate::util::mutex::MutexUtil;
use crate::util::retry::assert_eventually;

/// Bound on the wait for the first block of a new chain, in commit intervals.
pub const FIRST_BLOCK_WAIT_INTERVALS: u32 = 30;

pub struct NetworkState {
    pub clock: Arc<dyn Clock>,
    pub validator_key_name: String,
    chains: Mutex<BTreeMap<ChainId, Arc<MockChain>>>,
}

impl NetworkState {
    pub fn chain(&self, chain_id: &ChainId) -> Result<Arc<MockChain>, Error> {
        self.chains
            .acquire_mutex()?
            .get(chain_id)
            .cloned()
            .ok_or_else(|| Error::generic(eyre!("chain {} is not part of the network", chain_id)))
    }

    pub fn contains(&self, chain_id: &ChainId) -> Result<bool, Error> {
        Ok(self.chains.acquire_mutex()?.contains_key(chain_id))
    }
}

#[derive(Clone)]
pub struct MockNetwork {
    state: Arc<NetworkState>,
}

impl MockNetwork {
    pub fn new(clock: Arc<dyn Clock>, validator_key_name: &str) -> Self {
        Self {
            state: Arc::new(NetworkState {
                clock,
                validator_key_name: validator_key_name.to_string(),
                chains: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn provisioner(&self) -> MockProvisioner {
        MockProvisioner {
            network: self.state.clone(),
        }
    }

    /// The relayer of the network, standing in for the `command` binary.
    pub fn relayer(&self, command: &str) -> MockRelayer {
        MockRelayer::new(self.state.clone(), command)
    }

    pub fn chain(&self, chain_id: &ChainId) -> Result<Arc<MockChain>, Error> {
        self.state.chain(chain_id)
    }
}

pub struct MockProvisioner {
    network: Arc<NetworkState>,
}

impl ChainProvisioner for MockProvisioner {
    fn provision(
        &self,
        spec: &ChainSpec,
        hook: PreGenesisHook<'_>,
    ) -> Result<Arc<dyn ChainDriver>, Error> {
        if self.network.contains(&spec.chain_id)? {
            return Err(Error::config(format!(
                "chain {} is already provisioned",
                spec.chain_id
            )));
        }

        let chain = Arc::new(MockChain::init(
            spec,
            self.network.clock.clone(),
            &self.network.validator_key_name,
        )?);

        hook(chain.as_ref())?;

        chain.start_all_nodes()?;

        let commit_interval = chain.commit_interval()?;

        assert_eventually(
            &format!("first block of chain {}", spec.chain_id),
            &Deadline::after(
                &self.network.clock,
                commit_interval * FIRST_BLOCK_WAIT_INTERVALS,
            ),
            commit_interval,
            || Ok((chain.height()? >= 1).then_some(())),
        )?;

        self.network
            .chains
            .acquire_mutex()?
            .insert(spec.chain_id.clone(), chain.clone());

        info!(
            "provisioned chain {} with {} validators",
            spec.chain_id, spec.validator_count
        );

        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::time::Duration;

    use crate::chain::chain_type::ChainFamily;
    use crate::util::clock::MockClock;
    use test_log::test;

    fn spec(chain_id: &str) -> ChainSpec {
        ChainSpec {
            chain_id: ChainId::new(chain_id),
            family: ChainFamily::Provider,
            command: "interchain-security-pd".to_string(),
            version: String::new(),
            denom: "stake".to_string(),
            validator_count: 2,
            commit_interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn provision_runs_hook_before_start() {
        let network = MockNetwork::new(Arc::new(MockClock::default()), "validator");
        let provisioner = network.provisioner();

        let chain = provisioner
            .provision(
                &spec("provider"),
                Box::new(|driver: &dyn ChainDriver| {
                    // the chain has not started while the hook runs
                    assert!(driver.height().is_err());
                    Ok(())
                }),
            )
            .unwrap();

        assert!(chain.height().unwrap() >= 1);
        assert!(network.chain(&ChainId::new("provider")).is_ok());

        assert!(provisioner
            .provision(&spec("provider"), Box::new(|_: &dyn ChainDriver| Ok(())))
            .is_err());
    }

    #[test]
    fn failing_hook_leaves_no_chain() {
        let network = MockNetwork::new(Arc::new(MockClock::default()), "validator");

        let res = network.provisioner().provision(
            &spec("provider"),
            Box::new(|_: &dyn ChainDriver| Err(Error::config("broken genesis".to_string()))),
        );

        assert!(res.is_err());
        assert!(network.chain(&ChainId::new("provider")).is_err());
    }
}
