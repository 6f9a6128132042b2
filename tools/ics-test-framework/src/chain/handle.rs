/*!
   Typed reference to one running chain.
*/

use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::chain::chain_type::ChainFamily;
use crate::chain::driver::ChainDriver;
use crate::error::Error;
use crate::types::id::ChainId;
use crate::types::token::Token;
use crate::types::validator::Validator;
use crate::types::wallet::Wallet;
use crate::util::clock::Deadline;
use crate::util::fan_out::try_join_all;
use crate::util::retry::assert_eventually;

/// Key name of the wallet the relayer signs with on every chain.
pub const RELAYER_KEY_NAME: &str = "relayer";

/// Amount sent to the relayer wallet when a chain handle is built.
pub const RELAYER_FUNDS: u128 = 100_000_000_000;

/**
   A running chain, with its validators resolved.

   The validator at index `i` of [`validators`](ChainHandle::validators)
   runs on node `i` of the [`driver`](ChainHandle::driver). The handle is
   immutable once built, except for the list of consumer chains linked to
   it, which only grows.
*/
pub struct ChainHandle {
    pub chain_id: ChainId,

    pub family: ChainFamily,

    pub denom: String,

    pub commit_interval: Duration,

    /// The keyring name of each node's validator key.
    pub validator_key_name: String,

    pub validators: Vec<Validator>,

    /// A funded wallet on node 0 used by the relayer.
    pub relayer_wallet: Wallet,

    pub driver: Arc<dyn ChainDriver>,

    consumers: RwLock<Vec<Arc<ChainHandle>>>,
}

impl ChainHandle {
    /**
       Resolve the validator records of every node concurrently, then
       create and fund the relayer wallet. Either everything succeeds or
       no handle is returned.
    */
    pub fn build(
        driver: Arc<dyn ChainDriver>,
        family: ChainFamily,
        denom: &str,
        commit_interval: Duration,
        validator_key_name: &str,
    ) -> Result<Self, Error> {
        let chain_id = driver.chain_id().clone();
        let nodes: Vec<usize> = (0..driver.node_count()).collect();

        let validators = try_join_all(&nodes, |_, node| {
            resolve_validator(driver.as_ref(), *node, validator_key_name)
        })?;

        debug!(
            "resolved {} validators on chain {}",
            validators.len(),
            chain_id
        );

        let relayer_wallet = driver.create_wallet(0, RELAYER_KEY_NAME)?;

        driver
            .exec_tx(
                0,
                validator_key_name,
                &[
                    "tx",
                    "bank",
                    "send",
                    validator_key_name,
                    &relayer_wallet.address.0,
                    &Token::new(RELAYER_FUNDS, denom).to_string(),
                ],
            )?
            .check(&chain_id)?;

        info!(
            "chain {} is ready with {} validators, relayer wallet {}",
            chain_id,
            validators.len(),
            relayer_wallet.address
        );

        Ok(Self {
            chain_id,
            family,
            denom: denom.to_string(),
            commit_interval,
            validator_key_name: validator_key_name.to_string(),
            validators,
            relayer_wallet,
            driver,
            consumers: RwLock::new(Vec::new()),
        })
    }

    /**
       Replace the wallets of the validator records, e.g. with the provider
       validator keys recovered on a consumer chain. Expects one wallet per
       validator, in node order.
    */
    pub fn with_validator_wallets(mut self, wallets: Vec<Wallet>) -> Result<Self, Error> {
        if wallets.len() != self.validators.len() {
            return Err(Error::assertion(format!(
                "expected {} validator wallets for chain {}, got {}",
                self.validators.len(),
                self.chain_id,
                wallets.len()
            )));
        }

        for (validator, wallet) in self.validators.iter_mut().zip(wallets) {
            validator.wallet = wallet;
        }

        Ok(self)
    }

    pub fn driver(&self) -> &dyn ChainDriver {
        self.driver.as_ref()
    }

    pub fn validator(&self, index: usize) -> Result<&Validator, Error> {
        self.validators.get(index).ok_or_else(|| {
            Error::node_index(self.chain_id.to_string(), index, self.validators.len())
        })
    }

    pub fn height(&self) -> Result<u64, Error> {
        self.driver.height()
    }

    pub fn token(&self, amount: u128) -> Token {
        Token::new(amount, self.denom.clone())
    }

    /**
       Wait until the chain has produced `blocks` more blocks, checking once
       per commit interval. Returns the height reached.
    */
    pub fn wait_for_blocks(&self, deadline: &Deadline, blocks: u64) -> Result<u64, Error> {
        let target = self.height()? + blocks;

        assert_eventually(
            &format!("chain {} to reach height {}", self.chain_id, target),
            deadline,
            self.commit_interval,
            || {
                let height = self.height()?;
                Ok((height >= target).then_some(height))
            },
        )
    }

    pub fn add_consumer(&self, consumer: Arc<ChainHandle>) {
        self.consumers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(consumer);
    }

    pub fn consumers(&self) -> Vec<Arc<ChainHandle>> {
        self.consumers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainHandle")
            .field("chain_id", &self.chain_id)
            .field("family", &self.family)
            .field("validators", &self.validators)
            .field("consumers", &self.consumer_count())
            .finish_non_exhaustive()
    }
}

fn resolve_validator(
    driver: &dyn ChainDriver,
    node: usize,
    validator_key_name: &str,
) -> Result<Validator, Error> {
    Ok(Validator {
        moniker: driver.moniker(node)?,
        wallet: driver.wallet(node, validator_key_name)?,
        operator_address: driver.operator_address(node, validator_key_name)?,
        consensus_address: driver.consensus_address(node)?,
    })
}
