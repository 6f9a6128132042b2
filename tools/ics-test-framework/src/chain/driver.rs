/*!
   The interface to a running chain.

   A [`ChainDriver`] controls the full nodes of one chain, in the way a
   [WebDriver](https://developer.mozilla.org/en-US/docs/Web/WebDriver)
   controls a browser: it runs CLI commands against the nodes, reads and
   writes files in their home directories, and stops and starts them.
   How the node processes are actually run (local processes, containers,
   or the simulated network in [`mock`](crate::mock)) is up to the
   implementation.
*/

use alloc::sync::Arc;
use core::time::Duration;
use eyre::eyre;
use serde_json::Value;

use crate::chain::chain_type::ChainFamily;
use crate::error::Error;
use crate::types::id::ChainId;
use crate::types::tx::TxResult;
use crate::types::wallet::Wallet;
use crate::util::json::get_field;

pub trait ChainDriver: Send + Sync {
    fn chain_id(&self) -> &ChainId;

    fn node_count(&self) -> usize;

    fn moniker(&self, node: usize) -> Result<String, Error>;

    /// The latest committed block height, as seen by the first running node.
    fn height(&self) -> Result<u64, Error>;

    /**
       Sign and broadcast a transaction with the key `key_name` from the
       keyring of node `node`, and wait until it is included in a block.

       A transaction rejected by the chain is returned as a [`TxResult`]
       with a non-zero code. Use [`TxResult::check`] to turn it into an
       error.
    */
    fn exec_tx(&self, node: usize, key_name: &str, args: &[&str]) -> Result<TxResult, Error>;

    /// Run a query command and parse its JSON output.
    fn exec_query(&self, args: &[&str]) -> Result<Value, Error>;

    /// Run a raw command on one node, returning its standard output.
    fn exec_node(&self, node: usize, args: &[&str]) -> Result<String, Error>;

    /// Read a file relative to the home directory of a node.
    fn read_file(&self, node: usize, path: &str) -> Result<Vec<u8>, Error>;

    fn write_file(&self, node: usize, path: &str, content: &[u8]) -> Result<(), Error>;

    fn stop_all_nodes(&self) -> Result<(), Error>;

    fn start_all_nodes(&self) -> Result<(), Error>;

    fn stop_node(&self, node: usize) -> Result<(), Error>;

    fn start_node(&self, node: usize) -> Result<(), Error>;

    /// Replace the chain binary of every node. The nodes must be stopped.
    fn upgrade_binary(&self, version: &str) -> Result<(), Error>;

    /// Look up an existing key in the keyring of a node.
    fn wallet(&self, node: usize, key_name: &str) -> Result<Wallet, Error>;

    /// Create a new key with a fresh mnemonic in the keyring of a node.
    fn create_wallet(&self, node: usize, key_name: &str) -> Result<Wallet, Error>;

    /// Import a key from its mnemonic into the keyring of a node.
    fn recover_wallet(&self, node: usize, key_name: &str, mnemonic: &str) -> Result<Wallet, Error>;

    /// The validator operator address of the key `key_name` on node `node`.
    fn operator_address(&self, node: usize, key_name: &str) -> Result<String, Error>;

    /// The address derived from the consensus key of node `node`.
    fn consensus_address(&self, node: usize) -> Result<String, Error>;

    /**
       Run a query and return the JSON value at `pointer` in its output.
    */
    fn query_json(&self, pointer: &str, args: &[&str]) -> Result<Value, Error> {
        let output = self.exec_query(args)?;
        Ok(get_field(&output, pointer)?.clone())
    }

    fn read_json(&self, node: usize, path: &str) -> Result<Value, Error> {
        let content = self.read_file(node, path)?;
        let value = serde_json::from_slice(&content)
            .map_err(|e| eyre!("invalid json in {}: {}", path, e))?;

        Ok(value)
    }

    fn write_json(&self, node: usize, path: &str, value: &Value) -> Result<(), Error> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|e| eyre!("failed to encode {}: {}", path, e))?;
        self.write_file(node, path, &content)
    }
}

/**
   What a [`ChainProvisioner`] needs to know to create a new chain.
*/
#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub chain_id: ChainId,
    pub family: ChainFamily,
    pub command: String,
    pub version: String,
    pub denom: String,
    pub validator_count: usize,
    pub commit_interval: Duration,
}

/**
   A callback run after the nodes of a new chain are initialized, but
   before any of them is started. This is the only window in which the
   genesis file and the consensus keys can still be changed.
*/
pub type PreGenesisHook<'a> = Box<dyn FnOnce(&dyn ChainDriver) -> Result<(), Error> + 'a>;

pub trait ChainProvisioner: Send + Sync {
    /**
       Initialize the nodes of a new chain, run `hook`, then start all nodes
       and return once the chain has produced its first block.
    */
    fn provision(
        &self,
        spec: &ChainSpec,
        hook: PreGenesisHook<'_>,
    ) -> Result<Arc<dyn ChainDriver>, Error>;
}
