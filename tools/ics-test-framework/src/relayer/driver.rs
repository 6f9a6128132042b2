/*!
   The interface to the relayer process.
*/

use core::fmt::{self, Display};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::id::{ChainId, TRANSFER_PORT};
use crate::types::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordering {
    Ordered,
    Unordered,
}

impl Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordered => write!(f, "ordered"),
            Self::Unordered => write!(f, "unordered"),
        }
    }
}

/**
   A named pair of chains the relayer relays between, together with the
   clients each side uses to track the other once they are known.
*/
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerPath {
    pub name: String,
    pub chain_a: ChainId,
    pub chain_b: ChainId,
    pub client_a: Option<String>,
    pub client_b: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub counterparty_chain_id: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub port_id: String,
    pub counterparty_chain_id: ChainId,
    pub counterparty_channel_id: String,
    pub counterparty_port_id: String,
    pub ordering: Ordering,
    pub version: String,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    pub src_port: String,
    pub dst_port: String,
    pub ordering: Ordering,
    pub version: String,
}

/**
   Controls the relayer process shared by all chains of a test run.

   Path operations refer to a path by the name it was created with.
   Channel creation opens the channel from `chain_a` (source) to
   `chain_b` (destination) of the path.
*/
pub trait RelayerDriver: Send + Sync {
    /// Import the wallet the relayer signs with on the given chain.
    fn restore_key(&self, chain_id: &ChainId, wallet: &Wallet) -> Result<(), Error>;

    fn start(&self) -> Result<(), Error>;

    fn stop(&self) -> Result<(), Error>;

    fn paths(&self) -> Result<Vec<RelayerPath>, Error>;

    fn create_path(&self, name: &str, chain_a: &ChainId, chain_b: &ChainId) -> Result<(), Error>;

    /// Make an existing path use the given existing clients.
    fn update_path(&self, name: &str, client_a: &str, client_b: &str) -> Result<(), Error>;

    fn clients(&self, chain_id: &ChainId) -> Result<Vec<ClientInfo>, Error>;

    fn create_connection(&self, path: &str) -> Result<(), Error>;

    fn create_channel(&self, path: &str, options: &ChannelOptions) -> Result<(), Error>;

    /// The channels on `chain_id` whose counterparty is `counterparty`.
    fn channels(&self, chain_id: &ChainId, counterparty: &ChainId)
        -> Result<Vec<ChannelInfo>, Error>;

    /// Relay any pending packets on the given channel end.
    fn clear_packets(&self, chain_id: &ChainId, port_id: &str, channel_id: &str)
        -> Result<(), Error>;

    fn find_path(&self, name: &str) -> Result<Option<RelayerPath>, Error> {
        Ok(self.paths()?.into_iter().find(|path| path.name == name))
    }

    /**
       Find the client on `chain_id` that tracks `counterparty`.
    */
    fn find_client(&self, chain_id: &ChainId, counterparty: &ChainId) -> Result<ClientInfo, Error> {
        self.clients(chain_id)?
            .into_iter()
            .find(|client| &client.counterparty_chain_id == counterparty)
            .ok_or_else(|| Error::client_not_found(chain_id.to_string(), counterparty.to_string()))
    }

    /**
       Find the open channel on `chain_id` towards `counterparty` that is
       bound to `port_id`.
    */
    fn find_channel(
        &self,
        chain_id: &ChainId,
        counterparty: &ChainId,
        port_id: &str,
    ) -> Result<ChannelInfo, Error> {
        self.channels(chain_id, counterparty)?
            .into_iter()
            .find(|channel| channel.open && channel.port_id == port_id)
            .ok_or_else(|| {
                Error::channel_not_found(
                    chain_id.to_string(),
                    counterparty.to_string(),
                    port_id.to_string(),
                )
            })
    }

    /// The open ICS-20 transfer channel between two chains, if any.
    fn transfer_channel(
        &self,
        chain_id: &ChainId,
        counterparty: &ChainId,
    ) -> Result<Option<ChannelInfo>, Error> {
        Ok(self
            .channels(chain_id, counterparty)?
            .into_iter()
            .find(|channel| channel.open && channel.port_id == TRANSFER_PORT))
    }
}
