/*!
   A relayer for the simulated network.

   It keeps the paths and keys a relayer configuration would hold, opens
   connections and channels by writing both channel ends, and relays
   cross-chain validation slash packets when asked to clear a channel.
   The state of one chain is never locked while another chain is locked.
*/

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use eyre::eyre;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::Error;
use crate::mock::network::NetworkState;
use crate::relayer::driver::{
    ChannelInfo, ChannelOptions, ClientInfo, Ordering, RelayerDriver, RelayerPath,
};
use crate::types::id::{ChainId, CONSUMER_PORT, PROVIDER_PORT, TRANSFER_PORT};
use crate::types::wallet::Wallet;
use crate::util::mutex::MutexUtil;

/// Version of the ICS-20 transfer channel.
pub const TRANSFER_CHANNEL_VERSION: &str = "ics20-1";

/// Commit intervals of the consumer before its transfer channel handshake completes.
pub const TRANSFER_HANDSHAKE_INTERVALS: u32 = 2;

#[derive(Default)]
struct RelayerState {
    running: bool,
    keys: BTreeMap<ChainId, Wallet>,
    paths: Vec<RelayerPath>,
    connected_paths: BTreeSet<String>,
}

pub struct MockRelayer {
    network: Arc<NetworkState>,
    command: String,
    state: Mutex<RelayerState>,
}

impl MockRelayer {
    /// A relayer over `network`, named after the binary it stands in for.
    pub fn new(network: Arc<NetworkState>, command: &str) -> Self {
        Self {
            network,
            command: command.to_string(),
            state: Mutex::new(RelayerState::default()),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn require_running(&self) -> Result<(), Error> {
        if self.state.acquire_mutex()?.running {
            Ok(())
        } else {
            Err(Error::generic(eyre!(
                "relayer `{}` is not running",
                self.command
            )))
        }
    }

    fn path(&self, name: &str) -> Result<RelayerPath, Error> {
        self.state
            .acquire_mutex()?
            .paths
            .iter()
            .find(|path| path.name == name)
            .cloned()
            .ok_or_else(|| Error::generic(eyre!("relayer path {} does not exist", name)))
    }

    fn require_key(&self, chain_id: &ChainId) -> Result<(), Error> {
        if self.state.acquire_mutex()?.keys.contains_key(chain_id) {
            Ok(())
        } else {
            Err(Error::generic(eyre!(
                "the relayer has no key for chain {}",
                chain_id
            )))
        }
    }

    /**
       Open one channel between the two chains: write the channel end on
       `chain_a`, then on `chain_b`, then complete the counterparty of the
       first end. Returns the two channel ids.
    */
    fn open_channel(
        &self,
        chain_a: &ChainId,
        chain_b: &ChainId,
        options: &ChannelOptions,
        open_after: std::time::SystemTime,
    ) -> Result<(String, String), Error> {
        let end_a = self.network.chain(chain_a)?;
        let end_b = self.network.chain(chain_b)?;

        let channel_a = end_a.add_channel_end(
            ChannelInfo {
                channel_id: String::new(),
                port_id: options.src_port.clone(),
                counterparty_chain_id: chain_b.clone(),
                counterparty_channel_id: String::new(),
                counterparty_port_id: options.dst_port.clone(),
                ordering: options.ordering,
                version: options.version.clone(),
                open: false,
            },
            open_after,
        )?;

        let channel_b = end_b.add_channel_end(
            ChannelInfo {
                channel_id: String::new(),
                port_id: options.dst_port.clone(),
                counterparty_chain_id: chain_a.clone(),
                counterparty_channel_id: channel_a.clone(),
                counterparty_port_id: options.src_port.clone(),
                ordering: options.ordering,
                version: options.version.clone(),
                open: false,
            },
            open_after,
        )?;

        end_a.set_counterparty_channel(&channel_a, &channel_b)?;

        debug!(
            "opened channel {}/{} on {} to {}/{} on {}",
            options.src_port, channel_a, chain_a, options.dst_port, channel_b, chain_b
        );

        Ok((channel_a, channel_b))
    }
}

impl RelayerDriver for MockRelayer {
    fn restore_key(&self, chain_id: &ChainId, wallet: &Wallet) -> Result<(), Error> {
        self.network.chain(chain_id)?;

        self.state
            .acquire_mutex()?
            .keys
            .insert(chain_id.clone(), wallet.clone());

        Ok(())
    }

    fn start(&self) -> Result<(), Error> {
        self.state.acquire_mutex()?.running = true;
        info!("relayer `{}` started", self.command);
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.state.acquire_mutex()?.running = false;
        info!("relayer `{}` stopped", self.command);
        Ok(())
    }

    fn paths(&self) -> Result<Vec<RelayerPath>, Error> {
        Ok(self.state.acquire_mutex()?.paths.clone())
    }

    fn create_path(&self, name: &str, chain_a: &ChainId, chain_b: &ChainId) -> Result<(), Error> {
        self.network.chain(chain_a)?;
        self.network.chain(chain_b)?;

        let mut state = self.state.acquire_mutex()?;

        if state.paths.iter().any(|path| path.name == name) {
            return Err(Error::generic(eyre!("relayer path {} already exists", name)));
        }

        state.paths.push(RelayerPath {
            name: name.to_string(),
            chain_a: chain_a.clone(),
            chain_b: chain_b.clone(),
            client_a: None,
            client_b: None,
        });

        Ok(())
    }

    fn update_path(&self, name: &str, client_a: &str, client_b: &str) -> Result<(), Error> {
        let mut state = self.state.acquire_mutex()?;

        let path = state
            .paths
            .iter_mut()
            .find(|path| path.name == name)
            .ok_or_else(|| eyre!("relayer path {} does not exist", name))?;

        path.client_a = Some(client_a.to_string());
        path.client_b = Some(client_b.to_string());

        Ok(())
    }

    fn clients(&self, chain_id: &ChainId) -> Result<Vec<ClientInfo>, Error> {
        self.network.chain(chain_id)?.clients()
    }

    fn create_connection(&self, path: &str) -> Result<(), Error> {
        self.require_running()?;

        let path = self.path(path)?;

        if path.client_a.is_none() || path.client_b.is_none() {
            return Err(Error::generic(eyre!(
                "relayer path {} has no clients configured",
                path.name
            )));
        }

        self.require_key(&path.chain_a)?;
        self.require_key(&path.chain_b)?;

        let connection_a = self.network.chain(&path.chain_a)?.open_connection()?;
        let connection_b = self.network.chain(&path.chain_b)?.open_connection()?;

        self.state
            .acquire_mutex()?
            .connected_paths
            .insert(path.name.clone());

        info!(
            "created connection {} on {} and {} on {}",
            connection_a, path.chain_a, connection_b, path.chain_b
        );

        Ok(())
    }

    fn create_channel(&self, path: &str, options: &ChannelOptions) -> Result<(), Error> {
        self.require_running()?;

        let path = self.path(path)?;

        if !self.state.acquire_mutex()?.connected_paths.contains(&path.name) {
            return Err(Error::generic(eyre!(
                "relayer path {} has no connection",
                path.name
            )));
        }

        let now = self.network.clock.now();

        let (channel_a, channel_b) = self.open_channel(&path.chain_a, &path.chain_b, options, now)?;

        info!(
            "created channel {} on {} and {} on {} over path {}",
            channel_a, path.chain_a, channel_b, path.chain_b, path.name
        );

        // Once the cross-chain validation channel is open, the consumer
        // initiates the transfer channel to the provider.
        if options.src_port == CONSUMER_PORT && options.dst_port == PROVIDER_PORT {
            let commit_interval = self.network.chain(&path.chain_a)?.commit_interval()?;

            self.open_channel(
                &path.chain_a,
                &path.chain_b,
                &ChannelOptions {
                    src_port: TRANSFER_PORT.to_string(),
                    dst_port: TRANSFER_PORT.to_string(),
                    ordering: Ordering::Unordered,
                    version: TRANSFER_CHANNEL_VERSION.to_string(),
                },
                now + commit_interval * TRANSFER_HANDSHAKE_INTERVALS,
            )?;
        }

        Ok(())
    }

    fn channels(&self, chain_id: &ChainId, counterparty: &ChainId) -> Result<Vec<ChannelInfo>, Error> {
        self.network.chain(chain_id)?.channels(counterparty)
    }

    fn clear_packets(&self, chain_id: &ChainId, port_id: &str, channel_id: &str) -> Result<(), Error> {
        self.require_running()?;

        let source = self.network.chain(chain_id)?;

        let channel = source
            .channel(port_id, channel_id)?
            .ok_or_else(|| {
                eyre!(
                    "chain {} has no channel {} on port {}",
                    chain_id,
                    channel_id,
                    port_id
                )
            })?;

        if port_id != CONSUMER_PORT {
            debug!("no packets to clear on {}/{} of {}", port_id, channel_id, chain_id);
            return Ok(());
        }

        let slash_packets = source.take_slash_packets(port_id, channel_id)?;

        let destination = self.network.chain(&channel.counterparty_chain_id)?;

        for pub_key in &slash_packets {
            destination.receive_slash_packet(chain_id, pub_key)?;
        }

        info!(
            "relayed {} slash packets from {} to {}",
            slash_packets.len(),
            chain_id,
            channel.counterparty_chain_id
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::time::Duration;

    use crate::chain::chain_type::ChainFamily;
    use crate::chain::driver::{ChainDriver, ChainProvisioner, ChainSpec};
    use crate::error::ErrorDetail;
    use crate::mock::network::MockNetwork;
    use crate::util::clock::{Clock, MockClock};

    fn provision(network: &MockNetwork, chain_id: &str) -> Arc<dyn ChainDriver> {
        network
            .provisioner()
            .provision(
                &ChainSpec {
                    chain_id: ChainId::new(chain_id),
                    family: ChainFamily::Provider,
                    command: "interchain-security-pd".to_string(),
                    version: String::new(),
                    denom: "stake".to_string(),
                    validator_count: 1,
                    commit_interval: Duration::from_secs(1),
                },
                Box::new(|_: &dyn ChainDriver| Ok(())),
            )
            .unwrap()
    }

    #[test]
    fn channels_need_a_running_relayer_and_a_connection() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
        let network = MockNetwork::new(clock.clone(), "validator");
        let relayer = network.relayer("hermes");

        let chain_a = provision(&network, "chain-a");
        let chain_b = provision(&network, "chain-b");

        let wallet = chain_a.wallet(0, "validator").unwrap();
        relayer.restore_key(chain_a.chain_id(), &wallet).unwrap();
        relayer.restore_key(chain_b.chain_id(), &wallet).unwrap();

        relayer
            .create_path("a-b", chain_a.chain_id(), chain_b.chain_id())
            .unwrap();
        relayer
            .update_path("a-b", "07-tendermint-0", "07-tendermint-0")
            .unwrap();

        let options = ChannelOptions {
            src_port: TRANSFER_PORT.to_string(),
            dst_port: TRANSFER_PORT.to_string(),
            ordering: Ordering::Unordered,
            version: TRANSFER_CHANNEL_VERSION.to_string(),
        };

        assert!(relayer.create_connection("a-b").is_err());

        relayer.start().unwrap();
        assert!(relayer.create_channel("a-b", &options).is_err());

        relayer.create_connection("a-b").unwrap();
        relayer.create_channel("a-b", &options).unwrap();

        let channel = relayer
            .transfer_channel(chain_a.chain_id(), chain_b.chain_id())
            .unwrap()
            .unwrap();

        let counterparty = relayer
            .find_channel(chain_b.chain_id(), chain_a.chain_id(), TRANSFER_PORT)
            .unwrap();

        assert_eq!(channel.counterparty_channel_id, counterparty.channel_id);
        assert_eq!(counterparty.counterparty_channel_id, channel.channel_id);
    }

    #[test]
    fn stopped_relayer_names_its_command() {
        let network = MockNetwork::new(Arc::new(MockClock::default()), "validator");
        let relayer = network.relayer("rly");

        assert_eq!(relayer.command(), "rly");

        let provider = ChainId::new("provider");

        match relayer
            .clear_packets(&provider, CONSUMER_PORT, "channel-0")
            .unwrap_err()
            .detail()
        {
            ErrorDetail::Generic(e) => assert!(e.source.to_string().contains("`rly`")),
            other => panic!("unexpected error: {other:?}"),
        }

        relayer.start().unwrap();
        relayer.stop().unwrap();
        assert!(relayer
            .clear_packets(&provider, CONSUMER_PORT, "channel-0")
            .is_err());
    }
}
