/*!
   The IBC objects of a simulated chain: light clients, connections and
   channel ends.
*/

use std::time::SystemTime;

use crate::relayer::driver::{ChannelInfo, ClientInfo};
use crate::types::id::ChainId;

#[derive(Debug, Clone)]
pub struct MockChannelEnd {
    pub info: ChannelInfo,

    /// The handshake completes at this time.
    pub open_after: SystemTime,
}

#[derive(Debug, Default)]
pub struct IbcState {
    clients: Vec<ClientInfo>,
    connection_count: u64,
    channels: Vec<MockChannelEnd>,
}

impl IbcState {
    pub fn add_client(&mut self, counterparty: &ChainId) -> String {
        let client_id = format!("07-tendermint-{}", self.clients.len());

        self.clients.push(ClientInfo {
            client_id: client_id.clone(),
            counterparty_chain_id: counterparty.clone(),
        });

        client_id
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients.clone()
    }

    pub fn open_connection(&mut self) -> String {
        let connection_id = format!("connection-{}", self.connection_count);
        self.connection_count += 1;
        connection_id
    }

    /// Add a channel end and return the channel id assigned to it.
    pub fn add_channel(&mut self, mut info: ChannelInfo, open_after: SystemTime) -> String {
        let channel_id = format!("channel-{}", self.channels.len());

        info.channel_id = channel_id.clone();
        info.open = false;

        self.channels.push(MockChannelEnd { info, open_after });

        channel_id
    }

    pub fn set_counterparty_channel(&mut self, channel_id: &str, counterparty_channel_id: &str) {
        if let Some(end) = self
            .channels
            .iter_mut()
            .find(|end| end.info.channel_id == channel_id)
        {
            end.info.counterparty_channel_id = counterparty_channel_id.to_string();
        }
    }

    pub fn channel(&self, port_id: &str, channel_id: &str) -> Option<&MockChannelEnd> {
        self.channels
            .iter()
            .find(|end| end.info.port_id == port_id && end.info.channel_id == channel_id)
    }

    /// The channel ends towards `counterparty`, as seen at time `now`.
    pub fn channels(&self, counterparty: &ChainId, now: SystemTime) -> Vec<ChannelInfo> {
        self.channels
            .iter()
            .filter(|end| &end.info.counterparty_chain_id == counterparty)
            .map(|end| ChannelInfo {
                open: now >= end.open_after,
                ..end.info.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::time::Duration;

    use crate::relayer::driver::Ordering;

    #[test]
    fn channel_opens_after_handshake() {
        let mut ibc = IbcState::default();
        let provider = ChainId::new("provider");
        let start = SystemTime::UNIX_EPOCH;

        let channel_id = ibc.add_channel(
            ChannelInfo {
                channel_id: String::new(),
                port_id: "transfer".to_string(),
                counterparty_chain_id: provider.clone(),
                counterparty_channel_id: String::new(),
                counterparty_port_id: "transfer".to_string(),
                ordering: Ordering::Unordered,
                version: "ics20-1".to_string(),
                open: true,
            },
            start + Duration::from_secs(4),
        );

        ibc.set_counterparty_channel(&channel_id, "channel-7");

        let before = ibc.channels(&provider, start);
        assert_eq!(before.len(), 1);
        assert!(!before[0].open);

        let after = ibc.channels(&provider, start + Duration::from_secs(4));
        assert!(after[0].open);
        assert_eq!(after[0].counterparty_channel_id, "channel-7");

        assert!(ibc.channels(&ChainId::new("other"), start).is_empty());
        assert_eq!(ibc.add_client(&provider), "07-tendermint-0");
    }
}
