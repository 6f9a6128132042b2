/*!
   Governance proposal types.
*/

use core::fmt::{self, Display};
use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::Error;
use crate::types::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[serde(rename = "PROPOSAL_STATUS_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "PROPOSAL_STATUS_DEPOSIT_PERIOD")]
    DepositPeriod,
    #[serde(rename = "PROPOSAL_STATUS_VOTING_PERIOD")]
    VotingPeriod,
    #[serde(rename = "PROPOSAL_STATUS_PASSED")]
    Passed,
    #[serde(rename = "PROPOSAL_STATUS_REJECTED")]
    Rejected,
    #[serde(rename = "PROPOSAL_STATUS_FAILED")]
    Failed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "PROPOSAL_STATUS_UNSPECIFIED",
            Self::DepositPeriod => "PROPOSAL_STATUS_DEPOSIT_PERIOD",
            Self::VotingPeriod => "PROPOSAL_STATUS_VOTING_PERIOD",
            Self::Passed => "PROPOSAL_STATUS_PASSED",
            Self::Rejected => "PROPOSAL_STATUS_REJECTED",
            Self::Failed => "PROPOSAL_STATUS_FAILED",
        }
    }

    /// Whether the proposal can no longer change status.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Passed | Self::Rejected | Self::Failed)
    }
}

impl Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| Error::missing_json_field(format!("proposal status `{s}`")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOption {
    Yes,
    No,
    Abstain,
    NoWithVeto,
}

impl Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
            Self::Abstain => write!(f, "abstain"),
            Self::NoWithVeto => write!(f, "no_with_veto"),
        }
    }
}

/**
   A governance proposal file, as accepted by `tx gov submit-proposal`.
*/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalFile<Message> {
    pub messages: Vec<Message>,
    pub metadata: String,
    pub deposit: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub expedited: bool,
}

impl<Message> ProposalFile<Message> {
    pub fn new(message: Message, title: &str, deposit: &Token) -> Self {
        Self {
            messages: vec![message],
            metadata: "ipfs://CID".to_string(),
            deposit: deposit.to_string(),
            title: title.to_string(),
            summary: title.to_string(),
            expedited: false,
        }
    }
}

/**
   The plan of a software upgrade, embedded in `MsgSoftwareUpgrade`.
*/
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePlan {
    pub name: String,
    #[serde(with = "string_u64")]
    pub height: u64,
    pub info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgSoftwareUpgrade {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub authority: String,
    pub plan: UpgradePlan,
}

pub const MSG_SOFTWARE_UPGRADE_TYPE_URL: &str = "/cosmos.upgrade.v1beta1.MsgSoftwareUpgrade";

pub const MSG_CONSUMER_ADDITION_TYPE_URL: &str =
    "/interchain_security.ccv.provider.v1.MsgConsumerAddition";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialHeight {
    #[serde(with = "string_u64")]
    pub revision_number: u64,
    #[serde(with = "string_u64")]
    pub revision_height: u64,
}

/**
   Governance message that registers a new consumer chain on the provider.
   The provider starts validating the consumer at `spawn_time`, if the
   proposal has passed by then.
*/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgConsumerAddition {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub chain_id: String,
    pub initial_height: InitialHeight,
    pub genesis_hash: String,
    pub binary_hash: String,
    #[serde(with = "rfc3339")]
    pub spawn_time: SystemTime,
    #[serde(with = "string_secs")]
    pub unbonding_period: Duration,
    #[serde(with = "string_secs")]
    pub ccv_timeout_period: Duration,
    #[serde(with = "string_secs")]
    pub transfer_timeout_period: Duration,
    pub consumer_redistribution_fraction: String,
    #[serde(with = "string_u64")]
    pub blocks_per_distribution_transmission: u64,
    #[serde(with = "string_u64")]
    pub historical_entries: u64,
    pub distribution_transmission_channel: String,
    #[serde(rename = "top_N")]
    pub top_n: u32,
    pub validators_power_cap: u32,
    pub validator_set_cap: u32,
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    pub authority: String,
}

pub(crate) mod string_secs {
    use core::time::Duration;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}s", value.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

pub(crate) mod rfc3339 {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(value: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_rfc3339_seconds(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_rfc3339(&raw).map_err(D::Error::custom)
    }
}

pub(crate) mod string_u64 {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_cli_names() {
        let status: ProposalStatus = "PROPOSAL_STATUS_VOTING_PERIOD".parse().unwrap();

        assert_eq!(status, ProposalStatus::VotingPeriod);
        assert!(!status.is_final());
        assert!(ProposalStatus::Rejected.is_final());
        assert!("VOTING".parse::<ProposalStatus>().is_err());
    }

    #[test]
    fn upgrade_plan_height_is_a_string() {
        let plan = UpgradePlan {
            name: "v2".to_string(),
            height: 120,
            info: String::new(),
        };

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["height"], "120");
    }

    #[test]
    fn consumer_addition_uses_cli_encodings() {
        let json = serde_json::json!({
            "@type": MSG_CONSUMER_ADDITION_TYPE_URL,
            "chain_id": "consumer-1",
            "initial_height": { "revision_number": "0", "revision_height": "1" },
            "genesis_hash": "",
            "binary_hash": "",
            "spawn_time": "2023-11-14T22:15:00Z",
            "unbonding_period": "1728000s",
            "ccv_timeout_period": "2419200s",
            "transfer_timeout_period": "3600s",
            "consumer_redistribution_fraction": "0.75",
            "blocks_per_distribution_transmission": "1000",
            "historical_entries": "10000",
            "distribution_transmission_channel": "",
            "top_N": 100,
            "validators_power_cap": 0,
            "validator_set_cap": 0,
            "allowlist": [],
            "denylist": [],
            "authority": "cosmos10d07y265gmmuvt4z0w9aw880jnsr700j6zn9kn",
        });

        let msg: MsgConsumerAddition = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(msg.top_n, 100);
        assert_eq!(msg.unbonding_period, Duration::from_secs(1_728_000));
        assert_eq!(serde_json::to_value(&msg).unwrap(), json);
    }
}
