/*!
   Identifier types used across the framework.
*/

use core::fmt::{self, Display};
use serde::{Deserialize, Serialize};

/**
   The identifier of a chain, e.g. `provider` or `consumer-1`.
*/
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Port bound by the consumer side of the cross-chain validation channel.
pub const CONSUMER_PORT: &str = "consumer";

/// Port bound by the provider side of the cross-chain validation channel.
pub const PROVIDER_PORT: &str = "provider";

/// Port of the ICS-20 token transfer application.
pub const TRANSFER_PORT: &str = "transfer";
