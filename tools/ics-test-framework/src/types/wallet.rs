/*!
   Types for information about a chain wallet.
*/

use core::fmt::{self, Display};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress(pub String);

/**
   A key stored in a node's keyring.

   The mnemonic is kept so that the same key can be recovered into other
   keyrings, e.g. the relayer's or a consumer chain node's.
*/
#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub key_name: String,
    pub address: WalletAddress,
    pub mnemonic: String,
}

impl Wallet {
    pub fn new(key_name: String, address: String, mnemonic: String) -> Self {
        Self {
            key_name,
            address: WalletAddress(address),
            mnemonic,
        }
    }

    pub fn address(&self) -> &WalletAddress {
        &self.address
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("key_name", &self.key_name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
