/*!
   Deterministic key material for the simulated network.

   Addresses are derived by hashing the mnemonic, so that recovering the
   same mnemonic on another chain yields the same key under that chain's
   account prefix. None of this is real cryptography.
*/

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::util::random::random_bytes;

const WORDS: [&str; 32] = [
    "abandon", "bamboo", "cactus", "dawn", "eagle", "fabric", "galaxy", "harbor", "icon",
    "jungle", "kettle", "ladder", "magnet", "napkin", "oasis", "pencil", "quantum", "rabbit",
    "saddle", "tackle", "umbrella", "valley", "walnut", "xenon", "yellow", "zebra", "anchor",
    "bridge", "candle", "desert", "ember", "forest",
];

pub const MNEMONIC_WORDS: usize = 24;

pub const PUB_KEY_TYPE: &str = "tendermint/PubKeyEd25519";
pub const PRIV_KEY_TYPE: &str = "tendermint/PrivKeyEd25519";

pub fn generate_mnemonic() -> String {
    random_bytes(MNEMONIC_WORDS)
        .into_iter()
        .map(|byte| WORDS[usize::from(byte) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn digest_hex(input: &[u8], len: usize) -> String {
    let digest = hex::encode(Sha256::digest(input));
    digest[..len.min(digest.len())].to_string()
}

pub fn account_address(prefix: &str, mnemonic: &str) -> String {
    format!("{}1{}", prefix, digest_hex(mnemonic.as_bytes(), 38))
}

pub fn operator_address(prefix: &str, mnemonic: &str) -> String {
    format!("{}valoper1{}", prefix, digest_hex(mnemonic.as_bytes(), 38))
}

pub fn module_address(prefix: &str, module: &str) -> String {
    format!("{}1{}", prefix, digest_hex(module.as_bytes(), 38))
}

/// Consensus address of a public key, e.g. `cosmosvalcons1...`.
pub fn consensus_address(prefix: &str, pub_key: &str) -> String {
    format!("{}valcons1{}", prefix, digest_hex(pub_key.as_bytes(), 40))
}

/**
   A fresh `priv_validator_key.json`, in the layout CometBFT writes.
*/
pub fn generate_priv_validator_key() -> Value {
    let pub_key = hex::encode(random_bytes(32));
    let priv_key = hex::encode(random_bytes(64));

    json!({
        "address": digest_hex(pub_key.as_bytes(), 40).to_uppercase(),
        "pub_key": {
            "type": PUB_KEY_TYPE,
            "value": pub_key,
        },
        "priv_key": {
            "type": PRIV_KEY_TYPE,
            "value": priv_key,
        },
    })
}

pub fn tx_hash(input: &str) -> String {
    digest_hex(input.as_bytes(), 64).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_mnemonic_same_key_under_any_prefix() {
        let mnemonic = generate_mnemonic();

        assert_eq!(mnemonic.split(' ').count(), MNEMONIC_WORDS);

        let provider = account_address("cosmos", &mnemonic);
        let consumer = account_address("consumer", &mnemonic);

        assert_eq!(
            provider.trim_start_matches("cosmos1"),
            consumer.trim_start_matches("consumer1")
        );
        assert_ne!(account_address("cosmos", &generate_mnemonic()), provider);
    }
}
