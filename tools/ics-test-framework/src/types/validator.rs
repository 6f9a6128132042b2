use crate::types::wallet::Wallet;

/**
   A validator of a chain, positionally aligned with the chain's node list:
   the validator at index `i` runs on node `i`.
*/
#[derive(Debug, Clone)]
pub struct Validator {
    pub moniker: String,

    /// The validator's account key, with its mnemonic.
    pub wallet: Wallet,

    /// Operator address, e.g. `cosmosvaloper1...`.
    pub operator_address: String,

    /**
       Address derived from the node's consensus key. Fetched once when the
       chain handle is built and never refreshed.
    */
    pub consensus_address: String,
}
