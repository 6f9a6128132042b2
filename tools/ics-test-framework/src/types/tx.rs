/*!
   The result of broadcasting a transaction, in the JSON shape printed by
   Cosmos SDK CLIs with `--output json`.
*/

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::id::ChainId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(rename = "txhash", default)]
    pub tx_hash: String,

    #[serde(default)]
    pub code: u32,

    #[serde(default)]
    pub raw_log: String,

    #[serde(default)]
    pub events: Vec<TxEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub attributes: Vec<TxEventAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEventAttribute {
    pub key: String,
    pub value: String,
}

impl TxResult {
    /**
       Turn a transaction that was included with a non-zero code into
       [`Error::tx_failed`].
    */
    pub fn check(self, chain_id: &ChainId) -> Result<Self, Error> {
        if self.code == 0 {
            Ok(self)
        } else {
            Err(Error::tx_failed(
                chain_id.to_string(),
                self.code,
                self.raw_log,
            ))
        }
    }

    /// Find the first attribute `key` of an event of type `event`.
    pub fn attribute(&self, event: &str, key: &str) -> Result<&str, Error> {
        self.events
            .iter()
            .filter(|e| e.kind == event)
            .flat_map(|e| e.attributes.iter())
            .find(|attribute| attribute.key == key)
            .map(|attribute| attribute.value.as_str())
            .ok_or_else(|| Error::missing_event_attribute(event.to_string(), key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cli_output() {
        let output = r#"{
            "height": "12",
            "txhash": "8D5C3E",
            "code": 0,
            "raw_log": "",
            "events": [
                { "type": "message", "attributes": [{ "key": "action", "value": "submit" }] },
                { "type": "submit_proposal", "attributes": [{ "key": "proposal_id", "value": "3" }] }
            ]
        }"#;

        let result: TxResult = serde_json::from_str(output).unwrap();

        assert_eq!(result.tx_hash, "8D5C3E");
        assert_eq!(result.attribute("submit_proposal", "proposal_id").unwrap(), "3");
        assert!(result.attribute("submit_proposal", "voter").is_err());
    }

    #[test]
    fn non_zero_code_fails() {
        let result = TxResult {
            code: 5,
            raw_log: "insufficient funds".to_string(),
            ..Default::default()
        };

        assert!(result.check(&ChainId::from("provider")).is_err());
    }
}
