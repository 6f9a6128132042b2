use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::util::json::get_field;

pub trait ChainStakingMethodsExt {
    /**
       Whether the validator with the given operator address is currently
       jailed. Fails if the chain does not know the validator.
    */
    fn query_jailed(&self, operator_address: &str) -> Result<bool, Error>;
}

impl ChainStakingMethodsExt for ChainHandle {
    fn query_jailed(&self, operator_address: &str) -> Result<bool, Error> {
        let output = self
            .driver
            .exec_query(&["query", "staking", "validator", operator_address])?;

        let validator = get_field(&output, "/validator")?;

        // Protobuf JSON omits fields holding their default value.
        Ok(validator
            .get("jailed")
            .and_then(|jailed| jailed.as_bool())
            .unwrap_or(false))
    }
}
