use core::fmt::{self, Display};
use core::str::FromStr;
use eyre::eyre;
use serde::{Deserialize, Serialize};

use crate::error::{handle_generic_error, Error};

/**
   An amount of a single denomination, displayed the way Cosmos SDK CLIs
   expect it, e.g. `10000000stake`.
*/
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub amount: u128,
    pub denom: String,
}

impl Token {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            amount,
            denom: denom.into(),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::generic(eyre!("token `{}` has no denomination", s)))?;

        let (amount, denom) = s.split_at(split);

        Ok(Self::new(
            amount.parse().map_err(handle_generic_error)?,
            denom,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let token: Token = "10000000stake".parse().unwrap();

        assert_eq!(token, Token::new(10_000_000, "stake"));
        assert_eq!(token.to_string(), "10000000stake");

        assert!("stake".parse::<Token>().is_err());
        assert!("100".parse::<Token>().is_err());
    }
}
