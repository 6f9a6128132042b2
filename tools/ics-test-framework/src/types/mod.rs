/*!
   Definitions of data types used by the orchestration code.
*/

pub mod config;
pub mod consumer;
pub mod id;
pub mod proposal;
pub mod token;
pub mod tx;
pub mod validator;
pub mod wallet;
