/*!
   An in-memory simulation of a provider/consumer network, used as the
   chain and relayer backend of the test framework.

   The simulation models what the orchestration code observes through
   the CLI: block production on a virtual clock, governance, software
   upgrades, consumer spawning with key assignment, downtime jailing and
   the relaying of slash packets. It does not model consensus or
   cryptography.
*/

pub mod ccv;
pub mod chain;
pub mod genesis;
pub mod gov;
pub mod ibc;
pub mod keys;
pub mod network;
pub mod relayer;
