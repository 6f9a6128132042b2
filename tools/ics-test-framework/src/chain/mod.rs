/*!
   Constructs for interacting with the chains under test.

   A [`ChainHandle`](handle::ChainHandle) is the typed reference to one
   running chain that test cases work with. It wraps a
   [`ChainDriver`](driver::ChainDriver), which runs the actual commands
   against the chain's full nodes. Extension traits in [`ext`] add the
   higher-level operations built on top of those commands.
*/

pub mod chain_type;
pub mod config;
pub mod driver;
pub mod ext;
pub mod handle;
