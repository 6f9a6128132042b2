/*!
   Constructs for driving the relayer that connects the chains of a test.

   The relayer is an external process. The framework only talks to it
   through the [`RelayerDriver`](driver::RelayerDriver) trait, so that
   tests can run against any relayer implementation, including the
   simulated one in [`mock`](crate::mock).
*/

pub mod driver;
