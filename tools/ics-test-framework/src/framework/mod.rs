/*!
   Framework code for making it easier to write test cases.

   The test runners in [`base`] and [`ics`] take care of initializing the
   logger and the test configuration, bootstrapping the provider chain and
   the relayer, and tearing the run down afterwards. The verifiers in
   [`upgrade`] and [`downtime`] drive the chains through a lifecycle event
   and check its cross-chain effects.
*/

pub mod base;
pub mod downtime;
pub mod ics;
pub mod overrides;
pub mod upgrade;
