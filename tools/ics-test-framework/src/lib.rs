// #![deny(warnings)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![doc = include_str!("../README.md")]

//!
//! ## Overview
//!
//! This framework orchestrates interchain-security networks for integration
//! tests: a provider chain, the consumer chains it secures, and the relayer
//! that links them. It drives the chains through the lifecycle events that
//! matter for cross-chain validation and checks their effects.
//!
//! ## Example Test
//!
//! ```rust
//! use ics_test_framework::prelude::*;
//!
//! pub struct ExampleTest;
//!
//! #[test]
//! pub fn example_test() -> Result<(), Error> {
//!     run_interchain_security_test(&ExampleTest)
//! }
//!
//! impl TestOverrides for ExampleTest {}
//!
//! impl InterchainSecurityTest for ExampleTest {
//!     fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
//!         let consumer = network.onboard_consumer(
//!             ctx,
//!             &ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v1", vec![true; 4]),
//!         )?;
//!
//!         info!("consumer {} is running", consumer.chain_id);
//!
//!         Ok(())
//!     }
//! }
//! ```
//!
//! The `example_test` function only selects the kind of test to run.
//! [`run_interchain_security_test`](crate::framework::ics::run_interchain_security_test)
//! loads the [`TestConfig`](crate::types::config::TestConfig), installs the
//! logger, bootstraps the provider chain and starts the relayer before it
//! calls the `run` method of the test case. Behavior is customized by
//! overriding the methods of
//! [`TestOverrides`](crate::framework::overrides::TestOverrides) on the test
//! struct.
//!
//! ## Running Tests
//!
//! ```bash
//! RUST_LOG=info RUST_BACKTRACE=1 \
//!     cargo test -p ics-integration-test -- --test-threads=1 \
//!     consumer_onboarding
//! ```
//!
//! The environment variable `RUST_LOG` controls the log level. Set
//! `ICS_TEST_CONFIG` to the path of a TOML file to load the test
//! configuration from it, and `HANG_ON_FAIL=1` to suspend a failing test
//! instead of tearing it down.

extern crate alloc;

pub mod bootstrap;
pub mod chain;
pub mod error;
pub mod framework;
pub mod mock;
pub mod prelude;
pub mod relayer;
pub mod types;
pub mod util;
