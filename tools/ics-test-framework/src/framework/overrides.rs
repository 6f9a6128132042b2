/*!
   Constructs for implementing overrides for test cases.
*/

use alloc::sync::Arc;

use crate::error::Error;
use crate::framework::base::{ClockOverride, HasOverrides, TestConfigOverride, TestContext};
use crate::framework::ics::{
    simulated_network, NetworkBackend, NetworkOverride, ProviderGenesisOverride,
};
use crate::types::config::TestConfig;
use crate::util::clock::{Clock, MockClock};

/**
   This trait should be implemented for all test cases to allow overriding
   some parts of the behavior during the test setup.

   Since all methods in this trait have default implementation, test cases
   that do not need any override can have an empty implementation body for
   this trait.
*/
pub trait TestOverrides {
    /**
       Override the test config after it is loaded from the environment,
       e.g. to use a shorter commit interval or a different number of
       validators.
    */
    fn modify_test_config(&self, _config: &mut TestConfig) {}

    /**
       Modify the genesis file of every provider node before the provider
       starts. Runs after the default patches of the provider family.
    */
    fn modify_provider_genesis(&self, _genesis: &mut serde_json::Value) -> Result<(), Error> {
        Ok(())
    }

    /**
       The clock the test runs on. Defaults to a virtual clock, so that
       waiting for blocks of the simulated network does not take real time.
    */
    fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(MockClock::default())
    }

    /**
       The chain provisioner and relayer backend of the test. Defaults to
       the simulated network driven by the clock of the test.
    */
    fn network(&self, ctx: &TestContext) -> Result<NetworkBackend, Error> {
        Ok(simulated_network(ctx))
    }
}

impl<Test: TestOverrides> HasOverrides for Test {
    type Overrides = Self;

    fn get_overrides(&self) -> &Self {
        self
    }
}

impl<Test: TestOverrides> TestConfigOverride for Test {
    fn modify_test_config(&self, config: &mut TestConfig) {
        TestOverrides::modify_test_config(self, config)
    }
}

impl<Test: TestOverrides> ClockOverride for Test {
    fn clock(&self) -> Arc<dyn Clock> {
        TestOverrides::clock(self)
    }
}

impl<Test: TestOverrides> ProviderGenesisOverride for Test {
    fn modify_provider_genesis(&self, genesis: &mut serde_json::Value) -> Result<(), Error> {
        TestOverrides::modify_provider_genesis(self, genesis)
    }
}

impl<Test: TestOverrides> NetworkOverride for Test {
    fn network(&self, ctx: &TestContext) -> Result<NetworkBackend, Error> {
        TestOverrides::network(self, ctx)
    }
}
