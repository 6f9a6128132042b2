/*!
   Test runner for interchain-security tests: a provider chain with a
   relayer, onto which the test case onboards consumer chains.
*/

use alloc::sync::Arc;

use crate::bootstrap::consumer::bootstrap_consumer_chain;
use crate::bootstrap::provider::bootstrap_provider_chain;
use crate::chain::driver::ChainProvisioner;
use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::framework::base::{
    run_basic_test, BasicTest, ClockOverride, HasOverrides, TestConfigOverride, TestContext,
};
use crate::mock::network::MockNetwork;
use crate::relayer::driver::RelayerDriver;
use crate::types::consumer::ConsumerConfig;

/**
   Runs a test case that implements [`InterchainSecurityTest`].
*/
pub fn run_interchain_security_test<Test, Overrides>(test: &Test) -> Result<(), Error>
where
    Test: InterchainSecurityTest,
    Test: HasOverrides<Overrides = Overrides>,
    Overrides: TestConfigOverride + ClockOverride + ProviderGenesisOverride + NetworkOverride,
{
    run_basic_test(&RunInterchainSecurityTest { test })
}

pub trait InterchainSecurityTest {
    /// Test runner
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error>;
}

/**
   An internal trait that can be implemented by test cases to modify the
   provider genesis before the provider starts.

   Test writers should implement
   [`TestOverrides`](crate::framework::overrides::TestOverrides)
   for their test cases instead of implementing this trait directly.
*/
pub trait ProviderGenesisOverride {
    fn modify_provider_genesis(&self, genesis: &mut serde_json::Value) -> Result<(), Error>;
}

/**
   An internal trait that can be implemented by test cases to choose the
   chain provisioner and the relayer backend the test runs against.

   Test writers should implement
   [`TestOverrides`](crate::framework::overrides::TestOverrides)
   for their test cases instead of implementing this trait directly.
*/
pub trait NetworkOverride {
    fn network(&self, ctx: &TestContext) -> Result<NetworkBackend, Error>;
}

/// The collaborators that provision chains and relay between them.
pub type NetworkBackend = (Arc<dyn ChainProvisioner>, Arc<dyn RelayerDriver>);

/**
   The default backend: a simulated network on the clock of the test, with
   a relayer standing in for the configured relayer command.
*/
pub fn simulated_network(ctx: &TestContext) -> NetworkBackend {
    let network = MockNetwork::new(ctx.clock.clone(), &ctx.config.validator_key_name);

    (
        Arc::new(network.provisioner()),
        Arc::new(network.relayer(&ctx.config.relayer_command)),
    )
}

/**
   The running provider chain, together with the collaborators needed to
   onboard consumer chains onto it.
*/
pub struct IcsNetwork {
    pub provider: Arc<ChainHandle>,
    pub provisioner: Arc<dyn ChainProvisioner>,
    pub relayer: Arc<dyn RelayerDriver>,
}

impl IcsNetwork {
    pub fn onboard_consumer(
        &self,
        ctx: &TestContext,
        consumer: &ConsumerConfig,
    ) -> Result<Arc<ChainHandle>, Error> {
        bootstrap_consumer_chain(
            &ctx.config,
            &ctx.clock,
            self.provisioner.as_ref(),
            self.relayer.as_ref(),
            &self.provider,
            consumer,
        )
    }
}

/**
   A wrapper type that lifts a test case that implements [`InterchainSecurityTest`]
   into a test case the implements [`BasicTest`].
*/
pub struct RunInterchainSecurityTest<'a, Test> {
    /// Inner test
    pub test: &'a Test,
}

impl<'a, Test> RunInterchainSecurityTest<'a, Test>
where
    Test: InterchainSecurityTest,
{
    /// Create a new [`RunInterchainSecurityTest`]
    pub fn new(test: &'a Test) -> Self {
        Self { test }
    }
}

impl<'a, Test, Overrides> BasicTest for RunInterchainSecurityTest<'a, Test>
where
    Test: InterchainSecurityTest,
    Test: HasOverrides<Overrides = Overrides>,
    Overrides: ProviderGenesisOverride + NetworkOverride,
{
    fn run(&self, ctx: &TestContext) -> Result<(), Error> {
        let (provisioner, relayer) = self.test.get_overrides().network(ctx)?;

        let provider = ctx.reporter.step("bootstrap provider chain", || {
            bootstrap_provider_chain(
                &ctx.config,
                provisioner.as_ref(),
                relayer.as_ref(),
                &|genesis: &mut serde_json::Value| {
                    self.test.get_overrides().modify_provider_genesis(genesis)
                },
            )
        })?;

        relayer.start()?;

        let network = IcsNetwork {
            provider,
            provisioner,
            relayer,
        };

        self.test.run(ctx, &network)
    }
}

impl<'a, Test, Overrides> HasOverrides for RunInterchainSecurityTest<'a, Test>
where
    Test: HasOverrides<Overrides = Overrides>,
{
    type Overrides = Overrides;

    fn get_overrides(&self) -> &Self::Overrides {
        self.test.get_overrides()
    }
}
