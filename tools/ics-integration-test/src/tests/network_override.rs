use std::sync::OnceLock;

use ics_test_framework::mock::network::MockNetwork;
use ics_test_framework::mock::relayer::MockRelayer;
use ics_test_framework::prelude::*;
use serial_test::serial;
use test_log::test;

#[test]
#[serial]
fn test_overridden_network_backend_is_used() -> Result<(), Error> {
    run_interchain_security_test(&CustomNetworkTest::default())
}

const RELAYER_COMMAND: &str = "rly";

/// Builds its own simulated network and keeps a handle on it.
#[derive(Default)]
pub struct CustomNetworkTest {
    network: OnceLock<MockNetwork>,
    relayer: OnceLock<Arc<MockRelayer>>,
}

impl TestOverrides for CustomNetworkTest {
    fn network(&self, ctx: &TestContext) -> Result<NetworkBackend, Error> {
        let network = self
            .network
            .get_or_init(|| MockNetwork::new(ctx.clock.clone(), &ctx.config.validator_key_name));

        let relayer = self
            .relayer
            .get_or_init(|| Arc::new(network.relayer(RELAYER_COMMAND)))
            .clone();

        Ok((Arc::new(network.provisioner()), relayer))
    }
}

impl InterchainSecurityTest for CustomNetworkTest {
    fn run(&self, _ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let (Some(own_network), Some(own_relayer)) = (self.network.get(), self.relayer.get())
        else {
            return Err(Error::generic(eyre!("the network override was not called")));
        };

        own_network.chain(&network.provider.chain_id)?;

        assert_eq(
            "the test should run against the relayer of the override",
            &core::ptr::eq(
                Arc::as_ptr(own_relayer) as *const (),
                Arc::as_ptr(&network.relayer) as *const (),
            ),
            &true,
        )?;

        assert_eq(
            "relayer command",
            &own_relayer.command().to_string(),
            &RELAYER_COMMAND.to_string(),
        )?;

        Ok(())
    }
}
