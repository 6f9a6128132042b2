use ics_test_framework::framework::upgrade::HALT_HEIGHT_DELTA;
use ics_test_framework::prelude::*;
use serial_test::serial;
use test_log::test;

#[test]
#[serial]
fn test_provider_halts_at_upgrade_height() -> Result<(), Error> {
    run_interchain_security_test(&ProviderUpgradeTest)
}

pub struct ProviderUpgradeTest;

impl TestOverrides for ProviderUpgradeTest {}

impl InterchainSecurityTest for ProviderUpgradeTest {
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let provider = &network.provider;
        let start_height = provider.height()?;

        let verifier = UpgradeVerifier::new(provider, ctx.clock.clone(), ctx.config.voting_period);
        let report = verifier.run("v6", "v6.0.0")?;

        assert_eq(
            "halt height should be fixed before the proposal",
            &report.descriptor.halt_height,
            &(start_height + HALT_HEIGHT_DELTA),
        )?;

        assert_eq(
            "the chain should stop at the halt height",
            &report.halted_height,
            &report.descriptor.halt_height,
        )?;

        let states: Vec<UpgradeState> = report
            .transitions
            .iter()
            .map(|transition| transition.state)
            .collect();

        assert_eq(
            "the upgrade should go through every state once",
            &states,
            &vec![
                UpgradeState::Proposing,
                UpgradeState::AwaitingHalt,
                UpgradeState::Halted,
                UpgradeState::Restarted,
            ],
        )?;

        let version = provider.driver().exec_node(0, &["version"])?;

        assert_eq(
            "the restarted nodes should run the new binary",
            &version.trim().to_string(),
            &"v6.0.0".to_string(),
        )?;

        if report.resumed_height <= report.halted_height {
            return Err(Error::generic(eyre!(
                "chain resumed at height {}, not past the halt height {}",
                report.resumed_height,
                report.halted_height
            )));
        }

        Ok(())
    }
}
