use ics_test_framework::prelude::*;
use ics_test_framework::types::id::CONSUMER_PORT;
use serial_test::serial;
use test_log::test;

#[test]
#[serial]
fn test_consumer_downtime_jails_on_provider() -> Result<(), Error> {
    run_interchain_security_test(&DowntimeJailingTest {
        short_downtime: false,
    })
}

#[test]
#[serial]
fn test_short_consumer_downtime_is_tolerated() -> Result<(), Error> {
    run_interchain_security_test(&DowntimeJailingTest {
        short_downtime: true,
    })
}

/// Index of the validator whose consumer node is taken down.
const DOWN_VALIDATOR: usize = 1;

/// Blocks stopped for in the short-downtime case, well inside the window.
const SHORT_DOWNTIME_BLOCKS: u64 = 3;

pub struct DowntimeJailingTest {
    short_downtime: bool,
}

impl TestOverrides for DowntimeJailingTest {
    fn modify_test_config(&self, config: &mut TestConfig) {
        config.commit_interval = Duration::from_secs(4);
        config.downtime_window_blocks = 20;
    }
}

impl InterchainSecurityTest for DowntimeJailingTest {
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let flags = vec![true; ctx.config.validator_count];

        let consumer = network.onboard_consumer(
            ctx,
            &ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", flags),
        )?;

        let window_blocks = if self.short_downtime {
            SHORT_DOWNTIME_BLOCKS
        } else {
            ctx.config.downtime_window_blocks
        };

        // In the short case the node is back up while the jailing is polled,
        // so the validator signs again before the window can fill up.
        let restart = if self.short_downtime {
            RestartPolicy::BeforePoll
        } else {
            RestartPolicy::AfterPoll
        };

        let jailed = ctx.reporter.step("consumer downtime", || {
            check_downtime_jailing_with(
                &ctx.clock,
                network.relayer.as_ref(),
                &network.provider,
                &consumer,
                DOWN_VALIDATOR,
                window_blocks,
                restart,
            )
        })?;

        assert_eq(
            "jailing on the provider",
            &jailed,
            &!self.short_downtime,
        )?;

        ctx.reporter.step("stopped node is running again", || {
            let wallet = consumer
                .driver()
                .wallet(DOWN_VALIDATOR, &consumer.validator_key_name)?;

            consumer.driver().exec_tx(
                DOWN_VALIDATOR,
                &consumer.validator_key_name,
                &[
                    "tx",
                    "bank",
                    "send",
                    &consumer.validator_key_name,
                    &wallet.address.0,
                    &consumer.token(1).to_string(),
                ],
            )
        })?;

        if self.short_downtime {
            let channel = network.relayer.find_channel(
                &consumer.chain_id,
                &network.provider.chain_id,
                CONSUMER_PORT,
            )?;

            consumer.wait_for_blocks(
                &Deadline::after(&ctx.clock, consumer.commit_interval * 10),
                3,
            )?;

            network
                .relayer
                .clear_packets(&consumer.chain_id, CONSUMER_PORT, &channel.channel_id)?;
        }

        let operator_address = &network.provider.validator(DOWN_VALIDATOR)?.operator_address;

        assert_eq(
            "jailed status queried after the check",
            &network.provider.query_jailed(operator_address)?,
            &!self.short_downtime,
        )?;

        Ok(())
    }
}
