use std::sync::Mutex;

use ics_test_framework::chain::config::PRIV_VALIDATOR_KEY_PATH;
use ics_test_framework::prelude::*;
use ics_test_framework::util::json::{get_str, get_u64};
use serial_test::serial;
use test_log::test;

#[test]
#[serial]
fn test_consumer_onboarding_with_mixed_keys() -> Result<(), Error> {
    run_interchain_security_test(&MixedKeysTest)
}

#[test]
#[serial]
fn test_consumer_onboarding_hook_order() -> Result<(), Error> {
    run_interchain_security_test(&HookOrderTest::default())
}

#[test]
#[serial]
fn test_key_flag_mismatch_fails_fast() -> Result<(), Error> {
    run_interchain_security_test(&KeyFlagMismatchTest)
}

#[test]
#[serial]
fn test_failing_voting_period_hook_aborts_onboarding() -> Result<(), Error> {
    run_interchain_security_test(&FailingHookTest {
        stage: FailingStage::VotingPeriod,
    })
}

#[test]
#[serial]
fn test_failing_spawn_time_hook_aborts_onboarding() -> Result<(), Error> {
    run_interchain_security_test(&FailingHookTest {
        stage: FailingStage::BeforeSpawnTime,
    })
}

const COPY_PROVIDER_KEY: [bool; 6] = [true, false, true, false, true, false];

pub struct MixedKeysTest;

impl TestOverrides for MixedKeysTest {
    fn modify_test_config(&self, config: &mut TestConfig) {
        config.validator_count = COPY_PROVIDER_KEY.len();
    }
}

impl InterchainSecurityTest for MixedKeysTest {
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let consumer = network.onboard_consumer(
            ctx,
            &ConsumerConfig::new(
                ChainFamily::Consumer,
                "consumer",
                "v5.0.0",
                COPY_PROVIDER_KEY.to_vec(),
            )
            .with_top_n(100),
        )?;

        for (node, copy_key) in COPY_PROVIDER_KEY.iter().enumerate() {
            let provider_key = consensus_pub_key(network.provider.driver(), node)?;
            let consumer_key = consensus_pub_key(consumer.driver(), node)?;

            info!(
                "node {}: provider key {}, consumer key {}",
                node, provider_key, consumer_key
            );

            if *copy_key {
                assert_eq(
                    &format!("consumer node {} should reuse the provider key", node),
                    &consumer_key,
                    &provider_key,
                )?;
            } else {
                assert_not_eq(
                    &format!("consumer node {} should use an assigned key", node),
                    &consumer_key,
                    &provider_key,
                )?;
            }
        }

        let validator_set = consumer
            .driver()
            .exec_query(&["query", "comet-validator-set"])?;

        assert_eq(
            "every provider validator should validate the consumer",
            &get_u64(&validator_set, "/total")?,
            &(COPY_PROVIDER_KEY.len() as u64),
        )?;

        assert_eq(
            "the consumer should be registered on the provider",
            &network.provider.consumer_count(),
            &1,
        )?;

        Ok(())
    }
}

fn consensus_pub_key(driver: &dyn ChainDriver, node: usize) -> Result<String, Error> {
    let content = driver.read_file(node, PRIV_VALIDATOR_KEY_PATH)?;
    let key: serde_json::Value = serde_json::from_slice(&content).map_err(handle_generic_error)?;

    Ok(get_str(&key, "/pub_key/value")?.to_string())
}

#[derive(Default)]
pub struct HookOrderTest {
    stages: Arc<Mutex<Vec<&'static str>>>,
}

impl HookOrderTest {
    fn hook(&self, stage: &'static str) -> ConsumerHook {
        let stages = self.stages.clone();

        Arc::new(move |onboarding: &OnboardingStage<'_>| -> Result<(), Error> {
            info!(
                "hook {} for consumer {} with proposal {:?}",
                stage, onboarding.consumer_chain_id, onboarding.proposal_id
            );

            stages
                .lock()
                .map_err(|_| Error::generic(eyre!("poisoned stage list")))?
                .push(stage);

            Ok(())
        })
    }
}

impl TestOverrides for HookOrderTest {}

impl InterchainSecurityTest for HookOrderTest {
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let hooks = ConsumerHooks {
            during_deposit_period: Some(self.hook("deposit")),
            during_voting_period: Some(self.hook("voting")),
            before_spawn_time: Some(self.hook("before_spawn")),
            after_spawn_time: Some(self.hook("after_spawn")),
        };

        let flags = vec![true; ctx.config.validator_count];

        network.onboard_consumer(
            ctx,
            &ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", flags)
                .with_hooks(hooks),
        )?;

        let stages = self
            .stages
            .lock()
            .map_err(|_| Error::generic(eyre!("poisoned stage list")))?
            .clone();

        assert_eq(
            "hooks should run once each, in proposal order",
            &stages,
            &vec!["deposit", "voting", "before_spawn", "after_spawn"],
        )?;

        Ok(())
    }
}

pub struct KeyFlagMismatchTest;

impl TestOverrides for KeyFlagMismatchTest {}

impl InterchainSecurityTest for KeyFlagMismatchTest {
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let flags = vec![true; ctx.config.validator_count - 1];

        let res = network.onboard_consumer(
            ctx,
            &ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", flags),
        );

        match res {
            Err(e) if matches!(e.detail(), ErrorDetail::KeyFlagsMismatch(_)) => {
                info!("onboarding refused as expected: {}", e);
            }
            Err(e) => return Err(e),
            Ok(consumer) => {
                return Err(Error::generic(eyre!(
                    "consumer {} was onboarded with a wrong number of key flags",
                    consumer.chain_id
                )))
            }
        }

        assert_eq(
            "no consumer should be registered on the provider",
            &network.provider.consumer_count(),
            &0,
        )?;

        Ok(())
    }
}

const HOOK_FAILURE: &str = "consumer genesis rejected";

#[derive(Debug, Clone, Copy)]
pub enum FailingStage {
    /// The proposal driver is parked until the vote is allowed.
    VotingPeriod,
    /// The proposal has passed and the hook runs alone.
    BeforeSpawnTime,
}

pub struct FailingHookTest {
    stage: FailingStage,
}

impl TestOverrides for FailingHookTest {}

impl InterchainSecurityTest for FailingHookTest {
    fn run(&self, ctx: &TestContext, network: &IcsNetwork) -> Result<(), Error> {
        let failing: ConsumerHook = Arc::new(|_: &OnboardingStage<'_>| -> Result<(), Error> {
            Err(Error::assertion(HOOK_FAILURE.to_string()))
        });

        let hooks = match self.stage {
            FailingStage::VotingPeriod => ConsumerHooks {
                during_voting_period: Some(failing),
                ..ConsumerHooks::default()
            },
            FailingStage::BeforeSpawnTime => ConsumerHooks {
                before_spawn_time: Some(failing),
                ..ConsumerHooks::default()
            },
        };

        let flags = vec![true; ctx.config.validator_count];
        let started = ctx.clock.now();

        let res = network.onboard_consumer(
            ctx,
            &ConsumerConfig::new(ChainFamily::Consumer, "consumer", "v5.0.0", flags)
                .with_hooks(hooks),
        );

        match res {
            Err(e) => match e.detail() {
                ErrorDetail::Assertion(detail) if detail.message == HOOK_FAILURE => {
                    info!("onboarding failed with the hook error: {}", e);
                }
                _ => return Err(e),
            },
            Ok(consumer) => {
                return Err(Error::generic(eyre!(
                    "consumer {} was onboarded despite a failing {:?} hook",
                    consumer.chain_id,
                    self.stage
                )))
            }
        }

        // A blocked proposal driver would only be released by the deadline.
        let elapsed = ctx.clock.now().duration_since(started).unwrap_or_default();

        assert_eq(
            "onboarding should return before its deadline",
            &(elapsed < ctx.config.onboarding_timeout),
            &true,
        )?;

        assert_eq(
            "no consumer should be registered on the provider",
            &network.provider.consumer_count(),
            &0,
        )?;

        Ok(())
    }
}
