/*!
   Verify that a chain halts at the height of a software upgrade, and
   resumes producing blocks with the new binary.

   The verification goes through four states:

   ```text
   Proposing -> AwaitingHalt -> Halted -> Restarted
   ```

   A chain that keeps producing blocks past the halt height is the failure
   this module looks for. The wait for the halt is therefore expected to
   run into its deadline; reaching the extra blocks fails the upgrade.
*/

use alloc::sync::Arc;
use core::fmt::{self, Display};
use core::time::Duration;
use eyre::eyre;
use tracing::{debug, info};

use crate::chain::chain_type::MIN_DEPOSIT_AMOUNT;
use crate::chain::ext::proposal::ChainProposalMethodsExt;
use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::types::proposal::{
    MsgSoftwareUpgrade, ProposalFile, ProposalStatus, UpgradePlan, MSG_SOFTWARE_UPGRADE_TYPE_URL,
};
use crate::types::token::Token;
use crate::util::clock::{Clock, Deadline};
use crate::util::retry::{poll_until, PollOutcome};

/// Blocks between submitting the upgrade proposal and the halt height.
pub const HALT_HEIGHT_DELTA: u64 = 20;

/// Blocks past the halt height whose appearance fails the upgrade.
pub const HALT_OVERSHOOT_BLOCKS: u64 = 3;

/// Extra blocks of waiting time on top of the distance to the halt height.
pub const HALT_WAIT_SLACK_BLOCKS: u64 = 10;

/// Blocks the upgraded chain must produce to count as restarted.
pub const RESTART_BLOCKS: u64 = 5;

/// Bound on the wait for the restarted chain, in commit intervals.
pub const RESTART_TIMEOUT_INTERVALS: u32 = 30;

/// Bound on the wait for the proposal to pass, on top of the voting period.
pub const PROPOSAL_SLACK_INTERVALS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Proposing,
    AwaitingHalt,
    Halted,
    Restarted,
}

impl Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposing => write!(f, "proposing"),
            Self::AwaitingHalt => write!(f, "awaiting_halt"),
            Self::Halted => write!(f, "halted"),
            Self::Restarted => write!(f, "restarted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeDescriptor {
    pub name: String,
    pub version: String,

    /// Computed once, before the proposal is submitted.
    pub halt_height: u64,

    pub deposit: Token,
}

/// The height observed when entering each state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub state: UpgradeState,
    pub height: u64,
}

#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub descriptor: UpgradeDescriptor,
    pub proposal_id: u64,
    pub transitions: Vec<StateTransition>,

    /// Height the chain stopped at.
    pub halted_height: u64,

    /// Height reached by the restarted chain.
    pub resumed_height: u64,
}

pub struct UpgradeVerifier<'a> {
    chain: &'a ChainHandle,
    clock: Arc<dyn Clock>,
    voting_period: Duration,
    state: UpgradeState,
    transitions: Vec<StateTransition>,
}

impl<'a> UpgradeVerifier<'a> {
    pub fn new(chain: &'a ChainHandle, clock: Arc<dyn Clock>, voting_period: Duration) -> Self {
        Self {
            chain,
            clock,
            voting_period,
            state: UpgradeState::Proposing,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    /**
       Upgrade the chain to `version` through a governance proposal named
       `name`, and verify that it halts and restarts as expected.
    */
    pub fn run(mut self, name: &str, version: &str) -> Result<UpgradeReport, Error> {
        let height = self.enter(UpgradeState::Proposing)?;

        let descriptor = UpgradeDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            halt_height: height + HALT_HEIGHT_DELTA,
            deposit: self.chain.token(MIN_DEPOSIT_AMOUNT),
        };

        let proposal_id = self.propose(&descriptor)?;

        self.enter(UpgradeState::AwaitingHalt)?;
        self.await_halt(&descriptor)?;

        let halted_height = self.enter(UpgradeState::Halted)?;
        self.check_halted(&descriptor, halted_height)?;

        self.restart(&descriptor)?;
        let resumed_height = self.enter(UpgradeState::Restarted)?;

        info!(
            "chain {} upgraded to {} at height {}, resumed at height {}",
            self.chain.chain_id, descriptor.version, halted_height, resumed_height
        );

        Ok(UpgradeReport {
            descriptor,
            proposal_id,
            transitions: self.transitions,
            halted_height,
            resumed_height,
        })
    }

    fn enter(&mut self, state: UpgradeState) -> Result<u64, Error> {
        let height = self.chain.height()?;

        debug!(
            "upgrade of chain {} enters state {} at height {}",
            self.chain.chain_id, state, height
        );

        self.state = state;
        self.transitions.push(StateTransition { state, height });

        Ok(height)
    }

    fn propose(&self, descriptor: &UpgradeDescriptor) -> Result<u64, Error> {
        let chain = self.chain;

        let message = MsgSoftwareUpgrade {
            type_url: MSG_SOFTWARE_UPGRADE_TYPE_URL.to_string(),
            authority: chain.query_module_address("gov")?,
            plan: UpgradePlan {
                name: descriptor.name.clone(),
                height: descriptor.halt_height,
                info: String::new(),
            },
        };

        let proposal = ProposalFile::new(
            message,
            &format!("Upgrade to {}", descriptor.version),
            &descriptor.deposit,
        );

        let proposal_id = chain.submit_proposal(0, &proposal)?;

        let deadline = Deadline::after(
            &self.clock,
            self.voting_period + chain.commit_interval * PROPOSAL_SLACK_INTERVALS,
        );

        chain.wait_for_proposal_status(&deadline, proposal_id, ProposalStatus::VotingPeriod)?;
        chain.vote_yes_all_validators(proposal_id)?;
        chain.wait_for_proposal_status(&deadline, proposal_id, ProposalStatus::Passed)?;

        info!(
            "upgrade proposal {} passed, chain {} halts at height {}",
            proposal_id, chain.chain_id, descriptor.halt_height
        );

        Ok(proposal_id)
    }

    /**
       Wait for the chain to reach a few blocks past the halt height, with a
       deadline proportional to the remaining distance. Only the deadline
       firing counts as a halt.
    */
    fn await_halt(&self, descriptor: &UpgradeDescriptor) -> Result<(), Error> {
        let chain = self.chain;
        let target = descriptor.halt_height + HALT_OVERSHOOT_BLOCKS;

        let remaining_blocks = target.saturating_sub(chain.height()?) + HALT_WAIT_SLACK_BLOCKS;
        let timeout = chain.commit_interval * u32::try_from(remaining_blocks).unwrap_or(u32::MAX);

        let deadline = Deadline::after(&self.clock, timeout);

        let outcome = poll_until(
            &format!("chain {} to pass height {}", chain.chain_id, target),
            &deadline,
            chain.commit_interval,
            || {
                let height = chain.height()?;
                Ok((height >= target).then_some(height))
            },
        );

        match outcome {
            Ok(PollOutcome::DeadlineExceeded) => Ok(()),
            Ok(PollOutcome::Ready(height)) => Err(Error::blocks_after_halt(
                chain.chain_id.to_string(),
                descriptor.halt_height,
                height,
            )),
            Err(e) => Err(Error::upgrade_failed(
                chain.chain_id.to_string(),
                descriptor.name.clone(),
                eyre!("failed while waiting for the chain to halt: {}", e),
            )),
        }
    }

    fn check_halted(&self, descriptor: &UpgradeDescriptor, height: u64) -> Result<(), Error> {
        // A chain may commit one more block before it stops.
        if height < descriptor.halt_height || height > descriptor.halt_height + 1 {
            return Err(Error::not_halted(
                self.chain.chain_id.to_string(),
                descriptor.halt_height,
                height,
            ));
        }

        Ok(())
    }

    fn restart(&self, descriptor: &UpgradeDescriptor) -> Result<(), Error> {
        let chain = self.chain;
        let driver = chain.driver();

        driver.stop_all_nodes()?;
        driver.upgrade_binary(&descriptor.version)?;
        driver.start_all_nodes()?;

        let deadline = Deadline::after(
            &self.clock,
            chain.commit_interval * RESTART_TIMEOUT_INTERVALS,
        );

        chain.wait_for_blocks(&deadline, RESTART_BLOCKS)?;

        // The first key command after a migration prints one-time notices
        // that would otherwise pollute later output parsing.
        for node in 0..driver.node_count() {
            driver.exec_node(node, &["keys", "list", "--keyring-backend", "test"])?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chain::chain_type::ChainFamily;
    use crate::chain::driver::ChainDriver;
    use crate::error::ErrorDetail;
    use crate::mock::chain::started_test_chain;
    use crate::types::config::TestConfig;
    use test_log::test;

    fn provider_handle() -> (Arc<dyn Clock>, ChainHandle) {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 2);
        let config = TestConfig::default();
        let driver: Arc<dyn ChainDriver> = Arc::new(chain);

        let handle = ChainHandle::build(
            driver,
            ChainFamily::Provider,
            ChainFamily::Provider.spec().default_denom,
            config.commit_interval,
            &config.validator_key_name,
        )
        .unwrap();

        (clock, handle)
    }

    fn descriptor(chain: &ChainHandle, halt_height: u64) -> UpgradeDescriptor {
        UpgradeDescriptor {
            name: "v2".to_string(),
            version: "v2.0.0".to_string(),
            halt_height,
            deposit: chain.token(MIN_DEPOSIT_AMOUNT),
        }
    }

    #[test]
    fn chain_without_upgrade_plan_runs_past_the_halt_height() {
        let (clock, chain) = provider_handle();
        let verifier = UpgradeVerifier::new(&chain, clock, Duration::from_secs(20));

        let halt_height = chain.height().unwrap() + 2;

        let err = verifier
            .await_halt(&descriptor(&chain, halt_height))
            .unwrap_err();

        match err.detail() {
            ErrorDetail::BlocksAfterHalt(e) => {
                assert_eq!(e.halt_height, halt_height);
                assert!(e.height >= halt_height + HALT_OVERSHOOT_BLOCKS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn halt_is_accepted_at_the_plan_height_or_one_block_later() {
        let (clock, chain) = provider_handle();
        let verifier = UpgradeVerifier::new(&chain, clock, Duration::from_secs(20));
        let descriptor = descriptor(&chain, 40);

        assert!(verifier.check_halted(&descriptor, 40).is_ok());
        assert!(verifier.check_halted(&descriptor, 41).is_ok());

        for height in [39, 42] {
            let err = verifier.check_halted(&descriptor, height).unwrap_err();
            assert!(matches!(err.detail(), ErrorDetail::NotHalted(_)));
        }
    }

    #[test]
    fn verifier_starts_in_proposing_state() {
        let (clock, chain) = provider_handle();
        let verifier = UpgradeVerifier::new(&chain, clock, Duration::from_secs(20));

        assert_eq!(verifier.state(), UpgradeState::Proposing);
    }
}
