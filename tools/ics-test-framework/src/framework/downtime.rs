/*!
   Check that validator downtime on one chain leads to the validator being
   jailed on another chain.

   The typical case is a validator going down on a consumer chain: the
   consumer detects the missed blocks, sends a slash packet over the
   cross-chain validation channel, and the provider jails the validator.
*/

use alloc::sync::Arc;
use core::time::Duration;
use tracing::{info, warn};

use crate::chain::driver::ChainDriver;
use crate::chain::ext::staking::ChainStakingMethodsExt;
use crate::chain::handle::ChainHandle;
use crate::error::Error;
use crate::relayer::driver::RelayerDriver;
use crate::types::id::CONSUMER_PORT;
use crate::util::clock::{Clock, Deadline};
use crate::util::retry::{poll_until, PollOutcome};

/// Bound on the wait for the jailing, in commit intervals of the observed chain.
pub const JAIL_WAIT_INTERVALS: u32 = 30;

/// Extra blocks allowed on top of the downtime window before giving up on block production.
pub const DOWNTIME_WINDOW_SLACK_BLOCKS: u64 = 10;

/**
   When the stopped validator node is started again, relative to the
   poll for the jailing.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Keep the node down until the poll ends.
    AfterPoll,

    /**
       Restart the node once the downtime blocks have passed, so that the
       validator is back online while the jailing is polled. Used to check
       that a downtime shorter than the slashing window is tolerated.
    */
    BeforePoll,
}

/**
   A stopped validator node. [`restart`](StoppedNode::restart) starts it
   again and reports the outcome. A guard dropped without being restarted,
   e.g. on an early error, still starts the node.
*/
pub struct StoppedNode<'a> {
    driver: &'a dyn ChainDriver,
    node: usize,
    restarted: bool,
}

impl<'a> StoppedNode<'a> {
    pub fn stop(driver: &'a dyn ChainDriver, node: usize) -> Result<Self, Error> {
        driver.stop_node(node)?;

        info!("stopped node {} of chain {}", node, driver.chain_id());

        Ok(Self {
            driver,
            node,
            restarted: false,
        })
    }

    pub fn restart(mut self) -> Result<(), Error> {
        self.restarted = true;
        self.driver.start_node(self.node)?;

        info!(
            "restarted node {} of chain {}",
            self.node,
            self.driver.chain_id()
        );

        Ok(())
    }
}

impl<'a> Drop for StoppedNode<'a> {
    fn drop(&mut self) {
        if self.restarted {
            return;
        }

        match self.driver.start_node(self.node) {
            Ok(()) => info!(
                "restarted node {} of chain {} after a failed check",
                self.node,
                self.driver.chain_id()
            ),
            Err(e) => warn!(
                "failed to restart node {} of chain {}: {}",
                self.node,
                self.driver.chain_id(),
                e
            ),
        }
    }
}

/**
   Stop validator `validator` on `stopped_on` for `window_blocks` blocks
   of that chain, relay the resulting packets, and wait for the validator
   to be jailed on `observed_on`.

   Returns `Ok(true)` as soon as the validator is seen jailed, and
   `Ok(false)` if it is still not jailed after [`JAIL_WAIT_INTERVALS`]
   commit intervals. The validator node is kept down during the poll and
   is always restarted before returning; a failed restart fails the check.
*/
pub fn check_downtime_jailing(
    clock: &Arc<dyn Clock>,
    relayer: &dyn RelayerDriver,
    observed_on: &ChainHandle,
    stopped_on: &ChainHandle,
    validator: usize,
    window_blocks: u64,
) -> Result<bool, Error> {
    check_downtime_jailing_with(
        clock,
        relayer,
        observed_on,
        stopped_on,
        validator,
        window_blocks,
        RestartPolicy::AfterPoll,
    )
}

/**
   Like [`check_downtime_jailing`], with the restart of the stopped node
   scheduled by `restart`.
*/
pub fn check_downtime_jailing_with(
    clock: &Arc<dyn Clock>,
    relayer: &dyn RelayerDriver,
    observed_on: &ChainHandle,
    stopped_on: &ChainHandle,
    validator: usize,
    window_blocks: u64,
    restart: RestartPolicy,
) -> Result<bool, Error> {
    let operator_address = &observed_on.validator(validator)?.operator_address;

    let stopped = StoppedNode::stop(stopped_on.driver(), validator)?;

    let channel = relayer.find_channel(&stopped_on.chain_id, &observed_on.chain_id, CONSUMER_PORT)?;

    let window_deadline = Deadline::after(
        clock,
        blocks_duration(
            stopped_on.commit_interval,
            window_blocks + DOWNTIME_WINDOW_SLACK_BLOCKS,
        ),
    );

    let height = stopped_on.wait_for_blocks(&window_deadline, window_blocks)?;

    info!(
        "validator {} was down for {} blocks on chain {}, now at height {}",
        validator, window_blocks, stopped_on.chain_id, height
    );

    let stopped = match restart {
        RestartPolicy::BeforePoll => {
            stopped.restart()?;
            None
        }
        RestartPolicy::AfterPoll => Some(stopped),
    };

    relayer.clear_packets(&stopped_on.chain_id, &channel.port_id, &channel.channel_id)?;

    let jail_deadline = Deadline::after(clock, observed_on.commit_interval * JAIL_WAIT_INTERVALS);

    let outcome = poll_until(
        &format!(
            "validator {} to be jailed on chain {}",
            operator_address, observed_on.chain_id
        ),
        &jail_deadline,
        observed_on.commit_interval,
        || {
            let jailed = observed_on.query_jailed(operator_address)?;
            Ok(jailed.then_some(()))
        },
    )?;

    if let Some(stopped) = stopped {
        stopped.restart()?;
    }

    match outcome {
        PollOutcome::Ready(()) => {
            info!(
                "validator {} is jailed on chain {}",
                operator_address, observed_on.chain_id
            );
            Ok(true)
        }
        PollOutcome::DeadlineExceeded => {
            warn!(
                "validator {} is still not jailed on chain {} after {:?}",
                operator_address,
                observed_on.chain_id,
                jail_deadline.timeout()
            );
            Ok(false)
        }
    }
}

/// How long `blocks` blocks take at the given commit interval.
pub fn blocks_duration(commit_interval: Duration, blocks: u64) -> Duration {
    commit_interval * u32::try_from(blocks).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chain::chain_type::ChainFamily;
    use crate::mock::chain::started_test_chain;
    use test_log::test;

    fn accepts_txs(chain: &dyn ChainDriver, node: usize) -> bool {
        let Ok(wallet) = chain.wallet(node, "validator") else {
            return false;
        };

        chain
            .exec_tx(
                node,
                "validator",
                &["tx", "bank", "send", "validator", &wallet.address.0, "1stake"],
            )
            .is_ok()
    }

    #[test]
    fn restart_brings_the_node_back() {
        let (_clock, chain) = started_test_chain(ChainFamily::Provider, 4);

        let stopped = StoppedNode::stop(&chain, 1).unwrap();
        assert!(!accepts_txs(&chain, 1));

        stopped.restart().unwrap();
        assert!(accepts_txs(&chain, 1));
    }

    #[test]
    fn dropped_guard_restarts_the_node() {
        let (_clock, chain) = started_test_chain(ChainFamily::Provider, 4);

        {
            let _stopped = StoppedNode::stop(&chain, 2).unwrap();
            assert!(!accepts_txs(&chain, 2));
        }

        assert!(accepts_txs(&chain, 2));
    }

    #[test]
    fn blocks_duration_scales_with_the_commit_interval() {
        assert_eq!(
            blocks_duration(Duration::from_secs(4), 20),
            Duration::from_secs(80)
        );
    }
}
