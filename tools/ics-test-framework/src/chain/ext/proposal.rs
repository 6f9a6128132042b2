/*!
   Governance proposal methods on a [`ChainHandle`].
*/

use serde::Serialize;
use tracing::{debug, info};

use crate::chain::handle::ChainHandle;
use crate::error::{handle_generic_error, Error};
use crate::types::proposal::{ProposalFile, ProposalStatus, VoteOption};
use crate::types::token::Token;
use crate::util::clock::Deadline;
use crate::util::fan_out::try_join_all;
use crate::util::json::get_str;
use crate::util::random::random_u32;
use crate::util::retry::assert_eventually;

pub trait ChainProposalMethodsExt {
    /**
       Write the proposal file into the home directory of node `node` and
       submit it with that node's validator key. Returns the proposal id.
    */
    fn submit_proposal<Message: Serialize>(
        &self,
        node: usize,
        proposal: &ProposalFile<Message>,
    ) -> Result<u64, Error>;

    fn deposit_proposal(&self, node: usize, proposal_id: u64, amount: &Token) -> Result<(), Error>;

    fn vote_proposal(&self, node: usize, proposal_id: u64, option: VoteOption) -> Result<(), Error>;

    /// Vote yes from every validator, concurrently.
    fn vote_yes_all_validators(&self, proposal_id: u64) -> Result<(), Error>;

    fn query_proposal_status(&self, proposal_id: u64) -> Result<ProposalStatus, Error>;

    /**
       Wait until the proposal reaches `expected`. A proposal that ends in a
       different final status fails immediately instead of waiting for the
       deadline.
    */
    fn wait_for_proposal_status(
        &self,
        deadline: &Deadline,
        proposal_id: u64,
        expected: ProposalStatus,
    ) -> Result<(), Error>;

    /// The address of a module account, e.g. the `gov` authority.
    fn query_module_address(&self, module: &str) -> Result<String, Error>;
}

impl ChainProposalMethodsExt for ChainHandle {
    fn submit_proposal<Message: Serialize>(
        &self,
        node: usize,
        proposal: &ProposalFile<Message>,
    ) -> Result<u64, Error> {
        let path = format!("proposal-{:x}.json", random_u32());
        let content = serde_json::to_vec_pretty(proposal).map_err(handle_generic_error)?;

        self.driver.write_file(node, &path, &content)?;

        let tx = self
            .driver
            .exec_tx(
                node,
                &self.validator_key_name,
                &["tx", "gov", "submit-proposal", &path],
            )?
            .check(&self.chain_id)?;

        let proposal_id = tx
            .attribute("submit_proposal", "proposal_id")?
            .parse()
            .map_err(handle_generic_error)?;

        info!(
            "submitted proposal {} `{}` on chain {}",
            proposal_id, proposal.title, self.chain_id
        );

        Ok(proposal_id)
    }

    fn deposit_proposal(&self, node: usize, proposal_id: u64, amount: &Token) -> Result<(), Error> {
        self.driver
            .exec_tx(
                node,
                &self.validator_key_name,
                &[
                    "tx",
                    "gov",
                    "deposit",
                    &proposal_id.to_string(),
                    &amount.to_string(),
                ],
            )?
            .check(&self.chain_id)?;

        debug!(
            "deposited {} on proposal {} of chain {}",
            amount, proposal_id, self.chain_id
        );

        Ok(())
    }

    fn vote_proposal(&self, node: usize, proposal_id: u64, option: VoteOption) -> Result<(), Error> {
        self.driver
            .exec_tx(
                node,
                &self.validator_key_name,
                &[
                    "tx",
                    "gov",
                    "vote",
                    &proposal_id.to_string(),
                    &option.to_string(),
                ],
            )?
            .check(&self.chain_id)?;

        Ok(())
    }

    fn vote_yes_all_validators(&self, proposal_id: u64) -> Result<(), Error> {
        try_join_all(&self.validators, |node, _| {
            self.vote_proposal(node, proposal_id, VoteOption::Yes)
        })?;

        info!(
            "all {} validators of chain {} voted yes on proposal {}",
            self.validators.len(),
            self.chain_id,
            proposal_id
        );

        Ok(())
    }

    fn query_proposal_status(&self, proposal_id: u64) -> Result<ProposalStatus, Error> {
        let output = self
            .driver
            .exec_query(&["query", "gov", "proposal", &proposal_id.to_string()])?;

        get_str(&output, "/proposal/status")?.parse()
    }

    fn wait_for_proposal_status(
        &self,
        deadline: &Deadline,
        proposal_id: u64,
        expected: ProposalStatus,
    ) -> Result<(), Error> {
        assert_eventually(
            &format!(
                "proposal {} on chain {} to reach status {}",
                proposal_id, self.chain_id, expected
            ),
            deadline,
            self.commit_interval,
            || {
                let status = self.query_proposal_status(proposal_id)?;

                if status == expected {
                    Ok(Some(()))
                } else if status.is_final() {
                    Err(Error::proposal_not_passed(proposal_id, status.to_string()))
                } else {
                    Ok(None)
                }
            },
        )
    }

    fn query_module_address(&self, module: &str) -> Result<String, Error> {
        let output = self
            .driver
            .exec_query(&["query", "auth", "module-account", module])?;

        Ok(get_str(&output, "/account/value/address")?.to_string())
    }
}
