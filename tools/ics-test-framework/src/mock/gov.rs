/*!
   The gov module of a simulated chain.

   Proposals move from the deposit period to the voting period once
   their deposit reaches the minimum, and are tallied at the end of the
   voting period. A proposal passes when validators holding more than
   half of the unjailed voting power voted yes. Its messages are executed
   when it passes, and a failing message fails the proposal.
*/

use alloc::collections::BTreeMap;
use eyre::eyre;
use serde_json::{json, Value};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::mock::chain::{tx_event, LiveState, TxOutcome, TxRejection, CODE_UNAUTHORIZED};
use crate::mock::genesis::GovParams;
use crate::mock::keys;
use crate::types::proposal::{
    MsgConsumerAddition, MsgSoftwareUpgrade, ProposalFile, ProposalStatus, VoteOption,
    MSG_CONSUMER_ADDITION_TYPE_URL, MSG_SOFTWARE_UPGRADE_TYPE_URL,
};
use crate::types::token::Token;

#[derive(Debug, Clone)]
pub struct MockProposal {
    pub id: u64,
    pub title: String,
    pub messages: Vec<Value>,
    pub status: ProposalStatus,
    pub total_deposit: u128,
    pub deposit_end_time: SystemTime,
    pub voting_end_time: Option<SystemTime>,

    /// Votes by voter account.
    pub votes: BTreeMap<String, VoteOption>,
}

#[derive(Debug, Default)]
pub struct GovState {
    pub proposals: BTreeMap<u64, MockProposal>,
    last_proposal_id: u64,
}

/// A message carried by a proposal, decoded by its type URL.
enum ProposalMessage {
    SoftwareUpgrade(MsgSoftwareUpgrade),
    ConsumerAddition(MsgConsumerAddition),
}

impl LiveState {
    fn gov_params(&self) -> Result<GovParams, TxRejection> {
        self.params.gov.clone().ok_or_else(|| {
            TxRejection::invalid(format!("chain {} has no gov module", self.chain_id))
        })
    }

    fn decode_message(&self, message: &Value) -> Result<ProposalMessage, TxRejection> {
        let type_url = message
            .get("@type")
            .and_then(|type_url| type_url.as_str())
            .unwrap_or_default();

        let decode_error = |e: serde_json::Error| TxRejection::invalid(format!("{type_url}: {e}"));

        let (message, authority) = match type_url {
            MSG_SOFTWARE_UPGRADE_TYPE_URL => {
                let msg: MsgSoftwareUpgrade =
                    serde_json::from_value(message.clone()).map_err(decode_error)?;
                let authority = msg.authority.clone();

                (ProposalMessage::SoftwareUpgrade(msg), authority)
            }
            MSG_CONSUMER_ADDITION_TYPE_URL if self.is_provider => {
                let msg: MsgConsumerAddition =
                    serde_json::from_value(message.clone()).map_err(decode_error)?;
                let authority = msg.authority.clone();

                (ProposalMessage::ConsumerAddition(msg), authority)
            }
            _ => {
                return Err(TxRejection::invalid(format!(
                    "unrecognized message type `{type_url}`"
                )))
            }
        };

        let gov_address = keys::module_address(self.account_prefix, "gov");

        if authority != gov_address {
            return Err(TxRejection::new(
                CODE_UNAUTHORIZED,
                format!("expected {gov_address} as authority, got {authority}"),
            ));
        }

        Ok(message)
    }

    fn validate_message(&self, message: &Value) -> Result<(), TxRejection> {
        match self.decode_message(message)? {
            ProposalMessage::SoftwareUpgrade(msg) if msg.plan.height <= self.height => {
                Err(TxRejection::invalid(format!(
                    "upgrade height {} must be in the future, current height is {}",
                    msg.plan.height, self.height
                )))
            }
            _ => Ok(()),
        }
    }

    fn execute_message(&mut self, message: &Value) -> Result<(), String> {
        match self.decode_message(message).map_err(|e| e.raw_log)? {
            ProposalMessage::SoftwareUpgrade(msg) => {
                if msg.plan.height <= self.height {
                    return Err(format!(
                        "upgrade height {} has already passed",
                        msg.plan.height
                    ));
                }

                info!(
                    "chain {} schedules upgrade {} at height {}",
                    self.chain_id, msg.plan.name, msg.plan.height
                );

                self.upgrade_plan = Some(msg.plan);

                Ok(())
            }
            ProposalMessage::ConsumerAddition(msg) => self.register_consumer(msg),
        }
    }

    fn check_deposit_denom(&self, params: &GovParams, amount: &Token) -> Result<(), TxRejection> {
        if amount.denom == params.deposit_denom {
            Ok(())
        } else {
            Err(TxRejection::invalid(format!(
                "deposit denomination {} is not accepted, expected {}",
                amount.denom, params.deposit_denom
            )))
        }
    }

    /// Add a deposit, moving the proposal to its voting period once the minimum is reached.
    fn add_deposit(&self, proposal: &mut MockProposal, amount: u128, params: &GovParams) {
        proposal.total_deposit += amount;

        if proposal.status == ProposalStatus::DepositPeriod
            && proposal.total_deposit >= params.min_deposit
        {
            proposal.status = ProposalStatus::VotingPeriod;
            proposal.voting_end_time = Some(self.last_block_time + params.voting_period);

            debug!(
                "proposal {} on chain {} enters its voting period",
                proposal.id, self.chain_id
            );
        }
    }

    pub fn submit_proposal(
        &mut self,
        sender: &str,
        proposal: &ProposalFile<Value>,
        deposit: &Token,
    ) -> TxOutcome {
        let params = self.gov_params()?;

        if proposal.messages.is_empty() {
            return Err(TxRejection::invalid("proposal has no messages"));
        }

        for message in &proposal.messages {
            self.validate_message(message)?;
        }

        self.check_deposit_denom(&params, deposit)?;
        self.debit(sender, deposit.amount)?;

        self.gov.last_proposal_id += 1;
        let proposal_id = self.gov.last_proposal_id;

        let mut new_proposal = MockProposal {
            id: proposal_id,
            title: proposal.title.clone(),
            messages: proposal.messages.clone(),
            status: ProposalStatus::DepositPeriod,
            total_deposit: 0,
            deposit_end_time: self.last_block_time + params.max_deposit_period,
            voting_end_time: None,
            votes: BTreeMap::new(),
        };

        self.add_deposit(&mut new_proposal, deposit.amount, &params);
        self.gov.proposals.insert(proposal_id, new_proposal);

        Ok(vec![tx_event(
            "submit_proposal",
            &[("proposal_id", proposal_id.to_string())],
        )])
    }

    pub fn deposit(&mut self, sender: &str, proposal_id: u64, amount: &Token) -> TxOutcome {
        let params = self.gov_params()?;

        let mut proposal = self
            .gov
            .proposals
            .get(&proposal_id)
            .cloned()
            .ok_or_else(|| TxRejection::invalid(format!("unknown proposal {proposal_id}")))?;

        if proposal.status.is_final() {
            return Err(TxRejection::invalid(format!(
                "proposal {proposal_id} is inactive"
            )));
        }

        self.check_deposit_denom(&params, amount)?;
        self.debit(sender, amount.amount)?;

        self.add_deposit(&mut proposal, amount.amount, &params);
        self.gov.proposals.insert(proposal_id, proposal);

        Ok(vec![tx_event(
            "proposal_deposit",
            &[
                ("proposal_id", proposal_id.to_string()),
                ("amount", amount.to_string()),
            ],
        )])
    }

    pub fn vote(&mut self, sender: &str, proposal_id: u64, option: VoteOption) -> TxOutcome {
        self.gov_params()?;

        let proposal = self
            .gov
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| TxRejection::invalid(format!("unknown proposal {proposal_id}")))?;

        if proposal.status != ProposalStatus::VotingPeriod {
            return Err(TxRejection::invalid(format!(
                "proposal {proposal_id} is not in its voting period"
            )));
        }

        proposal.votes.insert(sender.to_string(), option);

        Ok(vec![tx_event(
            "proposal_vote",
            &[
                ("proposal_id", proposal_id.to_string()),
                ("option", option.to_string()),
            ],
        )])
    }

    /**
       Drop proposals whose deposit period ended without reaching the
       minimum deposit, and tally the proposals whose voting period ended.
    */
    pub fn end_block_gov(&mut self, time: SystemTime) {
        let chain_id = self.chain_id.clone();

        self.gov.proposals.retain(|id, proposal| {
            let expired = proposal.status == ProposalStatus::DepositPeriod
                && time >= proposal.deposit_end_time;

            if expired {
                debug!(
                    "proposal {} on chain {} expired without reaching the minimum deposit",
                    id, chain_id
                );
            }

            !expired
        });

        let ended: Vec<u64> = self
            .gov
            .proposals
            .values()
            .filter(|proposal| {
                proposal.status == ProposalStatus::VotingPeriod
                    && proposal.voting_end_time.map_or(false, |end| time >= end)
            })
            .map(|proposal| proposal.id)
            .collect();

        for proposal_id in ended {
            self.tally(proposal_id);
        }
    }

    fn tally(&mut self, proposal_id: u64) {
        let Some(proposal) = self.gov.proposals.get(&proposal_id) else {
            return;
        };

        let yes_power: u64 = self
            .validators
            .iter()
            .filter(|validator| {
                !validator.jailed && proposal.votes.get(&validator.account) == Some(&VoteOption::Yes)
            })
            .map(|validator| validator.power)
            .sum();

        let messages = proposal.messages.clone();

        let status = if yes_power * 2 > self.total_power() {
            match messages
                .iter()
                .try_for_each(|message| self.execute_message(message))
            {
                Ok(()) => ProposalStatus::Passed,
                Err(reason) => {
                    warn!(
                        "proposal {} on chain {} failed to execute: {}",
                        proposal_id, self.chain_id, reason
                    );

                    ProposalStatus::Failed
                }
            }
        } else {
            ProposalStatus::Rejected
        };

        if let Some(proposal) = self.gov.proposals.get_mut(&proposal_id) {
            proposal.status = status;
        }

        info!(
            "proposal {} on chain {} ended with status {}",
            proposal_id, self.chain_id, status
        );
    }

    pub fn query_proposal(&self, proposal_id: u64) -> Result<Value, Error> {
        let proposal = self.gov.proposals.get(&proposal_id).ok_or_else(|| {
            eyre!(
                "proposal {} doesn't exist on chain {}",
                proposal_id,
                self.chain_id
            )
        })?;

        let voting_end_time = proposal
            .voting_end_time
            .map(|time| humantime::format_rfc3339_seconds(time).to_string());

        Ok(json!({
            "proposal": {
                "id": proposal.id.to_string(),
                "title": proposal.title,
                "messages": proposal.messages,
                "status": proposal.status.as_str(),
                "total_deposit": [{
                    "denom": self.gov_params().map(|params| params.deposit_denom).unwrap_or_default(),
                    "amount": proposal.total_deposit.to_string(),
                }],
                "deposit_end_time": humantime::format_rfc3339_seconds(proposal.deposit_end_time).to_string(),
                "voting_end_time": voting_end_time,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use crate::chain::chain_type::{ChainFamily, MIN_DEPOSIT_AMOUNT};
    use crate::chain::driver::ChainDriver;
    use crate::mock::chain::started_test_chain;
    use crate::mock::keys;
    use crate::types::proposal::{
        MsgSoftwareUpgrade, ProposalFile, ProposalStatus, UpgradePlan,
        MSG_SOFTWARE_UPGRADE_TYPE_URL,
    };
    use crate::types::token::Token;
    use crate::util::json::get_str;
    use test_log::test;

    fn submit_upgrade(chain: &dyn ChainDriver, height: u64, deposit: u128) -> u64 {
        let proposal = ProposalFile::new(
            MsgSoftwareUpgrade {
                type_url: MSG_SOFTWARE_UPGRADE_TYPE_URL.to_string(),
                authority: keys::module_address("cosmos", "gov"),
                plan: UpgradePlan {
                    name: "v2".to_string(),
                    height,
                    info: String::new(),
                },
            },
            "upgrade to v2",
            &Token::new(deposit, "stake"),
        );

        chain
            .write_json(0, "upgrade.json", &serde_json::to_value(&proposal).unwrap())
            .unwrap();

        let tx = chain
            .exec_tx(0, "validator", &["tx", "gov", "submit-proposal", "upgrade.json"])
            .unwrap()
            .check(chain.chain_id())
            .unwrap();

        tx.attribute("submit_proposal", "proposal_id")
            .unwrap()
            .parse()
            .unwrap()
    }

    fn status(chain: &dyn ChainDriver, proposal_id: u64) -> ProposalStatus {
        let output = chain
            .exec_query(&["query", "gov", "proposal", &proposal_id.to_string()])
            .unwrap();

        get_str(&output, "/proposal/status").unwrap().parse().unwrap()
    }

    fn vote_yes(chain: &dyn ChainDriver, node: usize, proposal_id: u64) {
        chain
            .exec_tx(
                node,
                "validator",
                &["tx", "gov", "vote", &proposal_id.to_string(), "yes"],
            )
            .unwrap()
            .check(chain.chain_id())
            .unwrap();
    }

    #[test]
    fn proposal_passes_with_majority_and_halts_at_upgrade_height() {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 3);

        let proposal_id = submit_upgrade(&chain, 30, 1);
        assert_eq!(status(&chain, proposal_id), ProposalStatus::DepositPeriod);

        chain
            .exec_tx(
                0,
                "validator",
                &["tx", "gov", "deposit", &proposal_id.to_string(), &format!("{}stake", MIN_DEPOSIT_AMOUNT)],
            )
            .unwrap()
            .check(chain.chain_id())
            .unwrap();

        assert_eq!(status(&chain, proposal_id), ProposalStatus::VotingPeriod);

        vote_yes(&chain, 0, proposal_id);
        vote_yes(&chain, 1, proposal_id);

        clock.sleep(Duration::from_secs(22));
        assert_eq!(status(&chain, proposal_id), ProposalStatus::Passed);

        clock.sleep(Duration::from_secs(120));
        assert_eq!(chain.height().unwrap(), 30);

        // a halted chain does not include transactions
        assert!(chain
            .exec_tx(0, "validator", &["tx", "gov", "vote", "1", "yes"])
            .is_err());
    }

    #[test]
    fn proposal_without_majority_is_rejected() {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 3);

        let proposal_id = submit_upgrade(&chain, 100, MIN_DEPOSIT_AMOUNT);
        vote_yes(&chain, 0, proposal_id);

        clock.sleep(Duration::from_secs(22));
        assert_eq!(status(&chain, proposal_id), ProposalStatus::Rejected);
    }

    #[test]
    fn underfunded_proposal_expires() {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 2);

        let proposal_id = submit_upgrade(&chain, 100, 1);

        clock.sleep(Duration::from_secs(62));

        assert!(chain
            .exec_query(&["query", "gov", "proposal", &proposal_id.to_string()])
            .is_err());
    }

    #[test]
    fn upgrade_in_the_past_is_refused() {
        let (clock, chain) = started_test_chain(ChainFamily::Provider, 2);

        clock.sleep(Duration::from_secs(10));

        chain
            .write_json(
                0,
                "past.json",
                &serde_json::to_value(ProposalFile::new(
                    MsgSoftwareUpgrade {
                        type_url: MSG_SOFTWARE_UPGRADE_TYPE_URL.to_string(),
                        authority: keys::module_address("cosmos", "gov"),
                        plan: UpgradePlan {
                            name: "v2".to_string(),
                            height: 2,
                            info: String::new(),
                        },
                    },
                    "upgrade in the past",
                    &Token::new(MIN_DEPOSIT_AMOUNT, "stake"),
                ))
                .unwrap(),
            )
            .unwrap();

        let tx = chain
            .exec_tx(0, "validator", &["tx", "gov", "submit-proposal", "past.json"])
            .unwrap();

        assert_ne!(tx.code, 0);
    }
}
