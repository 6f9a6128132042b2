/*!
   Rendezvous between a background governance-proposal driver and a chain
   bootstrap hook.

   The consumer onboarding runs two tasks at the same time: one steps the
   consumer-addition proposal through deposit, voting and tally on the
   provider chain, while the other builds the consumer chain's genesis.
   [`ProposalWaiter`] lets them meet at exactly four checkpoints without
   either side polling the other's state:

   ```text
     proposal driver                          bootstrap hook
     ---------------                          --------------
     await_deposit_allowed  <---------------  open_deposit
     enter_voting           --------------->  await_voting_entered
     await_vote_allowed     <---------------  open_vote
     mark_passed            --------------->  await_passed
   ```
*/

use core::fmt::{self, Display};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Gate {
    DepositAllowed,
    EnteredVoting,
    VoteAllowed,
    Passed,
}

impl Gate {
    pub const ALL: [Gate; 4] = [
        Gate::DepositAllowed,
        Gate::EnteredVoting,
        Gate::VoteAllowed,
        Gate::Passed,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn predecessor(self) -> Option<Gate> {
        match self {
            Gate::DepositAllowed => None,
            Gate::EnteredVoting => Some(Gate::DepositAllowed),
            Gate::VoteAllowed => Some(Gate::EnteredVoting),
            Gate::Passed => Some(Gate::VoteAllowed),
        }
    }
}

impl Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::DepositAllowed => write!(f, "deposit_allowed"),
            Gate::EnteredVoting => write!(f, "entered_voting"),
            Gate::VoteAllowed => write!(f, "vote_allowed"),
            Gate::Passed => write!(f, "passed"),
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: [bool; 4],
    aborted: Option<String>,
}

/**
   Four one-shot gates that open in the strict order
   `deposit_allowed -> entered_voting -> vote_allowed -> passed`.

   - Opening a gate that is already open is a no-op.
   - Opening a gate before its predecessor returns
     [`Error::gate_out_of_order`] and leaves the state unchanged.
   - [`abort`](ProposalWaiter::abort) wakes every waiter with
     [`Error::proposal_aborted`], so that a failure on one side never
     leaves the other side blocked forever.

   Awaiting blocks indefinitely. Callers that need a bound must arrange
   for an abort when their own deadline fires.
*/
#[derive(Debug, Default)]
pub struct ProposalWaiter {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl ProposalWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_deposit(&self) -> Result<(), Error> {
        self.open(Gate::DepositAllowed)
    }

    pub fn await_deposit_allowed(&self) -> Result<(), Error> {
        self.wait(Gate::DepositAllowed)
    }

    pub fn enter_voting(&self) -> Result<(), Error> {
        self.open(Gate::EnteredVoting)
    }

    pub fn await_voting_entered(&self) -> Result<(), Error> {
        self.wait(Gate::EnteredVoting)
    }

    pub fn open_vote(&self) -> Result<(), Error> {
        self.open(Gate::VoteAllowed)
    }

    pub fn await_vote_allowed(&self) -> Result<(), Error> {
        self.wait(Gate::VoteAllowed)
    }

    pub fn mark_passed(&self) -> Result<(), Error> {
        self.open(Gate::Passed)
    }

    pub fn await_passed(&self) -> Result<(), Error> {
        self.wait(Gate::Passed)
    }

    pub fn is_open(&self, gate: Gate) -> bool {
        self.lock().open[gate.index()]
    }

    /**
       Release every current and future waiter with an error. Gates that
       are already open stay open, and awaiting them still succeeds.
       Only the first reason is kept.
    */
    pub fn abort(&self, reason: &str) {
        let mut state = self.lock();

        if state.aborted.is_none() {
            debug!("aborting proposal waiter: {}", reason);
            state.aborted = Some(reason.to_string());
        }

        self.changed.notify_all();
    }

    pub fn open(&self, gate: Gate) -> Result<(), Error> {
        let mut state = self.lock();

        if state.open[gate.index()] {
            warn!("gate `{}` is already open, ignoring repeated open", gate);
            return Ok(());
        }

        if let Some(predecessor) = gate.predecessor() {
            if !state.open[predecessor.index()] {
                return Err(Error::gate_out_of_order(
                    gate.to_string(),
                    predecessor.to_string(),
                ));
            }
        }

        debug!("opening gate `{}`", gate);

        state.open[gate.index()] = true;
        self.changed.notify_all();

        Ok(())
    }

    pub fn wait(&self, gate: Gate) -> Result<(), Error> {
        let mut state = self.lock();

        loop {
            if state.open[gate.index()] {
                return Ok(());
            }

            if let Some(reason) = &state.aborted {
                return Err(Error::proposal_aborted(gate.to_string(), reason.clone()));
            }

            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crossbeam_channel as channel;
    use std::thread;

    #[test]
    fn repeated_open_is_noop() {
        let waiter = ProposalWaiter::new();

        waiter.open_deposit().unwrap();
        waiter.open_deposit().unwrap();

        assert!(waiter.is_open(Gate::DepositAllowed));
        waiter.await_deposit_allowed().unwrap();
    }

    #[test]
    fn out_of_order_open_is_rejected() {
        let waiter = ProposalWaiter::new();

        assert!(waiter.open_vote().is_err());
        assert!(waiter.mark_passed().is_err());

        for gate in Gate::ALL {
            assert!(!waiter.is_open(gate));
        }
    }

    #[test]
    fn abort_releases_blocked_waiter() {
        let waiter = ProposalWaiter::new();

        thread::scope(|s| {
            let handle = s.spawn(|| waiter.await_passed());
            waiter.abort("deposit failed");

            let res = handle.join().unwrap();
            assert!(res.is_err());
        });

        // gates opened after an abort can still be observed
        waiter.open_deposit().unwrap();
        waiter.await_deposit_allowed().unwrap();
    }

    /**
       Run the two participants the way the consumer onboarding does and
       record the completion events. Whatever the interleaving, the
       four checkpoints complete in the same total order.
    */
    #[test]
    fn checkpoints_complete_in_total_order() {
        for _ in 0..50 {
            let waiter = ProposalWaiter::new();
            let (sender, receiver) = channel::unbounded();

            thread::scope(|s| {
                let driver_events = sender.clone();
                let waiter_ref = &waiter;

                s.spawn(move || {
                    waiter_ref.await_deposit_allowed().unwrap();
                    driver_events.send("deposit_allowed_observed").unwrap();
                    driver_events.send("voting_entered_opened").unwrap();
                    waiter_ref.enter_voting().unwrap();
                    waiter_ref.await_vote_allowed().unwrap();
                    driver_events.send("vote_allowed_observed").unwrap();
                    driver_events.send("passed_opened").unwrap();
                    waiter_ref.mark_passed().unwrap();
                });

                let hook_events = sender.clone();

                s.spawn(move || {
                    waiter_ref.open_deposit().unwrap();
                    waiter_ref.await_voting_entered().unwrap();
                    waiter_ref.open_vote().unwrap();
                    waiter_ref.await_passed().unwrap();
                    hook_events.send("passed_observed").unwrap();
                });
            });

            drop(sender);

            let events: Vec<&str> = receiver.iter().collect();

            assert_eq!(
                events,
                vec![
                    "deposit_allowed_observed",
                    "voting_entered_opened",
                    "vote_allowed_observed",
                    "passed_opened",
                    "passed_observed",
                ]
            );
        }
    }
}
