/*!
   Error type used for the tests.
*/

use core::time::Duration;
use eyre::Report;
use flex_error::{define_error, TraceError};
use std::io::Error as IoError;

define_error! {
    Error {
        Generic
            [ TraceError<Report> ]
            | _ | { "generic error" },

        Assertion
            { message: String }
            | e | { format_args!("assertion failure: {}", e.message) },

        Io
            [ TraceError<IoError> ]
            | _ | { "io error"},

        Config
            { message: String }
            | e | { format_args!("invalid test configuration: {}", e.message) },

        KeyFlagsMismatch
            {
                chain_id: String,
                expected: usize,
                actual: usize,
            }
            | e | {
                format_args!(
                    "consumer chain {} has {} copy-provider-key flags, but the provider has {} validators",
                    e.chain_id, e.actual, e.expected
                )
            },

        UnknownChainFamily
            { name: String }
            | e | { format_args!("no chain family is registered for `{}`", e.name) },

        NodeIndex
            {
                chain_id: String,
                index: usize,
                count: usize,
            }
            | e | {
                format_args!("node index {} is out of range for chain {} with {} nodes",
                    e.index, e.chain_id, e.count)
            },

        TxFailed
            {
                chain_id: String,
                code: u32,
                raw_log: String,
            }
            | e | {
                format_args!("transaction on chain {} failed with code {}: {}",
                    e.chain_id, e.code, e.raw_log)
            },

        MissingJsonField
            { path: String }
            | e | { format_args!("expected field `{}` to be present in json output", e.path) },

        MissingEventAttribute
            {
                event: String,
                key: String,
            }
            | e | { format_args!("transaction events contain no `{}.{}` attribute", e.event, e.key) },

        ProposalNotPassed
            {
                proposal_id: u64,
                status: String,
            }
            | e | {
                format_args!("proposal {} ended with status {} instead of passing",
                    e.proposal_id, e.status)
            },

        BlocksAfterHalt
            {
                chain_id: String,
                halt_height: u64,
                height: u64,
            }
            | e | {
                format_args!("chain {} kept producing blocks past halt height {}: observed height {}",
                    e.chain_id, e.halt_height, e.height)
            },

        NotHalted
            {
                chain_id: String,
                halt_height: u64,
                height: u64,
            }
            | e | {
                format_args!("chain {} is not halted at height {}: observed height {}",
                    e.chain_id, e.halt_height, e.height)
            },

        UpgradeFailed
            {
                chain_id: String,
                upgrade_name: String,
            }
            [ TraceError<Report> ]
            | e | {
                format_args!("upgrade {} of chain {} failed", e.upgrade_name, e.chain_id)
            },

        ClientNotFound
            {
                chain_id: String,
                counterparty_chain_id: String,
            }
            | e | {
                format_args!("chain {} has no client tracking counterparty chain {}",
                    e.chain_id, e.counterparty_chain_id)
            },

        ChannelNotFound
            {
                chain_id: String,
                counterparty_chain_id: String,
                port_id: String,
            }
            | e | {
                format_args!("no channel on port {} from chain {} to chain {}",
                    e.port_id, e.chain_id, e.counterparty_chain_id)
            },

        DeadlineExceeded
            {
                task_name: String,
                timeout: Duration,
            }
            | e | {
                format_args!("deadline of {:?} exceeded while waiting for: {}",
                    e.timeout, e.task_name)
            },

        Cancelled
            { task_name: String }
            | e | { format_args!("task cancelled: {}", e.task_name) },

        GateOutOfOrder
            {
                gate: String,
                predecessor: String,
            }
            | e | {
                format_args!("cannot open gate `{}` before gate `{}` is open",
                    e.gate, e.predecessor)
            },

        ProposalAborted
            {
                gate: String,
                reason: String,
            }
            | e | {
                format_args!("stopped waiting for gate `{}` because the proposal was aborted: {}",
                    e.gate, e.reason)
            },

        BackgroundTask
            { task_name: String }
            | e | { format_args!("background task `{}` exited without reporting", e.task_name) },

        PoisonedMutex
            | _ | { "mutex is poisoned" },
    }
}

pub fn handle_generic_error(e: impl Into<Report>) -> Error {
    Error::generic(e.into())
}

impl From<Report> for Error {
    fn from(e: Report) -> Self {
        Error::generic(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::io(e)
    }
}
