/*!
   Re-export of common constructs that are used by test cases.
*/

pub use core::time::Duration;
pub use eyre::eyre;
pub use std::sync::Arc;
pub use std::thread::sleep;
pub use tracing::{debug, error, info, warn};

pub use crate::chain::chain_type::ChainFamily;
pub use crate::chain::driver::{ChainDriver, ChainProvisioner};
pub use crate::chain::ext::proposal::ChainProposalMethodsExt;
pub use crate::chain::ext::staking::ChainStakingMethodsExt;
pub use crate::chain::handle::ChainHandle;
pub use crate::error::{handle_generic_error, Error, ErrorDetail};
pub use crate::framework::base::{HasOverrides, TestContext};
pub use crate::framework::downtime::{
    check_downtime_jailing, check_downtime_jailing_with, RestartPolicy,
};
pub use crate::framework::ics::{
    run_interchain_security_test, simulated_network, IcsNetwork, InterchainSecurityTest,
    NetworkBackend,
};
pub use crate::framework::overrides::TestOverrides;
pub use crate::framework::upgrade::{UpgradeReport, UpgradeState, UpgradeVerifier};
pub use crate::relayer::driver::RelayerDriver;
pub use crate::types::config::TestConfig;
pub use crate::types::consumer::{
    ConsumerConfig, ConsumerHook, ConsumerHooks, OnboardingStage, PowerShaping,
};
pub use crate::types::id::ChainId;
pub use crate::types::proposal::ProposalStatus;
pub use crate::util::assert::{assert_eq, assert_not_eq};
pub use crate::util::clock::{Clock, Deadline};
pub use crate::util::suspend::suspend;
