pub mod proposal;
pub mod staking;
