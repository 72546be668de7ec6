use serde::{Deserialize, Serialize};

use crate::{
    access::Role,
    address::{Address, Amount},
    config::LedgerConfig,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserReferralInfo {
    pub referrer: Option<Address>,
    pub referral_count: u64,
    pub pending_reward: Amount,
    pub total_claimed: Amount,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardPoolStatus {
    pub balance: Amount,
    pub total_pending_rewards: Amount,
    pub total_claimed_rewards: Amount,
    /// Outstanding pending rewards not covered by the pool balance.
    pub shortfall: Amount,
    pub total_funded: Amount,
    pub total_withdrawn: Amount,
    pub total_paid_out: Amount,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStats {
    pub total_users: u64,
    pub total_referrers: u64,
    pub total_pending_rewards: Amount,
    pub total_claimed_rewards: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    Config,
    Referrals { referrer: Address },
    UserReferralInfo { user: Address },
    RewardPoolStatus,
    SystemStats,
    HasRole { role: Role, account: Address },
    RoleAdmin { role: Role },
    RoleMembers { role: Role },
    Paused,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryResponse {
    Config(LedgerConfig),
    Referrals(Vec<Address>),
    UserReferralInfo(UserReferralInfo),
    RewardPoolStatus(RewardPoolStatus),
    SystemStats(SystemStats),
    HasRole(bool),
    RoleAdmin(Role),
    RoleMembers(Vec<Address>),
    Paused(bool),
}
