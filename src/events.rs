use serde::{Deserialize, Serialize};

use crate::{
    access::Role,
    address::{Address, Amount},
};

/// Serialized as `{"type": .., "data": {..}}`. The tag is written first so
/// the payload deserializes without buffering, which keeps `u128` amounts intact.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LedgerEvent {
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
    ConfigUpdated {
        min_claim_amount: Amount,
        max_reward_per_user: Amount,
        max_referrals_per_user: u16,
    },
    ReferrerSet {
        user: Address,
        referrer: Address,
    },
    RewardAdded {
        user: Address,
        amount: Amount,
        pending: Amount,
    },
    RewardReduced {
        user: Address,
        amount: Amount,
        pending: Amount,
    },
    RewardSet {
        user: Address,
        old: Amount,
        new: Amount,
    },
    RewardCleared {
        user: Address,
        amount: Amount,
    },
    RewardClaimed {
        user: Address,
        amount: Amount,
    },
    RewardPoolFunded {
        funder: Address,
        amount: Amount,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
}
