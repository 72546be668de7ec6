use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    access::{AccessControl, Role},
    address::{Address, Amount},
    config::LedgerConfig,
    pool::PoolCounters,
    referral::ReferralGraph,
    rewards::RewardLedger,
};

use super::LedgerMeta;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: LedgerMeta,
    pub account: Address,
    pub config: LedgerConfig,
    pub access: AccessControl,
    pub referrals: ReferralGraph,
    pub rewards: RewardLedger,
    pub pool_balance: Amount,
    pub pool_counters: PoolCounters,
    pub paused: bool,
    #[serde(with = "hex32")]
    pub state_root: [u8; 32],
}

/// Borrowed view of the state that goes into the root.
pub(crate) struct StateView<'a> {
    pub config: &'a LedgerConfig,
    pub access: &'a AccessControl,
    pub graph: &'a ReferralGraph,
    pub rewards: &'a RewardLedger,
    pub pool_balance: Amount,
    pub pool_counters: PoolCounters,
    pub paused: bool,
}

pub(crate) fn compute_state_root(view: &StateView<'_>) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();

    let mut hasher = Sha256::new();
    hasher.update(b"config");
    hasher.update(view.config.min_claim_amount.to_le_bytes());
    hasher.update(view.config.max_reward_per_user.to_le_bytes());
    hasher.update(view.config.max_referrals_per_user.to_le_bytes());
    leaves.push(hasher.finalize().into());

    for role in Role::ALL {
        let mut hasher = Sha256::new();
        hasher.update(b"role");
        hasher.update(role.id());
        hasher.update(view.access.role_admin(role).id());
        for member in view.access.role_members(role) {
            hasher.update(member.as_bytes());
        }
        leaves.push(hasher.finalize().into());
    }

    for (user, referrer) in view.graph.referrer_entries() {
        let mut hasher = Sha256::new();
        hasher.update(b"referrer");
        hasher.update(user.as_bytes());
        hasher.update(referrer.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (referrer, list) in view.graph.referral_lists() {
        let mut hasher = Sha256::new();
        hasher.update(b"referrals");
        hasher.update(referrer.as_bytes());
        for user in list {
            hasher.update(user.as_bytes());
        }
        leaves.push(hasher.finalize().into());
    }
    for (user, balance) in view.rewards.balances() {
        let mut hasher = Sha256::new();
        hasher.update(b"reward");
        hasher.update(user.as_bytes());
        hasher.update(balance.pending.to_le_bytes());
        hasher.update(balance.claimed.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }

    let mut hasher = Sha256::new();
    hasher.update(b"aggregates");
    hasher.update(view.graph.total_users().to_le_bytes());
    hasher.update(view.graph.total_referrers().to_le_bytes());
    hasher.update(view.rewards.total_pending().to_le_bytes());
    hasher.update(view.rewards.total_claimed().to_le_bytes());
    leaves.push(hasher.finalize().into());

    let mut hasher = Sha256::new();
    hasher.update(b"pool");
    hasher.update(view.pool_balance.to_le_bytes());
    hasher.update(view.pool_counters.total_funded.to_le_bytes());
    hasher.update(view.pool_counters.total_withdrawn.to_le_bytes());
    hasher.update(view.pool_counters.total_paid_out.to_le_bytes());
    hasher.update([view.paused as u8]);
    leaves.push(hasher.finalize().into());

    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"referral-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

pub(crate) mod hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("expected 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_of_single_leaf_is_the_leaf() {
        let leaf = [7u8; 32];
        assert_eq!(build_merkle(vec![leaf]), leaf);
        assert_ne!(build_merkle(vec![leaf, leaf]), leaf);
    }

    #[test]
    fn odd_leaf_counts_duplicate_the_last() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        assert_eq!(build_merkle(vec![a, b, c]), build_merkle(vec![a, b, c, c]));
    }
}
