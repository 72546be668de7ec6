use serde::{Deserialize, Serialize};

use crate::{
    access::Role,
    address::{Address, Amount},
};

/// Coarse failure classes surfaced to the transaction layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    InvalidInput,
    LimitExceeded,
    InsufficientFunds,
    StateConflict,
    /// Reported by the token collaborator rather than the ledger itself.
    External,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("account {account} holds {balance}, cannot move {requested}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        requested: Amount,
    },
    #[error("token balance overflow for {account}")]
    Overflow { account: Address },
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("account {account} is missing role {role}")]
    Unauthorized { account: Address, role: Role },
    #[error("{caller} can only renounce roles for itself, not for {account}")]
    RenounceForOther { caller: Address, account: Address },

    #[error("batch arrays are empty")]
    EmptyArrays,
    #[error("batch length mismatch: {users} users, {amounts} amounts")]
    LengthMismatch { users: usize, amounts: usize },
    #[error("batch of {len} entries exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
    #[error("zero address at batch index {index}")]
    ZeroAddress { index: usize },
    #[error("cannot grant {role} to the zero address")]
    ZeroGrantee { role: Role },
    #[error("zero amount at batch index {index}")]
    ZeroAmount { index: usize },
    #[error("invalid referrer {referrer}")]
    InvalidReferrer { referrer: Address },
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("pending reward for {user} would reach {resulting}, above the cap of {max} (index {index})")]
    ExceedsMaxReward {
        index: usize,
        user: Address,
        resulting: Amount,
        max: Amount,
    },
    #[error("referrer {referrer} already has {limit} referrals")]
    ReferralLimitReached { referrer: Address, limit: u16 },
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("{user} has {pending} pending, cannot reduce by {requested} (index {index})")]
    InsufficientPendingRewards {
        index: usize,
        user: Address,
        pending: Amount,
        requested: Amount,
    },
    #[error("reward pool holds {available}, {required} required")]
    InsufficientPoolBalance { available: Amount, required: Amount },
    #[error("pending reward {pending} is below the minimum claim of {minimum}")]
    BelowMinimumClaim { pending: Amount, minimum: Amount },

    #[error("{user} already referred by {referrer}")]
    AlreadyReferred { user: Address, referrer: Address },
    #[error("re-entrant call rejected")]
    ReentrantCall,
    #[error("ledger is paused")]
    Paused,
    #[error("ledger is not paused")]
    NotPaused,

    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),
}

/// Mismatch between the running aggregates and the per-user records.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("total pending {recorded} does not match per-user sum {computed:?}")]
    PendingTotal {
        recorded: Amount,
        computed: Option<Amount>,
    },
    #[error("total claimed {recorded} does not match per-user sum {computed:?}")]
    ClaimedTotal {
        recorded: Amount,
        computed: Option<Amount>,
    },
    #[error("{user} is listed under {listed_under} but points at {referrer:?}")]
    ReferralLink {
        user: Address,
        listed_under: Address,
        referrer: Option<Address>,
    },
    #[error("user counter {recorded} does not match {actual} registered users")]
    UserCount { recorded: u64, actual: u64 },
    #[error("referrer counter {recorded} does not match {actual} referrers")]
    ReferrerCount { recorded: u64, actual: u64 },
    #[error("{referrer} has {len} referrals, limit is {limit}")]
    ReferralListTooLong {
        referrer: Address,
        len: usize,
        limit: u16,
    },
    #[error("{user} has {pending} pending, cap is {cap}")]
    PendingAboveCap {
        user: Address,
        pending: Amount,
        cap: Amount,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            Unauthorized { .. } | RenounceForOther { .. } => ErrorKind::Unauthorized,
            EmptyArrays
            | LengthMismatch { .. }
            | BatchTooLarge { .. }
            | ZeroAddress { .. }
            | ZeroGrantee { .. }
            | ZeroAmount { .. }
            | InvalidReferrer { .. }
            | InvalidConfig(_) => ErrorKind::InvalidInput,
            ExceedsMaxReward { .. } | ReferralLimitReached { .. } | ArithmeticOverflow(_) => {
                ErrorKind::LimitExceeded
            }
            InsufficientPendingRewards { .. }
            | InsufficientPoolBalance { .. }
            | BelowMinimumClaim { .. } => ErrorKind::InsufficientFunds,
            AlreadyReferred { .. } | ReentrantCall | Paused | NotPaused => ErrorKind::StateConflict,
            Token(_) => ErrorKind::External,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            LedgerError::Unauthorized {
                account: Address::ZERO,
                role: Role::RewardManager
            }
            .kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(LedgerError::EmptyArrays.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            LedgerError::ReferralLimitReached {
                referrer: Address::ZERO,
                limit: 5
            }
            .kind(),
            ErrorKind::LimitExceeded
        );
        assert_eq!(
            LedgerError::BelowMinimumClaim {
                pending: 50,
                minimum: 100
            }
            .kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(LedgerError::ReentrantCall.kind(), ErrorKind::StateConflict);
        assert_eq!(
            LedgerError::from(TokenError::Rejected("frozen".into())).kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn messages_carry_offending_values() {
        let err = LedgerError::InsufficientPoolBalance {
            available: 10,
            required: 150,
        };
        assert_eq!(err.to_string(), "reward pool holds 10, 150 required");
    }
}
