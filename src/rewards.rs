//! Per-user pending/claimed balances and their global running sums.
//!
//! Batch mutations are split into a planning step that validates every entry
//! against a staged view of the balances, and a commit step that cannot fail.
//! A rejected batch therefore never touches the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, Amount},
    config::MAX_BATCH_SIZE,
    error::LedgerError,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardBalance {
    pub pending: Amount,
    pub claimed: Amount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    pub user: Address,
    pub previous: Amount,
    pub updated: Amount,
}

/// A fully validated batch; applying it with [`RewardLedger::commit`] is infallible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardBatch {
    entries: Vec<BatchEntry>,
    total_pending: Amount,
}

impl RewardBatch {
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }
}

/// State captured by a claim so a failed payout can be rolled back exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimSettlement {
    pub user: Address,
    pub amount: Amount,
    previous: RewardBalance,
    previous_total_pending: Amount,
    previous_total_claimed: Amount,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardLedger {
    balances: BTreeMap<Address, RewardBalance>,
    total_pending: Amount,
    total_claimed: Amount,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, user: &Address) -> RewardBalance {
        self.balances.get(user).copied().unwrap_or_default()
    }

    pub fn pending(&self, user: &Address) -> Amount {
        self.balance(user).pending
    }

    pub fn total_pending(&self) -> Amount {
        self.total_pending
    }

    pub fn total_claimed(&self) -> Amount {
        self.total_claimed
    }

    pub fn balances(&self) -> impl Iterator<Item = (&Address, &RewardBalance)> {
        self.balances.iter()
    }

    pub fn largest_pending(&self) -> Amount {
        self.balances.values().map(|b| b.pending).max().unwrap_or(0)
    }

    /// Recomputes `(Σ pending, Σ claimed)` from the per-user records.
    pub fn recompute_totals(&self) -> (Option<Amount>, Option<Amount>) {
        let mut pending = Some(0 as Amount);
        let mut claimed = Some(0 as Amount);
        for balance in self.balances.values() {
            pending = pending.and_then(|p| p.checked_add(balance.pending));
            claimed = claimed.and_then(|c| c.checked_add(balance.claimed));
        }
        (pending, claimed)
    }

    pub fn plan_add(
        &self,
        users: &[Address],
        amounts: &[Amount],
        max_per_user: Amount,
    ) -> Result<RewardBatch, LedgerError> {
        validate_shape(users.len(), amounts.len())?;
        self.plan(users, |index, user, current| {
            let amount = amounts[index];
            if amount == 0 {
                return Err(LedgerError::ZeroAmount { index });
            }
            let resulting = current
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow("pending reward"))?;
            if resulting > max_per_user {
                return Err(LedgerError::ExceedsMaxReward {
                    index,
                    user: *user,
                    resulting,
                    max: max_per_user,
                });
            }
            Ok(resulting)
        })
    }

    pub fn plan_reduce(
        &self,
        users: &[Address],
        amounts: &[Amount],
    ) -> Result<RewardBatch, LedgerError> {
        validate_shape(users.len(), amounts.len())?;
        self.plan(users, |index, user, current| {
            let amount = amounts[index];
            if amount == 0 {
                return Err(LedgerError::ZeroAmount { index });
            }
            current
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientPendingRewards {
                    index,
                    user: *user,
                    pending: current,
                    requested: amount,
                })
        })
    }

    pub fn plan_set(
        &self,
        users: &[Address],
        amounts: &[Amount],
        max_per_user: Amount,
    ) -> Result<RewardBatch, LedgerError> {
        validate_shape(users.len(), amounts.len())?;
        self.plan(users, |index, user, _current| {
            let amount = amounts[index];
            if amount > max_per_user {
                return Err(LedgerError::ExceedsMaxReward {
                    index,
                    user: *user,
                    resulting: amount,
                    max: max_per_user,
                });
            }
            Ok(amount)
        })
    }

    pub fn plan_clear(&self, users: &[Address]) -> Result<RewardBatch, LedgerError> {
        validate_shape(users.len(), users.len())?;
        self.plan(users, |_, _, _| Ok(0))
    }

    fn plan<F>(&self, users: &[Address], mut step: F) -> Result<RewardBatch, LedgerError>
    where
        F: FnMut(usize, &Address, Amount) -> Result<Amount, LedgerError>,
    {
        let mut staged: BTreeMap<Address, Amount> = BTreeMap::new();
        let mut total_pending = self.total_pending;
        let mut entries = Vec::with_capacity(users.len());
        for (index, user) in users.iter().enumerate() {
            if user.is_zero() {
                return Err(LedgerError::ZeroAddress { index });
            }
            let previous = staged
                .get(user)
                .copied()
                .unwrap_or_else(|| self.pending(user));
            let updated = step(index, user, previous)?;
            total_pending = total_pending
                .checked_sub(previous)
                .and_then(|t| t.checked_add(updated))
                .ok_or(LedgerError::ArithmeticOverflow("total pending rewards"))?;
            staged.insert(*user, updated);
            entries.push(BatchEntry {
                user: *user,
                previous,
                updated,
            });
        }
        Ok(RewardBatch {
            entries,
            total_pending,
        })
    }

    pub fn commit(&mut self, batch: &RewardBatch) {
        for entry in &batch.entries {
            self.balances.entry(entry.user).or_default().pending = entry.updated;
        }
        self.total_pending = batch.total_pending;
    }

    /// Returns the claimable amount without touching state.
    pub fn check_claim(&self, user: &Address, minimum: Amount) -> Result<Amount, LedgerError> {
        let pending = self.pending(user);
        if pending < minimum {
            return Err(LedgerError::BelowMinimumClaim { pending, minimum });
        }
        Ok(pending)
    }

    /// Moves the user's whole pending balance into claimed.
    pub fn settle_claim(&mut self, user: &Address) -> Result<ClaimSettlement, LedgerError> {
        let previous = self.balance(user);
        let amount = previous.pending;
        let claimed = previous
            .claimed
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("claimed rewards"))?;
        let total_claimed = self
            .total_claimed
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("total claimed rewards"))?;
        let total_pending = self
            .total_pending
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow("total pending rewards"))?;

        let settlement = ClaimSettlement {
            user: *user,
            amount,
            previous,
            previous_total_pending: self.total_pending,
            previous_total_claimed: self.total_claimed,
        };
        self.balances.insert(
            *user,
            RewardBalance {
                pending: 0,
                claimed,
            },
        );
        self.total_pending = total_pending;
        self.total_claimed = total_claimed;
        Ok(settlement)
    }

    pub fn revert_claim(&mut self, settlement: &ClaimSettlement) {
        self.balances.insert(settlement.user, settlement.previous);
        self.total_pending = settlement.previous_total_pending;
        self.total_claimed = settlement.previous_total_claimed;
    }
}

fn validate_shape(users: usize, amounts: usize) -> Result<(), LedgerError> {
    if users == 0 || amounts == 0 {
        return Err(LedgerError::EmptyArrays);
    }
    if users != amounts {
        return Err(LedgerError::LengthMismatch { users, amounts });
    }
    if users > MAX_BATCH_SIZE {
        return Err(LedgerError::BatchTooLarge {
            len: users,
            max: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}
