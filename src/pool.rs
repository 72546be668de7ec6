use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, Amount},
    error::{LedgerError, TokenError},
};

/// Transfer primitive of the external fungible token, bound to the ledger's own account.
pub trait TokenPort {
    /// Pulls `amount` from `from` into the ledger account.
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TokenError>;
    /// Pushes `amount` from the ledger account to `to`.
    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError>;
    /// Balance held by the ledger account.
    fn balance_of_self(&self) -> Amount;
}

/// Balance-map token used by the replay tool and tests.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InMemoryToken {
    custody: Address,
    balances: BTreeMap<Address, Amount>,
}

impl InMemoryToken {
    pub fn new(custody: Address) -> Self {
        Self {
            custody,
            balances: BTreeMap::new(),
        }
    }

    pub fn custody(&self) -> Address {
        self.custody
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let balance = self.balances.entry(*to).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(TokenError::Overflow { account: *to })?;
        Ok(())
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                balance,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow { account: *to })?;
        self.balances.insert(*from, balance - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl TokenPort for InMemoryToken {
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TokenError> {
        let custody = self.custody;
        self.transfer(from, &custody, amount)
    }

    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let custody = self.custody;
        self.transfer(&custody, to, amount)
    }

    fn balance_of_self(&self) -> Amount {
        self.balance_of(&self.custody)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolCounters {
    pub total_funded: Amount,
    pub total_withdrawn: Amount,
    pub total_paid_out: Amount,
}

/// Custodial payout balance. The balance itself lives in the token; the pool
/// only keeps running counters of what moved through it.
#[derive(Clone, Debug)]
pub struct RewardPool<T> {
    token: T,
    counters: PoolCounters,
}

impl<T: TokenPort> RewardPool<T> {
    pub fn new(token: T) -> Self {
        Self {
            token,
            counters: PoolCounters::default(),
        }
    }

    pub fn balance(&self) -> Amount {
        self.token.balance_of_self()
    }

    pub fn counters(&self) -> PoolCounters {
        self.counters
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn ensure_available(&self, required: Amount) -> Result<(), LedgerError> {
        let available = self.balance();
        if available < required {
            return Err(LedgerError::InsufficientPoolBalance {
                available,
                required,
            });
        }
        Ok(())
    }

    pub fn fund(&mut self, from: &Address, amount: Amount) -> Result<(), LedgerError> {
        let total_funded = self
            .counters
            .total_funded
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("total funded"))?;
        self.token.transfer_in(from, amount)?;
        self.counters.total_funded = total_funded;
        Ok(())
    }

    pub fn withdraw(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_available(amount)?;
        let total_withdrawn = self
            .counters
            .total_withdrawn
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("total withdrawn"))?;
        self.token.transfer_out(to, amount)?;
        self.counters.total_withdrawn = total_withdrawn;
        Ok(())
    }

    pub fn pay_out(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_available(amount)?;
        let total_paid_out = self
            .counters
            .total_paid_out
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("total paid out"))?;
        self.token.transfer_out(to, amount)?;
        self.counters.total_paid_out = total_paid_out;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custody() -> Address {
        Address::repeat_byte(0xee)
    }

    fn manager() -> Address {
        Address::repeat_byte(0x0f)
    }

    fn funded_pool() -> RewardPool<InMemoryToken> {
        let mut token = InMemoryToken::new(custody());
        token.mint(&manager(), 1_000).unwrap();
        RewardPool::new(token)
    }

    #[test]
    fn fund_then_withdraw_restores_balance() {
        let mut pool = funded_pool();
        let before = pool.balance();
        pool.fund(&manager(), 400).unwrap();
        assert_eq!(pool.balance(), before + 400);
        pool.withdraw(&manager(), 400).unwrap();
        assert_eq!(pool.balance(), before);
        assert_eq!(pool.token().balance_of(&manager()), 1_000);
        assert_eq!(pool.counters().total_funded, 400);
        assert_eq!(pool.counters().total_withdrawn, 400);
    }

    #[test]
    fn fund_fails_when_caller_lacks_tokens() {
        let mut pool = funded_pool();
        let err = pool.fund(&manager(), 5_000).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Token(TokenError::InsufficientBalance { .. })
        ));
        assert_eq!(pool.balance(), 0);
        assert_eq!(pool.counters().total_funded, 0);
    }

    #[test]
    fn withdraw_and_pay_out_need_balance() {
        let mut pool = funded_pool();
        pool.fund(&manager(), 100).unwrap();
        assert_eq!(
            pool.withdraw(&manager(), 101).unwrap_err(),
            LedgerError::InsufficientPoolBalance {
                available: 100,
                required: 101
            }
        );
        let alice = Address::repeat_byte(0xa1);
        pool.pay_out(&alice, 60).unwrap();
        assert_eq!(pool.token().balance_of(&alice), 60);
        assert_eq!(pool.balance(), 40);
        assert_eq!(pool.counters().total_paid_out, 60);
    }
}
