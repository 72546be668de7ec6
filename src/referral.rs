use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{address::Address, error::LedgerError};

/// One-level referrer graph: each user points at most once to a referrer,
/// each referrer keeps its referrals in insertion order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReferralGraph {
    referrers: BTreeMap<Address, Address>,
    referrals: BTreeMap<Address, Vec<Address>>,
    total_users: u64,
    total_referrers: u64,
}

impl ReferralGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn referrer_of(&self, user: &Address) -> Option<Address> {
        self.referrers.get(user).copied()
    }

    pub fn referrals(&self, referrer: &Address) -> &[Address] {
        self.referrals
            .get(referrer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn referral_count(&self, referrer: &Address) -> usize {
        self.referrals(referrer).len()
    }

    pub fn total_users(&self) -> u64 {
        self.total_users
    }

    pub fn total_referrers(&self) -> u64 {
        self.total_referrers
    }

    pub fn referrer_entries(&self) -> impl Iterator<Item = (&Address, &Address)> {
        self.referrers.iter()
    }

    pub fn referral_lists(&self) -> impl Iterator<Item = (&Address, &Vec<Address>)> {
        self.referrals.iter()
    }

    /// Length of the longest referral list, 0 when nobody has referrals.
    pub fn longest_list(&self) -> usize {
        self.referrals.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn check_link(
        &self,
        user: &Address,
        referrer: &Address,
        limit: u16,
    ) -> Result<(), LedgerError> {
        if let Some(existing) = self.referrer_of(user) {
            return Err(LedgerError::AlreadyReferred {
                user: *user,
                referrer: existing,
            });
        }
        if referrer.is_zero() || referrer == user {
            return Err(LedgerError::InvalidReferrer {
                referrer: *referrer,
            });
        }
        if self.referral_count(referrer) >= limit as usize {
            return Err(LedgerError::ReferralLimitReached {
                referrer: *referrer,
                limit,
            });
        }
        Ok(())
    }

    /// Records `user -> referrer`. Returns true when `referrer` received its first referral.
    pub fn link(
        &mut self,
        user: Address,
        referrer: Address,
        limit: u16,
    ) -> Result<bool, LedgerError> {
        self.check_link(&user, &referrer, limit)?;
        self.referrers.insert(user, referrer);
        let list = self.referrals.entry(referrer).or_default();
        list.push(user);
        let first = list.len() == 1;
        if first {
            self.total_referrers += 1;
        }
        self.total_users += 1;
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn link_keeps_insertion_order_and_counters() {
        let mut graph = ReferralGraph::new();
        assert!(graph.link(addr(2), addr(1), 5).unwrap());
        assert!(!graph.link(addr(3), addr(1), 5).unwrap());
        assert!(graph.link(addr(4), addr(3), 5).unwrap());

        assert_eq!(graph.referrals(&addr(1)), &[addr(2), addr(3)]);
        assert_eq!(graph.referral_count(&addr(3)), 1);
        assert_eq!(graph.referrer_of(&addr(4)), Some(addr(3)));
        assert_eq!(graph.total_users(), 3);
        assert_eq!(graph.total_referrers(), 2);
    }

    #[test]
    fn referrer_is_write_once() {
        let mut graph = ReferralGraph::new();
        graph.link(addr(2), addr(1), 5).unwrap();
        let err = graph.link(addr(2), addr(3), 5).unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadyReferred {
                user: addr(2),
                referrer: addr(1)
            }
        );
        assert_eq!(graph.referrer_of(&addr(2)), Some(addr(1)));
        assert_eq!(graph.total_users(), 1);
    }

    #[test]
    fn rejects_self_zero_and_full_referrers() {
        let mut graph = ReferralGraph::new();
        assert!(matches!(
            graph.link(addr(2), addr(2), 5),
            Err(LedgerError::InvalidReferrer { .. })
        ));
        assert!(matches!(
            graph.link(addr(2), Address::ZERO, 5),
            Err(LedgerError::InvalidReferrer { .. })
        ));
        graph.link(addr(2), addr(1), 1).unwrap();
        assert_eq!(
            graph.link(addr(3), addr(1), 1).unwrap_err(),
            LedgerError::ReferralLimitReached {
                referrer: addr(1),
                limit: 1
            }
        );
        assert_eq!(graph.referral_count(&addr(1)), 1);
    }
}
