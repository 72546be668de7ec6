use serde::{Deserialize, Serialize};

use crate::{address::Amount, error::LedgerError};

/// Upper bound on entries in a single batch call.
pub const MAX_BATCH_SIZE: usize = 500;

pub const TOKEN_SCALE: Amount = 1_000_000_000_000_000_000; // 1 token = 1e18 minimal units

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub min_claim_amount: Amount,
    pub max_reward_per_user: Amount,
    pub max_referrals_per_user: u16,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_claim_amount: 1,
            max_reward_per_user: 1_000_000 * TOKEN_SCALE,
            max_referrals_per_user: 100,
        }
    }
}

impl LedgerConfig {
    /// Builds a config from raw update arguments. `max_referrals_per_user`
    /// arrives wider than it is stored and must fit in 16 bits.
    pub fn from_raw(
        min_claim_amount: Amount,
        max_reward_per_user: Amount,
        max_referrals_per_user: u64,
    ) -> Result<Self, LedgerError> {
        let max_referrals_per_user = u16::try_from(max_referrals_per_user).map_err(|_| {
            LedgerError::InvalidConfig(format!(
                "max_referrals_per_user {max_referrals_per_user} does not fit in 16 bits"
            ))
        })?;
        let config = Self {
            min_claim_amount,
            max_reward_per_user,
            max_referrals_per_user,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.min_claim_amount == 0 {
            return Err(LedgerError::InvalidConfig(
                "min_claim_amount must be positive".into(),
            ));
        }
        if self.max_reward_per_user == 0 {
            return Err(LedgerError::InvalidConfig(
                "max_reward_per_user must be positive".into(),
            ));
        }
        if self.min_claim_amount > self.max_reward_per_user {
            return Err(LedgerError::InvalidConfig(format!(
                "min_claim_amount {} exceeds max_reward_per_user {}",
                self.min_claim_amount, self.max_reward_per_user
            )));
        }
        if self.max_referrals_per_user == 0 {
            return Err(LedgerError::InvalidConfig(
                "max_referrals_per_user must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        LedgerConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_referral_limit() {
        let err = LedgerConfig::from_raw(100, 1_000, 70_000).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
        let ok = LedgerConfig::from_raw(100, 1_000, u16::MAX as u64).unwrap();
        assert_eq!(ok.max_referrals_per_user, u16::MAX);
    }

    #[test]
    fn rejects_absurd_values() {
        assert!(LedgerConfig::from_raw(0, 1_000, 5).is_err());
        assert!(LedgerConfig::from_raw(10, 0, 5).is_err());
        assert!(LedgerConfig::from_raw(2_000, 1_000, 5).is_err());
        assert!(LedgerConfig::from_raw(10, 1_000, 0).is_err());
    }
}
