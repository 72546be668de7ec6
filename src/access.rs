//! Role membership and role administration.
//!
//! Every role is governed by exactly one admin role. Unless overridden at
//! genesis that is [`Role::DefaultAdmin`], which also governs itself.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{address::Address, error::LedgerError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    DefaultAdmin,
    Admin,
    FundManager,
    Pauser,
    RewardManager,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::DefaultAdmin,
        Role::Admin,
        Role::FundManager,
        Role::Pauser,
        Role::RewardManager,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Role::DefaultAdmin => "DEFAULT_ADMIN_ROLE",
            Role::Admin => "ADMIN_ROLE",
            Role::FundManager => "FUND_MANAGER_ROLE",
            Role::Pauser => "PAUSER_ROLE",
            Role::RewardManager => "REWARD_MANAGER_ROLE",
        }
    }

    /// 32-byte role identifier. The default admin role is all zeroes.
    pub fn id(&self) -> [u8; 32] {
        match self {
            Role::DefaultAdmin => [0u8; 32],
            other => Sha256::digest(other.name().as_bytes()).into(),
        }
    }

    pub fn from_id(id: &[u8; 32]) -> Option<Role> {
        Role::ALL.into_iter().find(|role| &role.id() == id)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<Address>>,
    admins: BTreeMap<Role, Role>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .is_some_and(|set| set.contains(account))
    }

    pub fn role_admin(&self, role: Role) -> Role {
        self.admins.get(&role).copied().unwrap_or(Role::DefaultAdmin)
    }

    pub fn role_members(&self, role: Role) -> Vec<Address> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn check_role(&self, role: Role, account: &Address) -> Result<(), LedgerError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                account: *account,
                role,
            })
        }
    }

    /// Unchecked reassignment of a role's admin, only used while building genesis.
    pub(crate) fn set_role_admin(&mut self, role: Role, admin: Role) {
        if admin == Role::DefaultAdmin {
            self.admins.remove(&role);
        } else {
            self.admins.insert(role, admin);
        }
    }

    /// Unchecked grant, only used while building genesis. Returns whether membership changed.
    pub(crate) fn insert_member(&mut self, role: Role, account: Address) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    /// Returns whether `account` was newly added.
    pub fn grant_role(
        &mut self,
        sender: &Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.check_role(self.role_admin(role), sender)?;
        if account.is_zero() {
            return Err(LedgerError::ZeroGrantee { role });
        }
        Ok(self.insert_member(role, account))
    }

    /// Returns whether `account` actually held the role.
    pub fn revoke_role(
        &mut self,
        sender: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, LedgerError> {
        self.check_role(self.role_admin(role), sender)?;
        Ok(self.remove_member(role, account))
    }

    pub fn renounce_role(
        &mut self,
        sender: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, LedgerError> {
        if sender != account {
            return Err(LedgerError::RenounceForOther {
                caller: *sender,
                account: *account,
            });
        }
        Ok(self.remove_member(role, account))
    }

    fn remove_member(&mut self, role: Role, account: &Address) -> bool {
        let Some(set) = self.members.get_mut(&role) else {
            return false;
        };
        let removed = set.remove(account);
        if set.is_empty() {
            self.members.remove(&role);
        }
        removed
    }
}
