//! Operation dispatcher over the referral-reward state.
//!
//! Every mutating request goes through [`ReferralLedger::apply`], which runs
//! the checks in a fixed order: reentrancy guard, pause gate, role, input
//! validation. Only then is state mutated and the operation's events recorded.

mod query;
mod snapshot;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    access::{AccessControl, Role},
    address::{Address, Amount},
    config::LedgerConfig,
    error::{InvariantViolation, LedgerError},
    events::LedgerEvent,
    pause::{PauseGate, ReentrancyGuard},
    pool::{InMemoryToken, RewardPool, TokenPort},
    referral::ReferralGraph,
    rewards::{BatchEntry, RewardBatch, RewardLedger},
};

pub use query::{Query, QueryResponse, RewardPoolStatus, SystemStats, UserReferralInfo};
pub use snapshot::LedgerSnapshot;

use snapshot::{compute_state_root, StateView};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: Role,
    pub account: Address,
}

/// Initial state handed to [`ReferralLedger::new`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genesis {
    /// Account that custodies the reward pool.
    pub ledger_account: Address,
    /// Receives every role.
    pub admin: Address,
    #[serde(default)]
    pub config: LedgerConfig,
    #[serde(default)]
    pub role_admins: BTreeMap<Role, Role>,
    #[serde(default)]
    pub grants: Vec<RoleGrant>,
    /// Opening balances for the in-memory token.
    #[serde(default)]
    pub token_balances: BTreeMap<Address, Amount>,
}

impl Genesis {
    pub fn new(ledger_account: Address, admin: Address) -> Self {
        Self {
            ledger_account,
            admin,
            config: LedgerConfig::default(),
            role_admins: BTreeMap::new(),
            grants: Vec::new(),
            token_balances: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.ledger_account.is_zero() {
            return Err(LedgerError::InvalidConfig("ledger account is zero".into()));
        }
        if self.admin.is_zero() {
            return Err(LedgerError::InvalidConfig("admin is zero".into()));
        }
        if let Some(grant) = self.grants.iter().find(|g| g.account.is_zero()) {
            return Err(LedgerError::InvalidConfig(format!(
                "{} granted to the zero address",
                grant.role
            )));
        }
        self.config.validate()
    }

    pub fn in_memory_token(&self) -> Result<InMemoryToken, LedgerError> {
        let mut token = InMemoryToken::new(self.ledger_account);
        for (account, amount) in &self.token_balances {
            token.mint(account, *amount)?;
        }
        Ok(token)
    }
}

/// Externally tagged so amounts wider than 64 bits survive JSON decoding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GrantRole {
        role: Role,
        account: Address,
    },
    RevokeRole {
        role: Role,
        account: Address,
    },
    RenounceRole {
        role: Role,
        account: Address,
    },
    UpdateConfig {
        min_claim_amount: Amount,
        max_reward_per_user: Amount,
        max_referrals_per_user: u64,
    },
    SetReferrer {
        referrer: Address,
    },
    BatchAddRewards {
        users: Vec<Address>,
        amounts: Vec<Amount>,
    },
    BatchReduceRewards {
        users: Vec<Address>,
        amounts: Vec<Amount>,
    },
    BatchSetRewards {
        users: Vec<Address>,
        amounts: Vec<Amount>,
    },
    BatchClearRewards {
        users: Vec<Address>,
    },
    ClaimReward,
    FundRewardPool {
        amount: Amount,
    },
    WithdrawFunds {
        amount: Amount,
    },
    Pause,
    Unpause,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GrantRole { .. } => "grantRole",
            Operation::RevokeRole { .. } => "revokeRole",
            Operation::RenounceRole { .. } => "renounceRole",
            Operation::UpdateConfig { .. } => "updateConfig",
            Operation::SetReferrer { .. } => "setReferrer",
            Operation::BatchAddRewards { .. } => "batchAddRewards",
            Operation::BatchReduceRewards { .. } => "batchReduceRewards",
            Operation::BatchSetRewards { .. } => "batchSetRewards",
            Operation::BatchClearRewards { .. } => "batchClearRewards",
            Operation::ClaimReward => "claimReward",
            Operation::FundRewardPool { .. } => "fundRewardPool",
            Operation::WithdrawFunds { .. } => "withdrawFunds",
            Operation::Pause => "pause",
            Operation::Unpause => "unpause",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub height: u64,
    pub caller: Address,
    pub operation: String,
    pub events: Vec<LedgerEvent>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerMeta {
    /// Number of successfully applied operations.
    pub height: u64,
}

pub struct ReferralLedger<T = InMemoryToken> {
    meta: LedgerMeta,
    account: Address,
    access: AccessControl,
    config: LedgerConfig,
    graph: ReferralGraph,
    rewards: RewardLedger,
    pool: RewardPool<T>,
    pause: PauseGate,
    guard: ReentrancyGuard,
    events: Vec<LedgerEvent>,
}

impl ReferralLedger<InMemoryToken> {
    /// Builds a ledger backed by an in-memory token seeded from `genesis.token_balances`.
    pub fn from_genesis(genesis: Genesis) -> Result<Self, LedgerError> {
        let token = genesis.in_memory_token()?;
        Self::new(genesis, token)
    }
}

impl<T: TokenPort> ReferralLedger<T> {
    pub fn new(genesis: Genesis, token: T) -> Result<Self, LedgerError> {
        genesis.validate()?;
        let mut access = AccessControl::new();
        for (role, admin) in &genesis.role_admins {
            access.set_role_admin(*role, *admin);
        }
        let mut events = Vec::new();
        let grants = Role::ALL
            .into_iter()
            .map(|role| RoleGrant {
                role,
                account: genesis.admin,
            })
            .chain(genesis.grants.iter().cloned());
        for grant in grants {
            if access.insert_member(grant.role, grant.account) {
                events.push(LedgerEvent::RoleGranted {
                    role: grant.role,
                    account: grant.account,
                    sender: genesis.admin,
                });
            }
        }
        info!(
            account = %genesis.ledger_account,
            admin = %genesis.admin,
            "referral ledger initialised"
        );
        Ok(Self {
            meta: LedgerMeta::default(),
            account: genesis.ledger_account,
            access,
            config: genesis.config,
            graph: ReferralGraph::new(),
            rewards: RewardLedger::new(),
            pool: RewardPool::new(token),
            pause: PauseGate::default(),
            guard: ReentrancyGuard::default(),
            events,
        })
    }

    /// Applies one operation on behalf of `caller`. On error nothing is changed.
    pub fn apply(&mut self, caller: Address, op: Operation) -> Result<Receipt, LedgerError> {
        let name = op.name();
        debug!(%caller, operation = name, "applying operation");
        let result = self.guard.enter().and_then(|()| {
            let result = self.dispatch(&caller, op);
            self.guard.exit();
            result
        });
        match result {
            Ok(events) => {
                self.meta.height += 1;
                self.events.extend(events.iter().cloned());
                Ok(Receipt {
                    height: self.meta.height,
                    caller,
                    operation: name.to_string(),
                    events,
                })
            }
            Err(err) => {
                warn!(%caller, operation = name, kind = ?err.kind(), error = %err, "operation rejected");
                Err(err)
            }
        }
    }

    fn dispatch(&mut self, caller: &Address, op: Operation) -> Result<Vec<LedgerEvent>, LedgerError> {
        match op {
            Operation::GrantRole { role, account } => self.grant_role(caller, role, account),
            Operation::RevokeRole { role, account } => self.revoke_role(caller, role, account),
            Operation::RenounceRole { role, account } => self.renounce_role(caller, role, account),
            Operation::UpdateConfig {
                min_claim_amount,
                max_reward_per_user,
                max_referrals_per_user,
            } => self.update_config(
                caller,
                min_claim_amount,
                max_reward_per_user,
                max_referrals_per_user,
            ),
            Operation::SetReferrer { referrer } => self.set_referrer(caller, referrer),
            Operation::BatchAddRewards { users, amounts } => {
                self.ensure_reward_manager(caller)?;
                let batch = self
                    .rewards
                    .plan_add(&users, &amounts, self.config.max_reward_per_user)?;
                Ok(self.commit_batch(&batch, |e| LedgerEvent::RewardAdded {
                    user: e.user,
                    amount: e.updated - e.previous,
                    pending: e.updated,
                }))
            }
            Operation::BatchReduceRewards { users, amounts } => {
                self.ensure_reward_manager(caller)?;
                let batch = self.rewards.plan_reduce(&users, &amounts)?;
                Ok(self.commit_batch(&batch, |e| LedgerEvent::RewardReduced {
                    user: e.user,
                    amount: e.previous - e.updated,
                    pending: e.updated,
                }))
            }
            Operation::BatchSetRewards { users, amounts } => {
                self.ensure_reward_manager(caller)?;
                let batch = self
                    .rewards
                    .plan_set(&users, &amounts, self.config.max_reward_per_user)?;
                Ok(self.commit_batch(&batch, |e| LedgerEvent::RewardSet {
                    user: e.user,
                    old: e.previous,
                    new: e.updated,
                }))
            }
            Operation::BatchClearRewards { users } => {
                self.ensure_reward_manager(caller)?;
                let batch = self.rewards.plan_clear(&users)?;
                Ok(self.commit_batch(&batch, |e| LedgerEvent::RewardCleared {
                    user: e.user,
                    amount: e.previous,
                }))
            }
            Operation::ClaimReward => self.claim_reward(caller),
            Operation::FundRewardPool { amount } => self.fund_reward_pool(caller, amount),
            Operation::WithdrawFunds { amount } => self.withdraw_funds(caller, amount),
            Operation::Pause => {
                self.access.check_role(Role::Pauser, caller)?;
                self.pause.pause()?;
                info!(%caller, "ledger paused");
                Ok(vec![LedgerEvent::Paused { account: *caller }])
            }
            Operation::Unpause => {
                self.access.check_role(Role::Pauser, caller)?;
                self.pause.unpause()?;
                info!(%caller, "ledger unpaused");
                Ok(vec![LedgerEvent::Unpaused { account: *caller }])
            }
        }
    }

    fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        if !self.access.grant_role(caller, role, account)? {
            return Ok(vec![]);
        }
        info!(%caller, %account, %role, "role granted");
        Ok(vec![LedgerEvent::RoleGranted {
            role,
            account,
            sender: *caller,
        }])
    }

    fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        if !self.access.revoke_role(caller, role, &account)? {
            return Ok(vec![]);
        }
        info!(%caller, %account, %role, "role revoked");
        Ok(vec![LedgerEvent::RoleRevoked {
            role,
            account,
            sender: *caller,
        }])
    }

    fn renounce_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        if !self.access.renounce_role(caller, role, &account)? {
            return Ok(vec![]);
        }
        info!(%caller, %role, "role renounced");
        Ok(vec![LedgerEvent::RoleRevoked {
            role,
            account,
            sender: *caller,
        }])
    }

    fn update_config(
        &mut self,
        caller: &Address,
        min_claim_amount: Amount,
        max_reward_per_user: Amount,
        max_referrals_per_user: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.access.check_role(Role::Admin, caller)?;
        let config =
            LedgerConfig::from_raw(min_claim_amount, max_reward_per_user, max_referrals_per_user)?;
        let longest = self.graph.longest_list();
        if longest > config.max_referrals_per_user as usize {
            return Err(LedgerError::InvalidConfig(format!(
                "max_referrals_per_user {} is below an existing list of {longest}",
                config.max_referrals_per_user
            )));
        }
        let largest = self.rewards.largest_pending();
        if largest > config.max_reward_per_user {
            return Err(LedgerError::InvalidConfig(format!(
                "max_reward_per_user {} is below an existing pending balance of {largest}",
                config.max_reward_per_user
            )));
        }
        self.config = config;
        info!(%caller, ?config, "config updated");
        Ok(vec![LedgerEvent::ConfigUpdated {
            min_claim_amount: config.min_claim_amount,
            max_reward_per_user: config.max_reward_per_user,
            max_referrals_per_user: config.max_referrals_per_user,
        }])
    }

    fn set_referrer(
        &mut self,
        caller: &Address,
        referrer: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.pause.ensure_not_paused()?;
        let first = self
            .graph
            .link(*caller, referrer, self.config.max_referrals_per_user)?;
        debug!(user = %caller, %referrer, first_referral = first, "referrer set");
        Ok(vec![LedgerEvent::ReferrerSet {
            user: *caller,
            referrer,
        }])
    }

    fn ensure_reward_manager(&self, caller: &Address) -> Result<(), LedgerError> {
        self.pause.ensure_not_paused()?;
        self.access.check_role(Role::RewardManager, caller)
    }

    fn commit_batch<F>(&mut self, batch: &RewardBatch, event: F) -> Vec<LedgerEvent>
    where
        F: Fn(&BatchEntry) -> LedgerEvent,
    {
        self.rewards.commit(batch);
        debug!(
            entries = batch.entries().len(),
            total_pending = %self.rewards.total_pending(),
            "reward batch committed"
        );
        batch.entries().iter().map(event).collect()
    }

    fn claim_reward(&mut self, caller: &Address) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.pause.ensure_not_paused()?;
        let pending = self
            .rewards
            .check_claim(caller, self.config.min_claim_amount)?;
        self.pool.ensure_available(pending)?;

        let settlement = self.rewards.settle_claim(caller)?;
        if let Err(err) = self.pool.pay_out(caller, settlement.amount) {
            self.rewards.revert_claim(&settlement);
            return Err(err);
        }
        info!(user = %caller, amount = %settlement.amount, "reward claimed");
        Ok(vec![LedgerEvent::RewardClaimed {
            user: *caller,
            amount: settlement.amount,
        }])
    }

    fn fund_reward_pool(
        &mut self,
        caller: &Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.pause.ensure_not_paused()?;
        self.access.check_role(Role::FundManager, caller)?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount { index: 0 });
        }
        self.pool.fund(caller, amount)?;
        info!(funder = %caller, %amount, balance = %self.pool.balance(), "reward pool funded");
        Ok(vec![LedgerEvent::RewardPoolFunded {
            funder: *caller,
            amount,
        }])
    }

    /// Not checked against outstanding pending rewards; a withdrawal may leave
    /// the pool short, in which case later claims fail on the balance check.
    fn withdraw_funds(
        &mut self,
        caller: &Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.pause.ensure_not_paused()?;
        self.access.check_role(Role::FundManager, caller)?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount { index: 0 });
        }
        self.pool.withdraw(caller, amount)?;
        let balance = self.pool.balance();
        let pending = self.rewards.total_pending();
        info!(to = %caller, %amount, %balance, "funds withdrawn");
        if balance < pending {
            warn!(%balance, %pending, shortfall = %(pending - balance), "reward pool under-collateralised");
        }
        Ok(vec![])
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn height(&self) -> u64 {
        self.meta.height
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn token(&self) -> &T {
        self.pool.token()
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.access.has_role(role, account)
    }

    pub fn role_admin(&self, role: Role) -> Role {
        self.access.role_admin(role)
    }

    pub fn role_members(&self, role: Role) -> Vec<Address> {
        self.access.role_members(role)
    }

    pub fn referrals(&self, referrer: &Address) -> &[Address] {
        self.graph.referrals(referrer)
    }

    pub fn user_referral_info(&self, user: &Address) -> UserReferralInfo {
        let balance = self.rewards.balance(user);
        UserReferralInfo {
            referrer: self.graph.referrer_of(user),
            referral_count: self.graph.referral_count(user) as u64,
            pending_reward: balance.pending,
            total_claimed: balance.claimed,
        }
    }

    pub fn reward_pool_status(&self) -> RewardPoolStatus {
        let balance = self.pool.balance();
        let counters = self.pool.counters();
        let total_pending_rewards = self.rewards.total_pending();
        RewardPoolStatus {
            balance,
            total_pending_rewards,
            total_claimed_rewards: self.rewards.total_claimed(),
            shortfall: total_pending_rewards.saturating_sub(balance),
            total_funded: counters.total_funded,
            total_withdrawn: counters.total_withdrawn,
            total_paid_out: counters.total_paid_out,
        }
    }

    pub fn system_stats(&self) -> SystemStats {
        SystemStats {
            total_users: self.graph.total_users(),
            total_referrers: self.graph.total_referrers(),
            total_pending_rewards: self.rewards.total_pending(),
            total_claimed_rewards: self.rewards.total_claimed(),
        }
    }

    pub fn query(&self, query: &Query) -> QueryResponse {
        match query {
            Query::Config => QueryResponse::Config(self.config()),
            Query::Referrals { referrer } => {
                QueryResponse::Referrals(self.referrals(referrer).to_vec())
            }
            Query::UserReferralInfo { user } => {
                QueryResponse::UserReferralInfo(self.user_referral_info(user))
            }
            Query::RewardPoolStatus => QueryResponse::RewardPoolStatus(self.reward_pool_status()),
            Query::SystemStats => QueryResponse::SystemStats(self.system_stats()),
            Query::HasRole { role, account } => {
                QueryResponse::HasRole(self.has_role(*role, account))
            }
            Query::RoleAdmin { role } => QueryResponse::RoleAdmin(self.role_admin(*role)),
            Query::RoleMembers { role } => QueryResponse::RoleMembers(self.role_members(*role)),
            Query::Paused => QueryResponse::Paused(self.is_paused()),
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(&StateView {
            config: &self.config,
            access: &self.access,
            graph: &self.graph,
            rewards: &self.rewards,
            pool_balance: self.pool.balance(),
            pool_counters: self.pool.counters(),
            paused: self.pause.is_paused(),
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            account: self.account,
            config: self.config,
            access: self.access.clone(),
            referrals: self.graph.clone(),
            rewards: self.rewards.clone(),
            pool_balance: self.pool.balance(),
            pool_counters: self.pool.counters(),
            paused: self.pause.is_paused(),
            state_root: self.state_root(),
        }
    }

    /// Recomputes the aggregates from the per-entity records.
    pub fn verify_invariants(&self) -> Result<(), InvariantViolation> {
        let (pending, claimed) = self.rewards.recompute_totals();
        if pending != Some(self.rewards.total_pending()) {
            return Err(InvariantViolation::PendingTotal {
                recorded: self.rewards.total_pending(),
                computed: pending,
            });
        }
        if claimed != Some(self.rewards.total_claimed()) {
            return Err(InvariantViolation::ClaimedTotal {
                recorded: self.rewards.total_claimed(),
                computed: claimed,
            });
        }

        let cap = self.config.max_reward_per_user;
        if let Some((user, balance)) = self.rewards.balances().find(|(_, b)| b.pending > cap) {
            return Err(InvariantViolation::PendingAboveCap {
                user: *user,
                pending: balance.pending,
                cap,
            });
        }

        let limit = self.config.max_referrals_per_user;
        let mut referrers = 0u64;
        let mut listed = 0u64;
        for (referrer, list) in self.graph.referral_lists() {
            if list.len() > limit as usize {
                return Err(InvariantViolation::ReferralListTooLong {
                    referrer: *referrer,
                    len: list.len(),
                    limit,
                });
            }
            if !list.is_empty() {
                referrers += 1;
            }
            for user in list {
                listed += 1;
                let points_at = self.graph.referrer_of(user);
                if points_at != Some(*referrer) {
                    return Err(InvariantViolation::ReferralLink {
                        user: *user,
                        listed_under: *referrer,
                        referrer: points_at,
                    });
                }
            }
        }
        let registered = self.graph.referrer_entries().count() as u64;
        if registered != listed || self.graph.total_users() != registered {
            return Err(InvariantViolation::UserCount {
                recorded: self.graph.total_users(),
                actual: listed,
            });
        }
        if self.graph.total_referrers() != referrers {
            return Err(InvariantViolation::ReferrerCount {
                recorded: self.graph.total_referrers(),
                actual: referrers,
            });
        }
        Ok(())
    }
}
