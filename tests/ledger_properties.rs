use std::collections::BTreeMap;

use proptest::prelude::*;

use referral_ledger::{
    Address, Amount, Genesis, LedgerConfig, LedgerError, LedgerEvent, Operation, ReferralLedger,
    Role,
};

const USERS: [u8; 4] = [0xa1, 0xb0, 0xc4, 0xd7];

fn admin() -> Address {
    Address::repeat_byte(0xad)
}

fn user(idx: usize) -> Address {
    Address::repeat_byte(USERS[idx % USERS.len()])
}

fn ledger() -> ReferralLedger {
    let mut genesis = Genesis::new(Address::repeat_byte(0xee), admin());
    genesis.config = LedgerConfig {
        min_claim_amount: 100,
        max_reward_per_user: 1_000,
        max_referrals_per_user: 2,
    };
    genesis.token_balances.insert(admin(), 1_000_000);
    ReferralLedger::from_genesis(genesis).unwrap()
}

fn batch(users: &[usize]) -> Vec<Address> {
    users.iter().map(|idx| user(*idx)).collect()
}

#[derive(Clone, Debug)]
enum Step {
    SetReferrer { caller: usize, referrer: usize },
    Add { users: Vec<usize>, amounts: Vec<Amount> },
    Reduce { users: Vec<usize>, amounts: Vec<Amount> },
    Set { users: Vec<usize>, amounts: Vec<Amount> },
    Clear { users: Vec<usize> },
    Claim { caller: usize },
    Fund { amount: Amount },
    Withdraw { amount: Amount },
    Pause,
    Unpause,
}

impl Step {
    fn into_call(self) -> (Address, Operation) {
        match self {
            Step::SetReferrer { caller, referrer } => (
                user(caller),
                Operation::SetReferrer {
                    referrer: user(referrer),
                },
            ),
            Step::Add { users, amounts } => (
                admin(),
                Operation::BatchAddRewards {
                    users: batch(&users),
                    amounts,
                },
            ),
            Step::Reduce { users, amounts } => (
                admin(),
                Operation::BatchReduceRewards {
                    users: batch(&users),
                    amounts,
                },
            ),
            Step::Set { users, amounts } => (
                admin(),
                Operation::BatchSetRewards {
                    users: batch(&users),
                    amounts,
                },
            ),
            Step::Clear { users } => (
                admin(),
                Operation::BatchClearRewards {
                    users: batch(&users),
                },
            ),
            Step::Claim { caller } => (user(caller), Operation::ClaimReward),
            Step::Fund { amount } => (admin(), Operation::FundRewardPool { amount }),
            Step::Withdraw { amount } => (admin(), Operation::WithdrawFunds { amount }),
            Step::Pause => (admin(), Operation::Pause),
            Step::Unpause => (admin(), Operation::Unpause),
        }
    }
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let idx = 0usize..USERS.len();
    let users = prop::collection::vec(0usize..USERS.len(), 0..4);
    let amounts = prop::collection::vec(0u128..600, 0..4);
    prop_oneof![
        (idx.clone(), idx.clone())
            .prop_map(|(caller, referrer)| Step::SetReferrer { caller, referrer }),
        (users.clone(), amounts.clone()).prop_map(|(users, amounts)| Step::Add { users, amounts }),
        (users.clone(), amounts.clone())
            .prop_map(|(users, amounts)| Step::Reduce { users, amounts }),
        (users.clone(), amounts).prop_map(|(users, amounts)| Step::Set { users, amounts }),
        users.prop_map(|users| Step::Clear { users }),
        idx.prop_map(|caller| Step::Claim { caller }),
        (0u128..800).prop_map(|amount| Step::Fund { amount }),
        (0u128..800).prop_map(|amount| Step::Withdraw { amount }),
        Just(Step::Pause),
        Just(Step::Unpause),
    ]
}

proptest! {
    #[test]
    fn aggregates_match_records_after_any_sequence(
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        let mut ledger = ledger();
        let mut referrers: BTreeMap<Address, Address> = BTreeMap::new();

        for step in steps {
            let (caller, op) = step.into_call();
            let root_before = ledger.state_root();
            let events_before = ledger.events().len();
            match ledger.apply(caller, op) {
                Ok(receipt) => {
                    prop_assert_eq!(receipt.height, ledger.height());
                }
                Err(_) => {
                    prop_assert_eq!(ledger.state_root(), root_before);
                    prop_assert_eq!(ledger.events().len(), events_before);
                }
            }
            prop_assert!(ledger.verify_invariants().is_ok());

            for idx in 0..USERS.len() {
                let info = ledger.user_referral_info(&user(idx));
                prop_assert_eq!(info.referral_count as usize, ledger.referrals(&user(idx)).len());
                if let Some(referrer) = info.referrer {
                    let first = *referrers.entry(user(idx)).or_insert(referrer);
                    prop_assert_eq!(first, referrer);
                }
                prop_assert!(info.pending_reward <= 1_000);
            }
        }
    }

    #[test]
    fn invalid_entry_leaves_whole_batch_unapplied(
        seed in prop::collection::vec(1u128..500, 4),
        bump in prop::collection::vec(1u128..400, 3),
        bad_index in 0usize..4,
    ) {
        let mut ledger = ledger();
        ledger
            .apply(admin(), Operation::BatchAddRewards { users: batch(&[0, 1, 2, 3]), amounts: seed.clone() })
            .unwrap();
        let before: Vec<_> = (0..USERS.len())
            .map(|idx| ledger.user_referral_info(&user(idx)).pending_reward)
            .collect();

        let mut amounts = bump;
        amounts.insert(bad_index, 1_000);
        let err = ledger
            .apply(admin(), Operation::BatchAddRewards { users: batch(&[0, 1, 2, 3]), amounts })
            .unwrap_err();
        let is_cap_error = matches!(err, LedgerError::ExceedsMaxReward { .. });
        prop_assert!(is_cap_error);

        let after: Vec<_> = (0..USERS.len())
            .map(|idx| ledger.user_referral_info(&user(idx)).pending_reward)
            .collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(ledger.system_stats().total_pending_rewards, seed.iter().sum::<u128>());
    }

    #[test]
    fn fund_then_withdraw_restores_pool(prior in 0u128..5_000, amount in 1u128..5_000) {
        let mut ledger = ledger();
        if prior > 0 {
            ledger.apply(admin(), Operation::FundRewardPool { amount: prior }).unwrap();
        }
        let before = ledger.reward_pool_status().balance;
        ledger.apply(admin(), Operation::FundRewardPool { amount }).unwrap();
        ledger.apply(admin(), Operation::WithdrawFunds { amount }).unwrap();
        prop_assert_eq!(ledger.reward_pool_status().balance, before);
    }
}

#[test]
fn clearing_twice_is_a_no_op() {
    let mut ledger = ledger();
    ledger
        .apply(
            admin(),
            Operation::BatchAddRewards {
                users: vec![user(0)],
                amounts: vec![300],
            },
        )
        .unwrap();
    let first = ledger
        .apply(
            admin(),
            Operation::BatchClearRewards {
                users: vec![user(0)],
            },
        )
        .unwrap();
    assert_eq!(
        first.events,
        vec![LedgerEvent::RewardCleared {
            user: user(0),
            amount: 300
        }]
    );
    let root = ledger.state_root();
    let second = ledger
        .apply(
            admin(),
            Operation::BatchClearRewards {
                users: vec![user(0)],
            },
        )
        .unwrap();
    assert_eq!(
        second.events,
        vec![LedgerEvent::RewardCleared {
            user: user(0),
            amount: 0
        }]
    );
    assert_eq!(ledger.state_root(), root);
    assert_eq!(ledger.system_stats().total_pending_rewards, 0);
}

#[test]
fn referral_limit_and_counters() {
    let mut ledger = ledger();
    let referrer = user(3);
    ledger
        .apply(user(0), Operation::SetReferrer { referrer })
        .unwrap();
    ledger
        .apply(user(1), Operation::SetReferrer { referrer })
        .unwrap();
    let err = ledger
        .apply(user(2), Operation::SetReferrer { referrer })
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::ReferralLimitReached { referrer, limit: 2 }
    );
    assert_eq!(
        ledger
            .apply(user(2), Operation::SetReferrer { referrer: user(2) })
            .unwrap_err(),
        LedgerError::InvalidReferrer { referrer: user(2) }
    );
    ledger
        .apply(user(2), Operation::SetReferrer { referrer: user(0) })
        .unwrap();

    let stats = ledger.system_stats();
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.total_referrers, 2);
    assert_eq!(ledger.referrals(&referrer), &[user(0), user(1)]);
}

#[test]
fn reward_manager_lifecycle() {
    let mut ledger = ledger();
    let manager = Address::repeat_byte(0x99);
    let add = Operation::BatchAddRewards {
        users: vec![user(0)],
        amounts: vec![10],
    };
    assert!(matches!(
        ledger.apply(manager, add.clone()),
        Err(LedgerError::Unauthorized { role: Role::RewardManager, .. })
    ));
    ledger
        .apply(
            admin(),
            Operation::GrantRole {
                role: Role::RewardManager,
                account: manager,
            },
        )
        .unwrap();
    ledger.apply(manager, add.clone()).unwrap();
    ledger
        .apply(
            admin(),
            Operation::RevokeRole {
                role: Role::RewardManager,
                account: manager,
            },
        )
        .unwrap();
    assert!(ledger.apply(manager, add).is_err());
    assert_eq!(ledger.user_referral_info(&user(0)).pending_reward, 10);
}
