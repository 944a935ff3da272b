//! Property tests: random call sequences against a deployed contract.
//!
//! After every step:
//! - at most one active escrow per `(initiator, beneficiary)` pair, and the
//!   active-pair index agrees with the records;
//! - direct custody: the contract's DAI and native balances equal the sums
//!   of active escrows in each asset, and no value is created or destroyed;
//! - yield custody: the contract holds nothing itself, its pool position
//!   covers every active claim, each claim covers its principal, and a
//!   finished escrow pays out exactly its claim;
//! - terminal records never change again.

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{Env, START_BALANCE};
use escrow_contracts::{CallContext, CustodyAdapter, EscrowStatus};
use escrow_protocol::{Address, Amount, Asset};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create { from: usize, to: usize, amount: Amount, lock: u64 },
    /// Native escrow; `exact` attaches the full amount, otherwise one less.
    CreateNative { from: usize, to: usize, amount: Amount, lock: u64, exact: bool },
    Approve { caller: usize, id: u64 },
    Cancel { caller: usize, id: u64 },
    Dispute { caller: usize, id: u64 },
    CloseApprove { caller: usize, id: u64 },
    CloseCancel { caller: usize, id: u64 },
    Advance(u64),
    /// A borrower pulls DAI liquidity out of the pool.
    Drain(Amount),
    /// Someone supplies DAI back to the pool.
    Refill(Amount),
}

fn transition_ops() -> impl Strategy<Value = Op> {
    let who = 0usize..3;
    let id = 0u64..12;
    prop_oneof![
        3 => (who.clone(), who.clone(), 1u128..=5_000, 0u64..120)
            .prop_map(|(from, to, amount, lock)| Op::Create { from, to, amount, lock }),
        2 => (who.clone(), who.clone(), 1u128..=5_000, 0u64..120, any::<bool>())
            .prop_map(|(from, to, amount, lock, exact)| Op::CreateNative { from, to, amount, lock, exact }),
        1 => (who.clone(), id.clone()).prop_map(|(caller, id)| Op::Approve { caller, id }),
        1 => (who.clone(), id.clone()).prop_map(|(caller, id)| Op::Cancel { caller, id }),
        1 => (who.clone(), id.clone()).prop_map(|(caller, id)| Op::Dispute { caller, id }),
        1 => (who.clone(), id.clone()).prop_map(|(caller, id)| Op::CloseApprove { caller, id }),
        1 => (who, id).prop_map(|(caller, id)| Op::CloseCancel { caller, id }),
        1 => (1u64..90).prop_map(Op::Advance),
    ]
}

fn yield_ops() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => transition_ops(),
        // Up to 60 days at a time so interest actually accrues.
        2 => (1u64..5_184_000).prop_map(Op::Advance),
        1 => (1u128..=3_000).prop_map(Op::Drain),
        1 => (1u128..=3_000).prop_map(Op::Refill),
    ]
}

fn whale() -> Address {
    Address::from_label("whale")
}

/// Gives the whale enough LINK collateral to borrow any DAI in the pool.
fn fund_whale(env: &mut Env) {
    let (dai, link) = (env.dai, env.link);
    let (pool, bank) = env.chain.pool_and_bank_mut().unwrap();
    let pool_addr = pool.address();
    for token in [dai, link] {
        let t = bank.token_mut(&token).unwrap();
        t.mint(whale(), 100 * START_BALANCE).unwrap();
        t.approve(whale(), pool_addr, Amount::MAX).unwrap();
    }
    pool.supply(bank, link, 100 * START_BALANCE, whale(), whale())
        .unwrap();
}

fn apply(env: &mut Env, accounts: &[Address; 3], op: &Op) {
    let dai = env.dai;
    let c = &mut env.contract;
    let chain = &mut env.chain;
    // Failures are expected; invariants are what matter.
    let _ = match *op {
        Op::Create { from, to, amount, lock } => {
            let unlock = chain.timestamp() + lock;
            c.create_escrow_transaction(chain, &CallContext::new(accounts[from]), accounts[to], dai, amount, unlock)
                .map(|_| ())
        }
        Op::CreateNative { from, to, amount, lock, exact } => {
            let unlock = chain.timestamp() + lock;
            let value = if exact { amount } else { amount - 1 };
            let ctx = CallContext::with_value(accounts[from], value);
            c.create_escrow_transaction(chain, &ctx, accounts[to], Address::ZERO, amount, unlock)
                .map(|_| ())
        }
        Op::Approve { caller, id } => c.approve_escrow_transaction(chain, &CallContext::new(accounts[caller]), id),
        Op::Cancel { caller, id } => c.cancel_escrow_transaction(chain, &CallContext::new(accounts[caller]), id),
        Op::Dispute { caller, id } => c.initiate_dispute(chain, &CallContext::new(accounts[caller]), id),
        Op::CloseApprove { caller, id } => c.close_dispute_and_approve(chain, &CallContext::new(accounts[caller]), id),
        Op::CloseCancel { caller, id } => c.close_dispute_and_cancel(chain, &CallContext::new(accounts[caller]), id),
        Op::Advance(secs) => {
            chain.advance_time(secs).unwrap();
            Ok(())
        }
        Op::Drain(amount) => {
            if let Some((pool, bank)) = chain.pool_and_bank_mut() {
                let _ = pool.borrow(bank, dai, amount, whale());
            }
            Ok(())
        }
        Op::Refill(amount) => {
            if let Some((pool, bank)) = chain.pool_and_bank_mut() {
                let _ = pool.supply(bank, dai, amount, whale(), whale());
            }
            Ok(())
        }
    };
}

fn check_pairs(env: &Env) -> Result<(), TestCaseError> {
    let mut active: BTreeMap<(Address, Address), u64> = BTreeMap::new();
    for tx in env.contract.get_all_escrows_tx() {
        if tx.status.is_active() {
            let previous = active.insert((tx.initiator, tx.beneficiary), tx.id);
            prop_assert!(previous.is_none(), "two active escrows for one pair");
        }
    }
    for tx in env.contract.get_all_escrows_tx() {
        let expected = active.get(&(tx.initiator, tx.beneficiary)).copied().unwrap_or(0);
        prop_assert_eq!(
            env.contract.get_active_escrow_transaction(&tx.initiator, &tx.beneficiary),
            expected
        );
    }
    Ok(())
}

fn check_terminal(env: &Env, terminal: &mut BTreeMap<u64, EscrowStatus>) -> Result<(), TestCaseError> {
    for tx in env.contract.get_all_escrows_tx() {
        if let Some(status) = terminal.get(&tx.id) {
            prop_assert_eq!(*status, tx.status);
        } else if tx.status.is_terminal() {
            terminal.insert(tx.id, tx.status);
        }
    }
    Ok(())
}

fn check_ids(env: &Env) -> Result<(), TestCaseError> {
    // Ids are 1..=counter with no gaps.
    let ids: BTreeSet<u64> = env.contract.get_all_escrows_tx().iter().map(|t| t.id).collect();
    let expected: BTreeSet<u64> = (1..=env.contract.counter_escrow_transactions()).collect();
    prop_assert_eq!(ids, expected);
    prop_assert!(!env.contract.reentrancy_guard().is_entered());
    Ok(())
}

fn check_direct_conservation(env: &Env, accounts: &[Address; 3]) -> Result<(), TestCaseError> {
    let contract = env.contract.address();

    let held = env.dai_of(&contract);
    prop_assert_eq!(held, env.contract.locked_amount(&Asset::Token(env.dai)));
    let circulating: Amount = accounts.iter().map(|a| env.dai_of(a)).sum::<Amount>() + held;
    prop_assert_eq!(circulating, START_BALANCE * 3);

    let held = env.native_of(&contract);
    prop_assert_eq!(held, env.contract.locked_amount(&Asset::Native));
    let circulating: Amount = accounts.iter().map(|a| env.native_of(a)).sum::<Amount>() + held;
    prop_assert_eq!(circulating, START_BALANCE * 3);
    Ok(())
}

/// Current claim of every active escrow.
fn active_claims(env: &Env) -> BTreeMap<u64, Amount> {
    let CustodyAdapter::Yield(custody) = env.contract.custody() else {
        return BTreeMap::new();
    };
    env.contract
        .get_all_escrows_tx()
        .iter()
        .filter(|tx| tx.is_active())
        .filter_map(|tx| custody.claim_of(&env.chain, tx.id).map(|claim| (tx.id, claim)))
        .collect()
}

fn check_yield_backing(env: &Env, claims: &BTreeMap<u64, Amount>) -> Result<(), TestCaseError> {
    let contract = env.contract.address();
    prop_assert_eq!(env.dai_of(&contract), 0);
    prop_assert_eq!(env.native_of(&contract), 0);
    prop_assert_eq!(env.contract.locked_amount(&Asset::Native), 0);

    let active: Vec<_> = env
        .contract
        .get_all_escrows_tx()
        .iter()
        .filter(|tx| tx.is_active())
        .collect();
    prop_assert_eq!(active.len(), claims.len());
    for tx in &active {
        prop_assert!(claims[&tx.id] >= tx.token_amount, "claim below principal");
    }

    // The aggregate position is the sum of per-escrow shares; flooring each
    // share loses under one unit per escrow.
    let claimed: Amount = claims.values().sum();
    let held = env.contract.get_contract_atoken_balance_of(&env.chain, &env.dai);
    prop_assert!(held >= claimed);
    prop_assert!(held - claimed <= claims.len() as Amount);

    let pool = env.chain.pool.as_ref().unwrap();
    let reserve = pool.reserve(&env.dai).unwrap();
    if active.is_empty() {
        prop_assert_eq!(reserve.scaled_balance_of(&contract), 0);
    }
    let liquidity = env.dai_of(&pool.address());
    prop_assert!(liquidity + reserve.total_debt() >= reserve.total_supplied(), "pool under-backed");
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn ledger_invariants_hold_for_any_call_sequence(ops in prop::collection::vec(transition_ops(), 1..60)) {
        let mut env = Env::direct();
        let accounts = [env.alice, env.bob, env.carol];
        let mut terminal: BTreeMap<u64, EscrowStatus> = BTreeMap::new();

        for op in &ops {
            apply(&mut env, &accounts, op);

            check_pairs(&env)?;
            check_direct_conservation(&env, &accounts)?;
            check_terminal(&env, &mut terminal)?;
        }
        check_ids(&env)?;
    }

    #[test]
    fn yield_custody_pays_full_claims(ops in prop::collection::vec(yield_ops(), 1..60)) {
        let mut env = Env::with_yield(500);
        fund_whale(&mut env);
        let accounts = [env.alice, env.bob, env.carol];
        let mut terminal: BTreeMap<u64, EscrowStatus> = BTreeMap::new();

        for op in &ops {
            let claims_before = active_claims(&env);
            let balances_before: Vec<Amount> = accounts.iter().map(|a| env.dai_of(a)).collect();
            let natives_before: Vec<Amount> = accounts.iter().map(|a| env.native_of(a)).collect();
            let counter_before = env.contract.counter_escrow_transactions();

            apply(&mut env, &accounts, op);

            let natives: Vec<Amount> = accounts.iter().map(|a| env.native_of(a)).collect();
            prop_assert_eq!(natives, natives_before);

            // A release pays its recipient exactly the claim it had.
            let mut expected = balances_before;
            for (id, claim) in &claims_before {
                let tx = env.contract.get_escrow_transaction(*id).unwrap();
                let recipient = match tx.status {
                    EscrowStatus::Approved => tx.beneficiary,
                    EscrowStatus::Canceled => tx.initiator,
                    _ => continue,
                };
                let slot = accounts.iter().position(|a| *a == recipient).unwrap();
                expected[slot] += claim;
            }
            if env.contract.counter_escrow_transactions() > counter_before {
                if let Op::Create { from, amount, .. } = *op {
                    expected[from] -= amount;
                }
            }
            let balances: Vec<Amount> = accounts.iter().map(|a| env.dai_of(a)).collect();
            prop_assert_eq!(balances, expected);

            check_pairs(&env)?;
            check_yield_backing(&env, &active_claims(&env))?;
            check_terminal(&env, &mut terminal)?;
        }
        check_ids(&env)?;
    }

    /// Self-escrows are legal and still respect the pair rule.
    #[test]
    fn self_escrow_pairs_are_exclusive(amount in 1u128..=1_000) {
        let mut env = Env::direct();
        let (alice, dai) = (env.alice, env.dai);
        let ctx = CallContext::new(alice);
        let first = env.contract.create_escrow_transaction(&mut env.chain, &ctx, alice, dai, amount, 0);
        prop_assert!(first.is_ok());
        let second = env.contract.create_escrow_transaction(&mut env.chain, &ctx, alice, dai, amount, 0);
        prop_assert!(second.is_err());
        prop_assert_eq!(env.dai_of(&alice), START_BALANCE - amount);
    }
}
