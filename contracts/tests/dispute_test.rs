//! Integration tests for the dispute path.
//!
//! Either party can freeze an escrow in `Dispute`; only the initiator can
//! close it, either releasing to the beneficiary (after the unlock time) or
//! refunding themselves.

mod common;

use common::{Env, START_BALANCE};
use escrow_contracts::{CallContext, EscrowError, EscrowEvent, EscrowStatus};

#[test]
fn beneficiary_disputes_and_initiator_closes_after_unlock() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 60);
    let alice = CallContext::new(env.alice);
    let bob = CallContext::new(env.bob);

    env.contract
        .initiate_dispute(&mut env.chain, &bob, id)
        .unwrap();
    assert_eq!(
        env.contract.get_escrow_transaction(id).unwrap().status,
        EscrowStatus::Dispute
    );
    // Still active: the pair stays blocked and funds stay in custody.
    assert_eq!(env.contract.get_active_escrow_transaction(&env.alice, &env.bob), id);
    assert_eq!(
        env.contract.get_contract_balance_of(&env.chain, &env.dai).unwrap(),
        100
    );

    let err = env
        .contract
        .close_dispute_and_approve(&mut env.chain, &bob, id)
        .unwrap_err();
    assert_eq!(err, EscrowError::OnlyEscrowTxInitiatorAllowed);

    let err = env
        .contract
        .close_dispute_and_approve(&mut env.chain, &alice, id)
        .unwrap_err();
    assert!(matches!(err, EscrowError::UnlockTimeNotReached { .. }));

    env.advance(60);
    env.contract
        .close_dispute_and_approve(&mut env.chain, &alice, id)
        .unwrap();
    assert_eq!(env.dai_of(&env.bob), START_BALANCE + 100);
    assert_eq!(
        env.contract.get_escrow_transaction(id).unwrap().status,
        EscrowStatus::Approved
    );
    assert_eq!(env.contract.get_active_escrow_transaction(&env.alice, &env.bob), 0);
}

#[test]
fn initiator_can_dispute_too() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 60);
    env.contract
        .initiate_dispute(&mut env.chain, &CallContext::new(env.alice), id)
        .unwrap();
    assert_eq!(
        env.contract.get_escrow_transaction(id).unwrap().status,
        EscrowStatus::Dispute
    );
}

#[test]
fn stranger_cannot_dispute() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 60);
    let err = env
        .contract
        .initiate_dispute(&mut env.chain, &CallContext::new(env.carol), id)
        .unwrap_err();
    assert_eq!(err, EscrowError::OnlyEscrowTxPartiesAllowed);
}

#[test]
fn close_dispute_and_cancel_refunds_without_waiting() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 3_600);
    let alice = CallContext::new(env.alice);
    env.contract
        .initiate_dispute(&mut env.chain, &CallContext::new(env.bob), id)
        .unwrap();

    let err = env
        .contract
        .close_dispute_and_cancel(&mut env.chain, &CallContext::new(env.bob), id)
        .unwrap_err();
    assert_eq!(err, EscrowError::OnlyEscrowTxInitiatorAllowed);

    env.contract
        .close_dispute_and_cancel(&mut env.chain, &alice, id)
        .unwrap();
    assert_eq!(env.dai_of(&env.alice), START_BALANCE);
    assert_eq!(
        env.contract.get_escrow_transaction(id).unwrap().status,
        EscrowStatus::Canceled
    );
}

#[test]
fn disputed_escrow_leaves_created_only_paths_closed() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 0);
    let alice = CallContext::new(env.alice);
    env.contract
        .initiate_dispute(&mut env.chain, &alice, id)
        .unwrap();

    let dispute = EscrowError::IncorrectEscrowTxStatus(EscrowStatus::Dispute);
    assert_eq!(
        env.contract.approve_escrow_transaction(&mut env.chain, &alice, id),
        Err(dispute.clone())
    );
    assert_eq!(
        env.contract.cancel_escrow_transaction(&mut env.chain, &alice, id),
        Err(dispute.clone())
    );
    assert_eq!(
        env.contract.initiate_dispute(&mut env.chain, &alice, id),
        Err(dispute)
    );
}

#[test]
fn close_dispute_requires_dispute_status() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 0);
    let alice = CallContext::new(env.alice);
    assert_eq!(
        env.contract.close_dispute_and_approve(&mut env.chain, &alice, id),
        Err(EscrowError::IncorrectEscrowTxStatus(EscrowStatus::Created))
    );
    assert_eq!(
        env.contract.close_dispute_and_cancel(&mut env.chain, &alice, id),
        Err(EscrowError::IncorrectEscrowTxStatus(EscrowStatus::Created))
    );
}

#[test]
fn dispute_events_in_order() {
    let mut env = Env::direct();
    let id = env.create_dai(100, 0);
    let alice = CallContext::new(env.alice);
    env.contract
        .initiate_dispute(&mut env.chain, &CallContext::new(env.bob), id)
        .unwrap();
    env.contract
        .close_dispute_and_cancel(&mut env.chain, &alice, id)
        .unwrap();

    let names: Vec<_> = env.contract.events().iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        ["TransactionCreated", "TransactionDisputed", "TransactionCanceled"]
    );
    assert_eq!(
        env.contract.events()[2].event,
        EscrowEvent::TransactionCanceled { id }
    );
}
