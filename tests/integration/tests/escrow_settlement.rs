//! Integration test: escrow settlement against the in-memory ledger.
//!
//! Drives the escrow and verifier contracts through real transactions and
//! checks balances, states and emitted events end to end.

use keystone_contracts::{ContractError, ContractEvent, EscrowCall, EscrowEvent, VerifierEvent};
use keystone_core::{EscrowState, Wei};
use keystone_integration_tests::{funded_ledger, Deal, ONE_HOUR};
use keystone_ledger::LedgerClient;

fn half_ether() -> Wei {
    Wei(Wei::PER_ETHER / 2)
}

// =========================================================================
// Release
// =========================================================================

#[tokio::test]
async fn test_full_release_flow() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();

    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.state(), EscrowState::Init);
    assert_eq!(snapshot.amount(), Wei::ZERO);
    assert_eq!(snapshot.get_num_conditions(), 0);

    // Buyer funds
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();
    assert!(receipt.is_success());
    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.state(), EscrowState::Funded);
    assert_eq!(snapshot.amount(), Wei::from_ether(1));
    assert_eq!(ledger.balance(deal.escrow).await.unwrap(), Wei::from_ether(1));

    // Milestone added and attested
    let add = EscrowCall::AddConditions {
        description: "delivery confirmed".into(),
    };
    assert!(deal.escrow_call(ledger.as_ref(), p.buyer, add, Wei::ZERO).await.unwrap().is_success());
    let fulfill = EscrowCall::FulfillCondition { index: 0 };
    assert!(deal
        .escrow_call(ledger.as_ref(), p.seller, fulfill, Wei::ZERO)
        .await
        .unwrap()
        .is_success());
    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.get_condition(0).unwrap(), ("delivery confirmed".to_string(), true));

    // Seller pays the external condition; funds go straight to the beneficiary
    let beneficiary_before = ledger.balance(p.beneficiary).await.unwrap();
    let receipt = deal.pay_condition(ledger.as_ref(), p.seller, half_ether()).await.unwrap();
    assert!(receipt.is_success());
    let events: Vec<&ContractEvent> = receipt.events().collect();
    assert_eq!(
        events,
        vec![
            &ContractEvent::Verifier(VerifierEvent::ConditionFulfilled {
                condition_id: deal.condition_id
            }),
            &ContractEvent::Verifier(VerifierEvent::EthForwarded {
                beneficiary: p.beneficiary,
                amount: half_ether()
            }),
        ]
    );
    assert_eq!(
        ledger.balance(p.beneficiary).await.unwrap(),
        beneficiary_before.checked_add(half_ether()).unwrap()
    );
    assert_eq!(ledger.balance(deal.verifier).await.unwrap(), Wei::ZERO);

    // Seller releases
    let seller_before = ledger.balance(p.seller).await.unwrap();
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(receipt.is_success(), "release reverted: {:?}", receipt.revert_reason());
    assert!(receipt.events().any(|e| matches!(
        e,
        ContractEvent::Escrow(EscrowEvent::Released { seller, amount })
            if *seller == p.seller && *amount == Wei::from_ether(1)
    )));

    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.state(), EscrowState::Released);
    assert_eq!(snapshot.amount(), Wei::ZERO);
    assert_eq!(ledger.balance(deal.escrow).await.unwrap(), Wei::ZERO);
    assert_eq!(
        ledger.balance(p.seller).await.unwrap(),
        seller_before.checked_add(Wei::from_ether(1)).unwrap()
    );
}

#[tokio::test]
async fn test_release_without_external_payment_fails() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();

    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(matches!(receipt.contract_error(), Some(ContractError::ConditionsNotMet(_))));

    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.state(), EscrowState::Funded);
    assert_eq!(ledger.balance(deal.escrow).await.unwrap(), Wei::from_ether(1));
}

#[tokio::test]
async fn test_release_with_partial_internal_conditions_fails() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();
    for description in ["goods shipped", "goods received"] {
        let add = EscrowCall::AddConditions {
            description: description.into(),
        };
        deal.escrow_call(ledger.as_ref(), p.buyer, add, Wei::ZERO).await.unwrap();
    }
    deal.escrow_call(ledger.as_ref(), p.seller, EscrowCall::FulfillCondition { index: 0 }, Wei::ZERO)
        .await
        .unwrap();
    assert!(deal.pay_condition(ledger.as_ref(), p.seller, half_ether()).await.unwrap().is_success());

    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    match receipt.contract_error() {
        Some(ContractError::ConditionsNotMet(reason)) => assert!(reason.contains("[1]"), "{reason}"),
        other => panic!("expected ConditionsNotMet, got {other:?}"),
    }

    // Fulfilling the last milestone unblocks it
    deal.escrow_call(ledger.as_ref(), p.seller, EscrowCall::FulfillCondition { index: 1 }, Wei::ZERO)
        .await
        .unwrap();
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(receipt.is_success());
}

#[tokio::test]
async fn test_condition_created_by_other_party_does_not_unlock() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();

    // The outsider's condition on the same verifier gets id 2 and is paid,
    // but this escrow is bound to id 1 created by the buyer.
    let create = keystone_contracts::VerifierCall::CreateEthDepositCondition {
        beneficiary: p.beneficiary,
        required_amount: Wei(1),
    };
    ledger
        .send_transaction(keystone_ledger::Transaction::verifier(p.outsider, deal.verifier, create))
        .await
        .unwrap();
    let pay = keystone_contracts::VerifierCall::DepositEth { condition_id: 2 };
    let receipt = ledger
        .send_transaction(keystone_ledger::Transaction::verifier(p.outsider, deal.verifier, pay).with_value(Wei(1)))
        .await
        .unwrap();
    assert!(receipt.is_success());

    assert!(!ledger
        .verify_condition_for_parties(deal.verifier, 2, p.buyer, p.beneficiary)
        .await
        .unwrap());
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(matches!(receipt.contract_error(), Some(ContractError::ConditionsNotMet(_))));
}

// =========================================================================
// Deposit rules
// =========================================================================

#[tokio::test]
async fn test_second_deposit_rejected_for_anyone() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();

    let again = deal
        .escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();
    assert!(matches!(again.contract_error(), Some(ContractError::InvalidState(_))));

    for caller in [p.outsider, p.seller] {
        let late = deal
            .escrow_call(ledger.as_ref(), caller, EscrowCall::Deposit, Wei::from_ether(1))
            .await
            .unwrap();
        assert!(
            matches!(late.contract_error(), Some(ContractError::InvalidState(_))),
            "{:?}",
            late.revert_reason()
        );
    }

    assert_eq!(ledger.balance(deal.escrow).await.unwrap(), Wei::from_ether(1));
    assert_eq!(ledger.balance(p.buyer).await.unwrap(), Wei::from_ether(99));
}

// =========================================================================
// Refund timing
// =========================================================================

#[tokio::test]
async fn test_refund_timeout_boundary() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();

    ledger.advance_time(ONE_HOUR - 1).unwrap();
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Refund, Wei::ZERO)
        .await
        .unwrap();
    assert!(matches!(receipt.contract_error(), Some(ContractError::TimeoutNotElapsed { .. })));

    // Exactly at the deadline a refund is still refused
    ledger.advance_time(1).unwrap();
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Refund, Wei::ZERO)
        .await
        .unwrap();
    assert!(matches!(receipt.contract_error(), Some(ContractError::TimeoutNotElapsed { .. })));

    ledger.advance_time(1).unwrap();
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Refund, Wei::ZERO)
        .await
        .unwrap();
    assert!(receipt.is_success(), "refund reverted: {:?}", receipt.revert_reason());

    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.state(), EscrowState::Refunded);
    assert_eq!(ledger.balance(p.buyer).await.unwrap(), Wei::from_ether(100));

    // Terminal: release is now a state error
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(matches!(receipt.contract_error(), Some(ContractError::InvalidState(_))));
}

#[tokio::test]
async fn test_refund_blocked_once_releasable() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, half_ether()).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(1))
        .await
        .unwrap();
    deal.pay_condition(ledger.as_ref(), p.seller, half_ether()).await.unwrap();
    ledger.advance_time(ONE_HOUR + 1).unwrap();

    let receipt = deal
        .escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Refund, Wei::ZERO)
        .await
        .unwrap();
    assert!(matches!(receipt.contract_error(), Some(ContractError::ConditionsNotMet(_))));

    // The seller can still settle after the timeout
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(receipt.is_success());
}

// =========================================================================
// External condition accumulation
// =========================================================================

#[tokio::test]
async fn test_verifier_deposits_accumulate() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, Wei::from_ether(1)).await.unwrap();

    let first = deal.pay_condition(ledger.as_ref(), p.seller, half_ether()).await.unwrap();
    assert!(first.is_success());
    assert_eq!(first.logs.len(), 0);
    let condition = ledger.verifier_condition(deal.verifier, deal.condition_id).await.unwrap();
    assert!(!condition.fulfilled);
    assert_eq!(condition.received_amount, half_ether());
    assert_eq!(ledger.balance(deal.verifier).await.unwrap(), half_ether());

    let second = deal.pay_condition(ledger.as_ref(), p.outsider, half_ether()).await.unwrap();
    assert!(second.is_success());
    assert_eq!(
        second
            .events()
            .filter(|e| matches!(e, ContractEvent::Verifier(VerifierEvent::EthForwarded { .. })))
            .count(),
        1
    );
    let condition = ledger.verifier_condition(deal.verifier, deal.condition_id).await.unwrap();
    assert!(condition.fulfilled);
    assert_eq!(condition.fulfilled_at, Some(keystone_integration_tests::GENESIS_TIME));
    assert_eq!(ledger.balance(deal.verifier).await.unwrap(), Wei::ZERO);

    let late = deal.pay_condition(ledger.as_ref(), p.seller, Wei(1)).await.unwrap();
    assert!(matches!(late.contract_error(), Some(ContractError::AlreadyFulfilled(_))));
}
