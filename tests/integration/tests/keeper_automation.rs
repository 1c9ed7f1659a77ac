//! Integration test: the settlement keeper watching a live ledger.
//!
//! The keeper is pointed at an `InMemoryLedger` through the `LedgerClient`
//! trait, exactly as the binary points it at the devnet over HTTP.

use std::sync::Arc;
use std::time::Duration;

use keystone_contracts::{ContractError, EscrowCall};
use keystone_core::{EscrowState, Wei};
use keystone_integration_tests::{funded_ledger, Deal, ONE_HOUR};
use keystone_keeper::{ReleaseOutcome, SettlementKeeper};
use keystone_ledger::{InMemoryLedger, LedgerClient, RevertReason};

fn keeper_for(ledger: &Arc<InMemoryLedger>, deal: &Deal, identity: keystone_core::Address) -> SettlementKeeper {
    let client: Arc<dyn LedgerClient> = ledger.clone();
    SettlementKeeper::new(client, identity, deal.registry(), Duration::from_millis(20))
}

async fn funded_deal() -> (Arc<InMemoryLedger>, Deal) {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, Wei::from_ether(2)).await.unwrap();
    deal.escrow_call(ledger.as_ref(), p.buyer, EscrowCall::Deposit, Wei::from_ether(5))
        .await
        .unwrap()
        .into_result()
        .unwrap();
    (ledger, deal)
}

#[tokio::test]
async fn test_keeper_releases_after_external_fulfillment() {
    let (ledger, deal) = funded_deal().await;
    let p = deal.parties;
    let mut keeper = keeper_for(&ledger, &deal, p.seller);
    keeper.start().await.unwrap();

    // Nothing has happened yet
    assert!(keeper.tick().await.unwrap().is_quiet());

    let seller_before = ledger.balance(p.seller).await.unwrap();
    deal.pay_condition(ledger.as_ref(), p.seller, Wei::from_ether(2))
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let report = keeper.tick().await.unwrap();
    assert_eq!(report.events, 1);
    assert_eq!(report.released(), 1);
    assert!(matches!(
        report.attempts[0].outcome,
        ReleaseOutcome::Released { amount: Some(amount), .. } if amount == Wei::from_ether(5)
    ));
    assert_eq!(report.attempts[0].escrow, deal.escrow);

    let snapshot = ledger.escrow(deal.escrow).await.unwrap();
    assert_eq!(snapshot.state(), EscrowState::Released);
    // Seller paid 2 to the beneficiary and received the 5 locked
    let expected = seller_before
        .checked_sub(Wei::from_ether(2))
        .and_then(|b| b.checked_add(Wei::from_ether(5)).ok())
        .unwrap();
    assert_eq!(ledger.balance(p.seller).await.unwrap(), expected);

    assert!(keeper.processed().contains(deal.verifier, deal.condition_id));
    assert!(keeper.tick().await.unwrap().is_quiet());
}

#[tokio::test]
async fn test_keeper_refuses_escrow_it_does_not_control() {
    let (ledger, deal) = funded_deal().await;
    let p = deal.parties;
    let mut keeper = keeper_for(&ledger, &deal, p.outsider);
    keeper.start().await.unwrap();

    deal.pay_condition(ledger.as_ref(), p.seller, Wei::from_ether(2))
        .await
        .unwrap();
    let report = keeper.tick().await.unwrap();
    assert_eq!(
        report.attempts[0].outcome,
        ReleaseOutcome::IdentityMismatch { seller: p.seller }
    );
    assert_eq!(ledger.escrow(deal.escrow).await.unwrap().state(), EscrowState::Funded);

    // The keeper's failure does not block a manual release
    let receipt = deal
        .escrow_call(ledger.as_ref(), p.seller, EscrowCall::Release, Wei::ZERO)
        .await
        .unwrap();
    assert!(receipt.is_success());
}

#[tokio::test]
async fn test_keeper_makes_one_attempt_per_condition() {
    let (ledger, deal) = funded_deal().await;
    let p = deal.parties;
    let add = EscrowCall::AddConditions {
        description: "inspection passed".into(),
    };
    deal.escrow_call(ledger.as_ref(), p.buyer, add, Wei::ZERO).await.unwrap();

    let mut keeper = keeper_for(&ledger, &deal, p.seller);
    keeper.start().await.unwrap();
    deal.pay_condition(ledger.as_ref(), p.seller, Wei::from_ether(2))
        .await
        .unwrap();

    let report = keeper.tick().await.unwrap();
    match &report.attempts[0].outcome {
        ReleaseOutcome::PrecheckFailed {
            reason: RevertReason::Contract(ContractError::ConditionsNotMet(_)),
        } => {}
        other => panic!("expected a failed pre-check, got {other:?}"),
    }
    assert!(keeper.processed().contains(deal.verifier, deal.condition_id));

    // Milestone attested later; the keeper has already spent its attempt
    deal.escrow_call(ledger.as_ref(), p.seller, EscrowCall::FulfillCondition { index: 0 }, Wei::ZERO)
        .await
        .unwrap();
    assert!(keeper.tick().await.unwrap().attempts.is_empty());
    assert_eq!(ledger.escrow(deal.escrow).await.unwrap().state(), EscrowState::Funded);
}

#[tokio::test]
async fn test_keeper_skips_unfunded_escrow() {
    let (ledger, p) = funded_ledger().unwrap();
    let deal = Deal::deploy(ledger.as_ref(), p, ONE_HOUR, Wei(100)).await.unwrap();
    let mut keeper = keeper_for(&ledger, &deal, p.seller);
    keeper.start().await.unwrap();

    deal.pay_condition(ledger.as_ref(), p.seller, Wei(100)).await.unwrap();
    let report = keeper.tick().await.unwrap();
    assert_eq!(
        report.attempts[0].outcome,
        ReleaseOutcome::NotFunded {
            state: EscrowState::Init
        }
    );
}

#[tokio::test]
async fn test_keeper_ignores_history_before_start() {
    let (ledger, deal) = funded_deal().await;
    let p = deal.parties;
    deal.pay_condition(ledger.as_ref(), p.seller, Wei::from_ether(2))
        .await
        .unwrap();

    let mut keeper = keeper_for(&ledger, &deal, p.seller);
    keeper.start().await.unwrap();
    assert!(keeper.tick().await.unwrap().is_quiet());
    assert_eq!(ledger.escrow(deal.escrow).await.unwrap().state(), EscrowState::Funded);
}

#[tokio::test]
async fn test_keeper_run_loop_until_shutdown() {
    let (ledger, deal) = funded_deal().await;
    let p = deal.parties;
    let mut keeper = keeper_for(&ledger, &deal, p.seller);
    keeper.start().await.unwrap();

    deal.pay_condition(ledger.as_ref(), p.seller, Wei::from_ether(2))
        .await
        .unwrap();

    keeper
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(keeper.processed().len(), 1);
    keeper.shutdown();

    assert_eq!(ledger.escrow(deal.escrow).await.unwrap().state(), EscrowState::Released);
}
