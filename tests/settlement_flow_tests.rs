mod common;

use chrono::Utc;
use petcare_settlement::application::engine::SettlementEngine;
use petcare_settlement::domain::allocation::Allocator;
use petcare_settlement::domain::charge::{Caller, ChargeRequest, ChargeState, RelatedType};
use petcare_settlement::domain::gateway::{GatewayReport, PaymentStatus};
use petcare_settlement::domain::journal::EntryKind;
use petcare_settlement::domain::money::Money;
use petcare_settlement::error::SettlementError;
use petcare_settlement::infrastructure::gateway::{GatewayBehavior, SimulatedGateway};
use petcare_settlement::infrastructure::in_memory;
use rust_decimal_macros::dec;

fn grooming() -> ChargeRequest {
    ChargeRequest::new(dec!(100), "Grooming", RelatedType::Appointment, 17)
        .with_points(500)
        .with_description("full groom, medium dog")
}

#[tokio::test]
async fn test_reverse_restores_balances_for_every_gateway_outcome() {
    for behavior in [
        GatewayBehavior::Pending,
        GatewayBehavior::Paid,
        GatewayBehavior::Failed,
    ] {
        let (engine, _) = common::engine(behavior);
        let caller = Caller::new(1);
        common::fund(&engine, 1, 500, Money::new(dec!(30))).await;

        let payment = engine.charge(&caller, grooming()).await.unwrap();
        engine
            .poll_payment(payment.out_trade_no().unwrap())
            .await
            .unwrap();
        engine
            .reverse(&caller, payment.charge_id(), "appointment cancelled")
            .await
            .unwrap();

        assert_eq!(
            common::balances(&engine, 1).await,
            (500, Money::new(dec!(30))),
            "balances not restored with {behavior:?}"
        );
        let charge = engine.find_charge(&caller, payment.charge_id()).await.unwrap();
        assert!(charge.is_reversed());
        let expected = match behavior {
            GatewayBehavior::Paid => ChargeState::Refunded,
            _ => ChargeState::Voided,
        };
        assert_eq!(charge.state, expected);
    }
}

#[tokio::test]
async fn test_description_reaches_the_gateway() {
    let (engine, gateway) = common::engine(GatewayBehavior::Pending);
    let payment = engine.charge(&Caller::new(1), grooming()).await.unwrap();

    let order = gateway.order(payment.out_trade_no().unwrap()).await.unwrap();
    assert_eq!(order.description.as_deref(), Some("full groom, medium dog"));
    assert_eq!(order.subject, "Grooming");
}

#[tokio::test]
async fn test_journal_records_charge_and_reversal() {
    let (engine, _) = common::engine(GatewayBehavior::Pending);
    let caller = Caller::new(1);
    common::fund(&engine, 1, 500, Money::new(dec!(30))).await;

    let payment = engine.charge(&caller, grooming()).await.unwrap();
    engine
        .reverse(&caller, payment.charge_id(), "no show")
        .await
        .unwrap();

    let journal = engine.ledger().journal(1).await.unwrap();
    let kinds: Vec<EntryKind> = journal.iter().map(|entry| entry.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::PointsEarn,
            EntryKind::CardRecharge,
            EntryKind::PointsUse,
            EntryKind::CardConsume,
            EntryKind::PointsAdjust,
            EntryKind::CardRefund,
        ]
    );
    assert!(
        journal[2..]
            .iter()
            .all(|entry| entry.charge_id == Some(payment.charge_id()))
    );
    assert_eq!(journal[5].reason, "no show");
}

#[tokio::test]
async fn test_cancelled_session_ignores_late_payment() {
    let (engine, _) = common::engine(GatewayBehavior::Pending);
    let caller = Caller::new(1);
    let payment = engine.charge(&caller, grooming()).await.unwrap();
    let out_trade_no = payment.out_trade_no().unwrap().to_string();

    engine
        .reverse(&caller, payment.charge_id(), "owner cancelled")
        .await
        .unwrap();
    let view = engine
        .handle_notification(
            &out_trade_no,
            GatewayReport::Paid {
                paid_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    assert_eq!(view.status, PaymentStatus::Cancelled);
    assert!(view.paid_at.is_none());
    let charge = engine.charge_for_payment(&out_trade_no).await.unwrap();
    assert_eq!(charge.state, ChargeState::Voided);
}

#[tokio::test]
async fn test_charges_listed_in_creation_order() {
    let (engine, _) = common::engine(GatewayBehavior::Pending);
    let caller = Caller::new(6);
    let mut ids = Vec::new();
    for related_id in 1..=3 {
        let request = ChargeRequest::new(dec!(9.90), "Cat food", RelatedType::Product, related_id);
        ids.push(engine.charge(&caller, request).await.unwrap().charge_id());
    }
    engine
        .charge(
            &Caller::new(7),
            ChargeRequest::new(dec!(1), "Treats", RelatedType::Product, 4),
        )
        .await
        .unwrap();

    let listed: Vec<_> = engine
        .charges(&caller)
        .await
        .unwrap()
        .into_iter()
        .map(|charge| charge.charge_id)
        .collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_insufficient_points_in_strict_mode() {
    let engine = SettlementEngine::new(
        in_memory::stores(),
        Box::new(SimulatedGateway::new(GatewayBehavior::Pending)),
        Allocator::default().strict(true),
    );
    common::fund(&engine, 1, 100, Money::ZERO).await;

    let err = engine.charge(&Caller::new(1), grooming()).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InsufficientPoints {
            requested: 500,
            available: 100
        }
    ));
    assert_eq!(common::balances(&engine, 1).await, (100, Money::ZERO));
}
