#![allow(dead_code)]

use petcare_settlement::application::engine::SettlementEngine;
use petcare_settlement::domain::allocation::Allocator;
use petcare_settlement::domain::money::Money;
use petcare_settlement::domain::points::UserId;
use petcare_settlement::infrastructure::gateway::{GatewayBehavior, SimulatedGateway};
use petcare_settlement::infrastructure::in_memory;
use std::io::Write;
use tempfile::NamedTempFile;

pub const HEADER: &str = "type, user, tx, amount, points, use_card, related, detail";

pub fn engine(behavior: GatewayBehavior) -> (SettlementEngine, SimulatedGateway) {
    let gateway = SimulatedGateway::new(behavior);
    let engine = SettlementEngine::new(
        in_memory::stores(),
        Box::new(gateway.clone()),
        Allocator::default(),
    );
    (engine, gateway)
}

pub async fn fund(engine: &SettlementEngine, user: UserId, points: u64, card: Money) {
    if points > 0 {
        engine
            .ledger()
            .earn_points(user, points, "test funding")
            .await
            .unwrap();
    }
    if card.is_positive() {
        engine
            .ledger()
            .recharge_card(user, card, "test funding")
            .await
            .unwrap();
    }
}

/// Current points and card balance of `user`.
pub async fn balances(engine: &SettlementEngine, user: UserId) -> (u64, Money) {
    let points = engine.ledger().points_account(user).await.unwrap();
    let card = engine
        .ledger()
        .card_account(user)
        .await
        .unwrap()
        .map(|card| card.balance)
        .unwrap_or(Money::ZERO);
    (points.current_points, card)
}

/// Writes a command script (header included) to a temporary file.
pub fn script(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}
