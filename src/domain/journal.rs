use super::points::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    PointsEarn,
    PointsUse,
    /// Points returned by a reversal.
    PointsAdjust,
    CardRecharge,
    CardConsume,
    CardRefund,
}

/// One line of a user's ledger history. `delta` is signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub delta: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub charge_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        user_id: UserId,
        kind: EntryKind,
        delta: Decimal,
        balance_after: Decimal,
        reason: impl Into<String>,
        charge_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            delta,
            balance_after,
            reason: reason.into(),
            charge_id,
            created_at: Utc::now(),
        }
    }
}
