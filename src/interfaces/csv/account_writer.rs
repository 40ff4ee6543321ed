use crate::domain::member_card::{CardStatus, MemberCardAccount};
use crate::domain::points::{PointsAccount, UserId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// Final state of one user's ledgers, as reported on stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountRow {
    pub user: UserId,
    pub points: u64,
    pub points_earned: u64,
    pub points_used: u64,
    pub card_balance: Decimal,
    pub card_recharge: Decimal,
    pub card_consumption: Decimal,
    pub card_refunded: Decimal,
    /// Empty for users without a member card.
    pub card_status: Option<CardStatus>,
}

impl AccountRow {
    fn empty(user: UserId) -> Self {
        Self {
            user,
            points: 0,
            points_earned: 0,
            points_used: 0,
            card_balance: Decimal::ZERO,
            card_recharge: Decimal::ZERO,
            card_consumption: Decimal::ZERO,
            card_refunded: Decimal::ZERO,
            card_status: None,
        }
    }
}

/// Joins points accounts and member cards into one row per user, ordered by
/// user id.
pub fn account_rows(
    points: Vec<PointsAccount>,
    cards: Vec<MemberCardAccount>,
) -> Vec<AccountRow> {
    let mut rows: BTreeMap<UserId, AccountRow> = BTreeMap::new();
    for account in points {
        let row = rows
            .entry(account.user_id)
            .or_insert_with(|| AccountRow::empty(account.user_id));
        row.points = account.current_points;
        row.points_earned = account.total_earned;
        row.points_used = account.total_used;
    }
    for card in cards {
        let row = rows
            .entry(card.user_id)
            .or_insert_with(|| AccountRow::empty(card.user_id));
        row.card_balance = card.balance.value().normalize();
        row.card_recharge = card.total_recharge.value().normalize();
        row.card_consumption = card.total_consumption.value().normalize();
        row.card_refunded = card.total_refunded.value().normalize();
        row.card_status = Some(card.status);
    }
    rows.into_values().collect()
}

/// Writes account rows as CSV with a header line.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, rows: impl IntoIterator<Item = AccountRow>) -> Result<()> {
        let mut wrote_any = false;
        for row in rows {
            self.writer.serialize(row)?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "user",
                "points",
                "points_earned",
                "points_used",
                "card_balance",
                "card_recharge",
                "card_consumption",
                "card_refunded",
                "card_status",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
