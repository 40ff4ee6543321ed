use crate::error::{LedgerKind, Result, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type UserId = u64;

/// A user's member points.
///
/// `total_earned - total_used == current_points` holds after every mutation.
/// Reversal credits reduce `total_used` rather than inflating `total_earned`,
/// so a charge followed by its reversal leaves all three counters unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAccount {
    pub user_id: UserId,
    pub current_points: u64,
    pub total_earned: u64,
    pub total_used: u64,
}

/// Snapshot returned to callers asking for their points statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointsStats {
    pub current_points: u64,
    pub total_earned: u64,
    pub total_used: u64,
}

impl PointsAccount {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current_points: 0,
            total_earned: 0,
            total_used: 0,
        }
    }

    pub fn stats(&self) -> PointsStats {
        PointsStats {
            current_points: self.current_points,
            total_earned: self.total_earned,
            total_used: self.total_used,
        }
    }

    /// Append-only credit from the external earning process.
    pub fn earn(&mut self, points: u64) -> Result<()> {
        let earned = self.total_earned.checked_add(points);
        let current = self.current_points.checked_add(points);
        match (earned, current) {
            (Some(earned), Some(current)) => {
                self.total_earned = earned;
                self.current_points = current;
                Ok(())
            }
            _ => Err(SettlementError::LedgerInconsistency(format!(
                "points overflow for user {}",
                self.user_id
            ))),
        }
    }

    /// Spends points. Rejects without side effects if the balance is short.
    pub fn debit(&mut self, points: u64) -> Result<()> {
        if points > self.current_points {
            return Err(SettlementError::InsufficientBalance {
                ledger: LedgerKind::Points,
                requested: Decimal::from(points),
                available: Decimal::from(self.current_points),
            });
        }
        self.current_points -= points;
        self.total_used += points;
        Ok(())
    }

    /// Returns previously spent points.
    ///
    /// Fails only when more points would be returned than were ever used,
    /// which means the bookkeeping is corrupt.
    pub fn credit(&mut self, points: u64) -> Result<()> {
        if points > self.total_used {
            return Err(SettlementError::LedgerInconsistency(format!(
                "user {} would be credited {} points but only {} were used",
                self.user_id, points, self.total_used
            )));
        }
        self.total_used -= points;
        self.current_points += points;
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        self.total_earned.checked_sub(self.total_used) == Some(self.current_points)
    }
}
