use super::money::Money;
use super::points::UserId;
use crate::error::{LedgerKind, Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Frozen,
    Cancelled,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Frozen => "frozen",
            CardStatus::Cancelled => "cancelled",
        }
    }
}

/// Stored-value member card. One active card per user.
///
/// `total_consumption` only ever grows; refunds are tracked separately so that
/// `balance == total_recharge - total_consumption + total_refunded`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MemberCardAccount {
    pub user_id: UserId,
    pub card_number: String,
    pub balance: Money,
    pub total_recharge: Money,
    pub total_consumption: Money,
    pub total_refunded: Money,
    pub status: CardStatus,
    pub activated_at: DateTime<Utc>,
}

impl MemberCardAccount {
    pub fn open(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            card_number: format!("MC{user_id:010}"),
            balance: Money::ZERO,
            total_recharge: Money::ZERO,
            total_consumption: Money::ZERO,
            total_refunded: Money::ZERO,
            status: CardStatus::Active,
            activated_at: now,
        }
    }

    /// Balance usable for new charges. Zero unless the card is active.
    pub fn spendable(&self) -> Money {
        if self.status == CardStatus::Active {
            self.balance
        } else {
            Money::ZERO
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status == CardStatus::Active {
            Ok(())
        } else {
            Err(SettlementError::AccountUnavailable(format!(
                "member card {} is {}",
                self.card_number,
                self.status.as_str()
            )))
        }
    }

    pub fn recharge(&mut self, amount: Money) -> Result<()> {
        self.ensure_active()?;
        if !amount.is_positive() {
            return Err(SettlementError::InvalidAmount(amount.value()));
        }
        let balance = self.balance.checked_add(amount);
        let recharged = self.total_recharge.checked_add(amount);
        match (balance, recharged) {
            (Some(balance), Some(recharged)) => {
                self.balance = balance;
                self.total_recharge = recharged;
                Ok(())
            }
            _ => Err(SettlementError::LedgerInconsistency(format!(
                "balance overflow on card {}",
                self.card_number
            ))),
        }
    }

    /// Consumes stored balance. Never clamps: a short balance is an error.
    pub fn debit(&mut self, amount: Money) -> Result<()> {
        self.ensure_active()?;
        if amount > self.balance {
            return Err(SettlementError::InsufficientBalance {
                ledger: LedgerKind::Card,
                requested: amount.value(),
                available: self.balance.value(),
            });
        }
        self.balance -= amount;
        self.total_consumption += amount;
        Ok(())
    }

    /// Returns consumed balance. Accepted on frozen cards too.
    pub fn credit(&mut self, amount: Money) -> Result<()> {
        let refunded = self.total_refunded + amount;
        if refunded > self.total_consumption {
            return Err(SettlementError::LedgerInconsistency(format!(
                "card {} would be refunded {} but only {} was consumed",
                self.card_number, refunded, self.total_consumption
            )));
        }
        self.total_refunded = refunded;
        self.balance += amount;
        Ok(())
    }

    pub fn freeze(&mut self) {
        if self.status == CardStatus::Active {
            self.status = CardStatus::Frozen;
        }
    }

    pub fn is_consistent(&self) -> bool {
        !self.balance.0.is_sign_negative()
            && self.balance == self.total_recharge - self.total_consumption + self.total_refunded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded(amount: rust_decimal::Decimal) -> MemberCardAccount {
        let mut card = MemberCardAccount::open(3, Utc::now());
        card.recharge(Money::new(amount)).unwrap();
        card
    }

    #[test]
    fn test_card_number_format() {
        let card = MemberCardAccount::open(42, Utc::now());
        assert_eq!(card.card_number, "MC0000000042");
        assert_eq!(card.status, CardStatus::Active);
    }

    #[test]
    fn test_debit_success() {
        let mut card = funded(dec!(100.00));
        card.debit(Money::new(dec!(40.50))).unwrap();
        assert_eq!(card.balance, Money::new(dec!(59.50)));
        assert_eq!(card.total_consumption, Money::new(dec!(40.50)));
        assert!(card.is_consistent());
    }

    #[test]
    fn test_debit_rejected_not_clamped() {
        let mut card = funded(dec!(10));
        let result = card.debit(Money::new(dec!(10.01)));
        assert!(matches!(
            result,
            Err(SettlementError::InsufficientBalance {
                ledger: LedgerKind::Card,
                ..
            })
        ));
        assert_eq!(card.balance, Money::new(dec!(10)));
        assert_eq!(card.total_consumption, Money::ZERO);
    }

    #[test]
    fn test_credit_keeps_consumption_monotonic() {
        let mut card = funded(dec!(50));
        card.debit(Money::new(dec!(40))).unwrap();
        card.credit(Money::new(dec!(40))).unwrap();

        assert_eq!(card.balance, Money::new(dec!(50)));
        assert_eq!(card.total_consumption, Money::new(dec!(40)));
        assert_eq!(card.total_refunded, Money::new(dec!(40)));
        assert!(card.is_consistent());
    }

    #[test]
    fn test_over_refund_is_inconsistency() {
        let mut card = funded(dec!(50));
        card.debit(Money::new(dec!(5))).unwrap();
        assert!(card.credit(Money::new(dec!(6))).unwrap_err().is_fatal());
    }

    #[test]
    fn test_frozen_card() {
        let mut card = funded(dec!(30));
        card.debit(Money::new(dec!(10))).unwrap();
        card.freeze();

        assert_eq!(card.spendable(), Money::ZERO);
        assert!(matches!(
            card.debit(Money::new(dec!(1))),
            Err(SettlementError::AccountUnavailable(_))
        ));
        assert!(matches!(
            card.recharge(Money::new(dec!(1))),
            Err(SettlementError::AccountUnavailable(_))
        ));
        // refunds still land on a frozen card
        card.credit(Money::new(dec!(10))).unwrap();
        assert_eq!(card.balance, Money::new(dec!(30)));
    }
}
