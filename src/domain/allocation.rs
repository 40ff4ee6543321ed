use super::money::{Amount, Money};
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// How a charge is covered.
///
/// `points_discount + card_used + gateway_amount == amount`, exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub amount: Money,
    pub points_used: u64,
    pub points_discount: Money,
    pub card_used: Money,
    pub gateway_amount: Money,
    pub fully_paid: bool,
}

impl Allocation {
    /// The portion covered by internal ledgers.
    pub fn ledger_covered(&self) -> Money {
        self.points_discount + self.card_used
    }
}

/// Splits a charge across points, member-card balance and the external gateway.
///
/// Points convert at `points_per_unit` points per currency unit. Ledger-covered
/// portions are truncated to `scale` decimal places; any sub-cent remainder is
/// left on `gateway_amount`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocator {
    points_per_unit: u32,
    scale: u32,
    strict: bool,
}

impl Allocator {
    pub fn new(points_per_unit: u32, scale: u32) -> Result<Self> {
        if points_per_unit == 0 {
            return Err(SettlementError::ValidationError(
                "points conversion rate must be at least 1 point per unit".to_string(),
            ));
        }
        Ok(Self {
            points_per_unit,
            scale,
            strict: false,
        })
    }

    /// In strict mode, asking for more points than the user holds is an error
    /// instead of being clamped.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn points_per_unit(&self) -> u32 {
        self.points_per_unit
    }

    /// Monetary value of `points`, truncated to the currency scale.
    pub fn points_value(&self, points: u64) -> Money {
        let rate = Decimal::from(self.points_per_unit);
        Money::new(Decimal::from(points) / rate).truncate(self.scale)
    }

    /// Fewest points worth at least `value`.
    fn points_for(&self, value: Money) -> u64 {
        value
            .value()
            .checked_mul(Decimal::from(self.points_per_unit))
            .and_then(|points| points.ceil().to_u64())
            .unwrap_or(u64::MAX)
    }

    /// Largest number of points whose value does not exceed `amount`.
    fn points_cap(&self, amount: Decimal) -> u64 {
        amount
            .checked_mul(Decimal::from(self.points_per_unit))
            .and_then(|points| points.floor().to_u64())
            .unwrap_or(u64::MAX)
    }

    pub fn allocate(
        &self,
        amount: Decimal,
        points_available: u64,
        card_balance: Money,
        use_card_balance: bool,
        points_requested: u64,
    ) -> Result<Allocation> {
        let amount = Amount::new(amount)?;

        if self.strict && points_requested > points_available {
            return Err(SettlementError::InsufficientPoints {
                requested: points_requested,
                available: points_available,
            });
        }

        let points_offered = points_requested
            .min(points_available)
            .min(self.points_cap(amount.value()));
        let points_discount = self.points_value(points_offered);
        // only spend the points the truncated discount actually needs
        let points_used = self.points_for(points_discount).min(points_offered);
        let remaining = amount.as_money() - points_discount;

        let card_used = if use_card_balance && card_balance.is_positive() {
            remaining.min(card_balance).truncate(self.scale)
        } else {
            Money::ZERO
        };

        let mut gateway_amount = amount.as_money() - points_discount - card_used;
        if gateway_amount.0.is_sign_negative() {
            gateway_amount = Money::ZERO;
        }

        Ok(Allocation {
            amount: amount.as_money(),
            points_used,
            points_discount,
            card_used,
            gateway_amount,
            fully_paid: gateway_amount.is_zero(),
        })
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self {
            points_per_unit: 10,
            scale: 2,
            strict: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_exact_sum(allocation: &Allocation) {
        assert_eq!(
            allocation.points_discount + allocation.card_used + allocation.gateway_amount,
            allocation.amount
        );
    }

    #[test]
    fn test_points_card_and_gateway_split() {
        let allocation = Allocator::default()
            .allocate(dec!(100), 500, Money::new(dec!(50)), true, 200)
            .unwrap();

        assert_eq!(allocation.points_used, 200);
        assert_eq!(allocation.points_discount, Money::new(dec!(20)));
        assert_eq!(allocation.card_used, Money::new(dec!(50)));
        assert_eq!(allocation.gateway_amount, Money::new(dec!(30)));
        assert!(!allocation.fully_paid);
        assert_exact_sum(&allocation);
    }

    #[test]
    fn test_card_covers_everything() {
        let allocation = Allocator::default()
            .allocate(dec!(30), 0, Money::new(dec!(100)), true, 0)
            .unwrap();

        assert_eq!(allocation.card_used, Money::new(dec!(30)));
        assert_eq!(allocation.gateway_amount, Money::ZERO);
        assert!(allocation.fully_paid);
    }

    #[test]
    fn test_short_card_balance_caps_instead_of_failing() {
        let allocation = Allocator::default()
            .allocate(dec!(100), 0, Money::new(dec!(10)), true, 0)
            .unwrap();

        assert_eq!(allocation.card_used, Money::new(dec!(10)));
        assert_eq!(allocation.gateway_amount, Money::new(dec!(90)));
    }

    #[test]
    fn test_card_not_used_when_opted_out() {
        let allocation = Allocator::default()
            .allocate(dec!(25), 0, Money::new(dec!(100)), false, 0)
            .unwrap();

        assert_eq!(allocation.card_used, Money::ZERO);
        assert_eq!(allocation.gateway_amount, Money::new(dec!(25)));
    }

    #[test]
    fn test_points_clamped_to_available() {
        let allocation = Allocator::default()
            .allocate(dec!(100), 50, Money::ZERO, true, 400)
            .unwrap();

        assert_eq!(allocation.points_used, 50);
        assert_eq!(allocation.points_discount, Money::new(dec!(5)));
        assert_eq!(allocation.gateway_amount, Money::new(dec!(95)));
    }

    #[test]
    fn test_points_clamped_to_amount() {
        let allocation = Allocator::default()
            .allocate(dec!(10.05), 1000, Money::ZERO, true, 1000)
            .unwrap();

        // 100 points cover 10.00; the 0.05 remainder cannot be paid in points
        assert_eq!(allocation.points_used, 100);
        assert_eq!(allocation.points_discount, Money::new(dec!(10)));
        assert_eq!(allocation.gateway_amount, Money::new(dec!(0.05)));
        assert_exact_sum(&allocation);
    }

    #[test]
    fn test_strict_mode_rejects_point_shortfall() {
        let allocator = Allocator::default().strict(true);
        let result = allocator.allocate(dec!(100), 50, Money::ZERO, true, 400);
        assert!(matches!(
            result,
            Err(SettlementError::InsufficientPoints {
                requested: 400,
                available: 50
            })
        ));
    }

    #[test]
    fn test_invalid_amount() {
        let allocator = Allocator::default();
        assert!(matches!(
            allocator.allocate(dec!(0), 0, Money::ZERO, true, 0),
            Err(SettlementError::InvalidAmount(_))
        ));
        assert!(matches!(
            allocator.allocate(dec!(-1), 0, Money::ZERO, true, 0),
            Err(SettlementError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_fractional_remainder_goes_to_gateway() {
        // 3 points per unit: 10 points are worth 3.333.., truncated to 3.33
        let allocator = Allocator::new(3, 2).unwrap();
        let allocation = allocator
            .allocate(dec!(20.005), 10, Money::new(dec!(100)), true, 10)
            .unwrap();

        assert_eq!(allocation.points_discount, Money::new(dec!(3.33)));
        assert_eq!(allocation.card_used, Money::new(dec!(16.67)));
        assert_eq!(allocation.gateway_amount, Money::new(dec!(0.005)));
        assert_exact_sum(&allocation);
    }

    #[test]
    fn test_points_below_currency_precision_are_not_spent() {
        // 1000 points per unit: 1005 points are worth 1.005, truncated to 1.00
        let allocator = Allocator::new(1000, 2).unwrap();
        let allocation = allocator
            .allocate(dec!(5), 1005, Money::ZERO, true, 1005)
            .unwrap();

        assert_eq!(allocation.points_discount, Money::new(dec!(1)));
        assert_eq!(allocation.points_used, 1000);
        assert_eq!(allocation.gateway_amount, Money::new(dec!(4)));
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            Allocator::new(0, 2),
            Err(SettlementError::ValidationError(_))
        ));
    }

    #[test]
    fn test_points_value() {
        let allocator = Allocator::default();
        assert_eq!(allocator.points_value(0), Money::ZERO);
        assert_eq!(allocator.points_value(15), Money::new(dec!(1.5)));
        assert_eq!(allocator.points_value(1), Money::new(dec!(0.1)));
    }
}
