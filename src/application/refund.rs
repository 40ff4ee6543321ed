use crate::domain::charge::SettledCharge;
use crate::domain::money::Money;

/// Decides how much captured gateway money goes back on reversal.
///
/// Cancellation fees and partial refunds belong to the business, not to the
/// settlement core, so they plug in here.
pub trait RefundPolicy: Send + Sync {
    /// `captured` is the gateway amount the provider confirmed as paid.
    fn gateway_refund(&self, charge: &SettledCharge, captured: Money) -> Money;
}

/// Refunds everything the gateway captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullRefund;

impl RefundPolicy for FullRefund {
    fn gateway_refund(&self, _charge: &SettledCharge, captured: Money) -> Money {
        captured
    }
}
