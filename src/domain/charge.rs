use super::allocation::Allocation;
use super::gateway::PaymentStatus;
use super::money::Money;
use super::points::UserId;
use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Trusted identity of whoever is acting, resolved upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RelatedType {
    Appointment,
    Boarding,
    Product,
    Order,
}

impl RelatedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedType::Appointment => "appointment",
            RelatedType::Boarding => "boarding",
            RelatedType::Product => "product",
            RelatedType::Order => "order",
        }
    }
}

impl FromStr for RelatedType {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appointment" => Ok(RelatedType::Appointment),
            "boarding" => Ok(RelatedType::Boarding),
            "product" => Ok(RelatedType::Product),
            "order" => Ok(RelatedType::Order),
            other => Err(SettlementError::ValidationError(format!(
                "unknown related type '{other}'"
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    pub related_id: u64,
    pub related_type: RelatedType,
    #[serde(default = "default_true")]
    pub use_card_balance: bool,
    #[serde(default)]
    pub use_points: u64,
}

impl ChargeRequest {
    pub fn new(
        amount: Decimal,
        subject: impl Into<String>,
        related_type: RelatedType,
        related_id: u64,
    ) -> Self {
        Self {
            amount,
            subject: subject.into(),
            description: None,
            related_id,
            related_type,
            use_card_balance: true,
            use_points: 0,
        }
    }

    pub fn with_points(mut self, points: u64) -> Self {
        self.use_points = points;
        self
    }

    pub fn with_card_balance(mut self, use_card_balance: bool) -> Self {
        self.use_card_balance = use_card_balance;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ChargeState {
    /// Ledgers debited, gateway portion not yet confirmed.
    Provisional,
    /// Fully covered internally, or the gateway confirmed payment.
    Committed,
    /// Gateway failed or was cancelled before payment.
    Voided,
    /// Reversed after being committed.
    Refunded,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReversalState {
    #[default]
    NotRequested,
    /// Started but not finished; a later reverse resumes it.
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Reversal {
    pub state: ReversalState,
    pub points_restored: bool,
    pub card_restored: bool,
    pub reason: Option<String>,
    pub gateway_refund: Money,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Durable record of one charge attempt and what it took from each ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledCharge {
    pub charge_id: Uuid,
    pub user_id: UserId,
    pub related_id: u64,
    pub related_type: RelatedType,
    pub subject: String,
    pub allocation: Allocation,
    pub out_trade_no: Option<String>,
    pub gateway_status: Option<PaymentStatus>,
    pub state: ChargeState,
    pub reversal: Reversal,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl SettledCharge {
    pub fn new(
        charge_id: Uuid,
        user_id: UserId,
        request: &ChargeRequest,
        allocation: Allocation,
        now: DateTime<Utc>,
    ) -> Self {
        let fully_paid = allocation.fully_paid;
        Self {
            charge_id,
            user_id,
            related_id: request.related_id,
            related_type: request.related_type,
            subject: request.subject.clone(),
            allocation,
            out_trade_no: None,
            gateway_status: None,
            state: if fully_paid {
                ChargeState::Committed
            } else {
                ChargeState::Provisional
            },
            reversal: Reversal::default(),
            created_at: now,
            committed_at: fully_paid.then_some(now),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == ChargeState::Committed
    }

    pub fn is_reversed(&self) -> bool {
        self.reversal.state == ReversalState::Completed
    }

    pub fn points_to_restore(&self) -> u64 {
        if self.reversal.points_restored {
            0
        } else {
            self.allocation.points_used
        }
    }

    pub fn card_to_restore(&self) -> Money {
        if self.reversal.card_restored {
            Money::ZERO
        } else {
            self.allocation.card_used
        }
    }

    /// Mirrors the session status onto the charge.
    pub fn record_gateway_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        self.gateway_status = Some(status);
        if self.state != ChargeState::Provisional {
            return;
        }
        match status {
            PaymentStatus::Paid => {
                self.state = ChargeState::Committed;
                self.committed_at = Some(now);
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                self.state = ChargeState::Voided;
            }
            PaymentStatus::Pending => {}
        }
    }
}

/// Caller-facing reference to an open gateway session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentHandle {
    pub payment_id: Uuid,
    pub out_trade_no: String,
    pub amount: Money,
    pub pay_url: String,
    pub qr_code: Option<String>,
}

/// Response to a charge: the allocation and, if the gateway is involved,
/// where to send the user to pay the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedPayment {
    pub charge: SettledCharge,
    pub payment: Option<PaymentHandle>,
}

impl CombinedPayment {
    pub fn charge_id(&self) -> Uuid {
        self.charge.charge_id
    }

    pub fn allocation(&self) -> &Allocation {
        &self.charge.allocation
    }

    pub fn fully_paid(&self) -> bool {
        self.charge.allocation.fully_paid
    }

    pub fn out_trade_no(&self) -> Option<&str> {
        self.payment.as_ref().map(|p| p.out_trade_no.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundResult {
    pub charge_id: Uuid,
    pub points_restored: u64,
    pub card_restored: Money,
    pub gateway_status: Option<PaymentStatus>,
    /// Owed back through the external gateway; zero unless it captured money.
    pub gateway_refund: Money,
    /// Everything returned to the user: ledger portion plus gateway refund.
    pub refund_amount: Money,
    pub already_reversed: bool,
    pub reason: String,
}
