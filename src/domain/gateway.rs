use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// Something that can move a session out of `pending`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The gateway captured the money.
    Paid { paid_at: DateTime<Utc> },
    /// The gateway reported failure or timed the payment out.
    Failed { reason: String },
    /// The caller gave up before the gateway confirmed.
    Cancelled,
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied(PaymentStatus),
    /// Session was already terminal; the event had no effect.
    Ignored(PaymentStatus),
}

impl Transition {
    pub fn status(&self) -> PaymentStatus {
        match self {
            Transition::Applied(status) | Transition::Ignored(status) => *status,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// One attempt at collecting the gateway portion of a charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySession {
    pub payment_id: Uuid,
    pub out_trade_no: String,
    pub charge_id: Uuid,
    /// Only the gateway portion, never the full charge amount.
    pub amount: Money,
    pub subject: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl GatewaySession {
    pub fn open(
        out_trade_no: String,
        charge_id: Uuid,
        amount: Money,
        subject: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id: Uuid::new_v4(),
            out_trade_no,
            charge_id,
            amount,
            subject,
            status: PaymentStatus::Pending,
            failure_reason: None,
            created_at: now,
            paid_at: None,
            closed_at: None,
        }
    }

    pub fn apply(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Transition {
        if self.status.is_terminal() {
            return Transition::Ignored(self.status);
        }
        match event {
            SessionEvent::Paid { paid_at } => {
                self.status = PaymentStatus::Paid;
                self.paid_at = Some(paid_at);
            }
            SessionEvent::Failed { reason } => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(reason);
            }
            SessionEvent::Cancelled => {
                self.status = PaymentStatus::Cancelled;
            }
        }
        self.closed_at = Some(now);
        Transition::Applied(self.status)
    }

    pub fn status_view(&self) -> PaymentStatusView {
        PaymentStatusView {
            out_trade_no: self.out_trade_no.clone(),
            status: self.status,
            amount: self.amount,
            created_at: self.created_at,
            paid_at: self.paid_at,
        }
    }
}

/// Caller-facing status of a payment, keyed by `out_trade_no`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStatusView {
    pub out_trade_no: String,
    pub status: PaymentStatus,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Merchant order reference: creation timestamp followed by 12 random hex digits.
pub fn new_out_trade_no(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}{}", now.format("%Y%m%d%H%M%S"), &random[..12])
}

/// What the provider says about a payment when asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GatewayReport {
    Pending,
    Paid { paid_at: DateTime<Utc> },
    Failed { reason: String },
}

impl GatewayReport {
    /// `None` when the report does not move the session.
    pub fn into_event(self) -> Option<SessionEvent> {
        match self {
            GatewayReport::Pending => None,
            GatewayReport::Paid { paid_at } => Some(SessionEvent::Paid { paid_at }),
            GatewayReport::Failed { reason } => Some(SessionEvent::Failed { reason }),
        }
    }
}

/// Parameters sent to the provider when opening a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayOrder {
    pub out_trade_no: String,
    pub amount: Money,
    pub subject: String,
    pub description: Option<String>,
}

/// What the caller needs to complete the payment with the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayTicket {
    pub pay_url: String,
    pub qr_code: Option<String>,
}
