use super::engine::SettlementEngine;
use crate::domain::gateway::PaymentStatusView;
use crate::error::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Polls a payment until the gateway settles it or the timeout runs out.
///
/// Running out of time is not a failure: the last known view (still
/// `pending`) is returned and the session is left open, since the provider may
/// complete the payment out-of-band.
pub struct StatusPoller<'a> {
    engine: &'a SettlementEngine,
    config: PollConfig,
}

impl<'a> StatusPoller<'a> {
    pub fn new(engine: &'a SettlementEngine, config: PollConfig) -> Self {
        Self { engine, config }
    }

    pub async fn wait_for_terminal(&self, out_trade_no: &str) -> Result<PaymentStatusView> {
        self.wait_within(out_trade_no, self.config.timeout).await
    }

    /// Same as [`wait_for_terminal`](Self::wait_for_terminal) with a
    /// caller-chosen timeout.
    pub async fn wait_within(
        &self,
        out_trade_no: &str,
        timeout: Duration,
    ) -> Result<PaymentStatusView> {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let view = self
                .engine
                .poll_payment_within(out_trade_no, Some(remaining))
                .await?;

            if view.status.is_terminal() {
                debug!(%out_trade_no, attempts, status = view.status.as_str(), "payment settled");
                return Ok(view);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(%out_trade_no, attempts, "polling timed out, payment still pending");
                return Ok(view);
            }
            tokio::time::sleep(self.config.interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::Allocator;
    use crate::domain::charge::{Caller, ChargeRequest, ChargeState, RelatedType};
    use crate::domain::gateway::{GatewayReport, PaymentStatus};
    use crate::infrastructure::gateway::{GatewayBehavior, SimulatedGateway};
    use crate::infrastructure::in_memory;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn setup(behavior: GatewayBehavior) -> (SettlementEngine, SimulatedGateway) {
        let gateway = SimulatedGateway::new(behavior);
        let engine = SettlementEngine::new(
            in_memory::stores(),
            Box::new(gateway.clone()),
            Allocator::default(),
        );
        (engine, gateway)
    }

    async fn open_payment(engine: &SettlementEngine) -> String {
        let request = ChargeRequest::new(dec!(25), "Vaccination", RelatedType::Appointment, 9);
        let payment = engine.charge(&Caller::new(1), request).await.unwrap();
        payment.out_trade_no().unwrap().to_string()
    }

    fn quick() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(60),
        }
    }

    #[tokio::test]
    async fn test_returns_as_soon_as_paid() {
        let (engine, gateway) = setup(GatewayBehavior::Paid);
        let out_trade_no = open_payment(&engine).await;

        let view = StatusPoller::new(&engine, quick())
            .wait_for_terminal(&out_trade_no)
            .await
            .unwrap();

        assert_eq!(view.status, PaymentStatus::Paid);
        assert!(view.paid_at.is_some());
        assert_eq!(gateway.query_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_leaves_session_pending() {
        let (engine, gateway) = setup(GatewayBehavior::Pending);
        let out_trade_no = open_payment(&engine).await;

        let view = StatusPoller::new(&engine, quick())
            .wait_for_terminal(&out_trade_no)
            .await
            .unwrap();

        assert_eq!(view.status, PaymentStatus::Pending);
        assert!(gateway.query_count() > 1);
        let charge = engine.charge_for_payment(&out_trade_no).await.unwrap();
        assert_eq!(charge.state, ChargeState::Provisional);
    }

    #[tokio::test]
    async fn test_picks_up_settlement_while_waiting() {
        let (engine, gateway) = setup(GatewayBehavior::Pending);
        let out_trade_no = open_payment(&engine).await;
        let poller = StatusPoller::new(&engine, quick());

        let (view, _) = tokio::join!(
            poller.wait_within(&out_trade_no, Duration::from_secs(5)),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                gateway
                    .settle(
                        &out_trade_no,
                        GatewayReport::Paid {
                            paid_at: Utc::now(),
                        },
                    )
                    .await;
            }
        );

        assert_eq!(view.unwrap().status, PaymentStatus::Paid);
        let charge = engine.charge_for_payment(&out_trade_no).await.unwrap();
        assert!(charge.is_committed());
    }

    #[tokio::test]
    async fn test_unknown_payment_is_an_error() {
        let (engine, _) = setup(GatewayBehavior::Paid);
        let result = StatusPoller::new(&engine, quick())
            .wait_for_terminal("nope")
            .await;
        assert!(result.is_err());
    }
}
