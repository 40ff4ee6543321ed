use crate::domain::gateway::{GatewayOrder, GatewayReport, GatewayTicket};
use crate::domain::ports::PaymentGateway;
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// How the simulated provider answers queries for sessions it has not been
/// told anything specific about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GatewayBehavior {
    /// Never settles on its own; only explicit reports move a session.
    Pending,
    /// Every query reports the payment as captured.
    Paid,
    /// Every query reports a declined payment.
    Failed,
    /// Every call fails as if the provider were down.
    Unavailable,
}

/// In-process stand-in for an Alipay-style provider.
///
/// Keeps the orders it was asked to open and answers queries from a per-order
/// override, falling back to the configured behaviour.
#[derive(Clone)]
pub struct SimulatedGateway {
    behavior: GatewayBehavior,
    base_url: String,
    orders: Arc<RwLock<HashMap<String, GatewayOrder>>>,
    overrides: Arc<RwLock<HashMap<String, GatewayReport>>>,
    queries: Arc<AtomicUsize>,
}

impl SimulatedGateway {
    pub fn new(behavior: GatewayBehavior) -> Self {
        Self {
            behavior,
            base_url: "https://pay.example.test".to_string(),
            orders: Arc::default(),
            overrides: Arc::default(),
            queries: Arc::default(),
        }
    }

    /// Makes the provider report `report` for `out_trade_no` from now on.
    pub async fn settle(&self, out_trade_no: &str, report: GatewayReport) {
        let mut overrides = self.overrides.write().await;
        overrides.insert(out_trade_no.to_string(), report);
    }

    pub async fn order(&self, out_trade_no: &str) -> Option<GatewayOrder> {
        self.orders.read().await.get(out_trade_no).cloned()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> Result<()> {
        if self.behavior == GatewayBehavior::Unavailable {
            Err(SettlementError::GatewayUnavailable(
                "simulated provider is down".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_session(&self, order: &GatewayOrder) -> Result<GatewayTicket> {
        self.unavailable()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.out_trade_no) {
            return Err(SettlementError::ValidationError(format!(
                "duplicate out_trade_no {}",
                order.out_trade_no
            )));
        }
        orders.insert(order.out_trade_no.clone(), order.clone());
        Ok(GatewayTicket {
            pay_url: format!("{}/pay/{}", self.base_url, order.out_trade_no),
            qr_code: Some(format!("{}/qr/{}", self.base_url, order.out_trade_no)),
        })
    }

    async fn query(&self, out_trade_no: &str) -> Result<GatewayReport> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.unavailable()?;
        if !self.orders.read().await.contains_key(out_trade_no) {
            return Err(SettlementError::NotFound(format!(
                "gateway order {out_trade_no}"
            )));
        }
        if let Some(report) = self.overrides.read().await.get(out_trade_no) {
            return Ok(report.clone());
        }
        Ok(match self.behavior {
            GatewayBehavior::Pending | GatewayBehavior::Unavailable => GatewayReport::Pending,
            GatewayBehavior::Paid => GatewayReport::Paid {
                paid_at: Utc::now(),
            },
            GatewayBehavior::Failed => GatewayReport::Failed {
                reason: "declined by simulated provider".to_string(),
            },
        })
    }
}
