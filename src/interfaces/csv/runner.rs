use super::command_reader::{CommandReader, CommandRecord, CommandType};
use crate::application::engine::SettlementEngine;
use crate::application::poller::{PollConfig, StatusPoller};
use crate::domain::charge::{Caller, ChargeRequest, RelatedType};
use crate::domain::gateway::GatewayReport;
use crate::domain::money::Amount;
use crate::error::{Result, SettlementError};
use chrono::Utc;
use std::collections::HashMap;
use std::io::Read;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Drives a [`SettlementEngine`] from a command script.
///
/// Rows that fail to parse or are rejected by the engine are logged and
/// skipped; the rest of the script still runs.
pub struct ScriptRunner<'a> {
    engine: &'a SettlementEngine,
    poll: PollConfig,
    charges: HashMap<u32, Uuid>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(engine: &'a SettlementEngine, poll: PollConfig) -> Self {
        Self {
            engine,
            poll,
            charges: HashMap::new(),
        }
    }

    pub async fn run<R: Read>(&mut self, reader: CommandReader<R>) -> RunSummary {
        let mut summary = RunSummary::default();
        for (index, row) in reader.commands().enumerate() {
            let line = index + 2;
            match row {
                Ok(record) => match self.apply(&record).await {
                    Ok(()) => summary.applied += 1,
                    Err(e) => {
                        warn!(line, command = ?record.kind, user = record.user, error = %e, "command rejected");
                        summary.rejected += 1;
                    }
                },
                Err(e) => {
                    warn!(line, error = %e, "unreadable command row");
                    summary.rejected += 1;
                }
            }
        }
        summary
    }

    /// Charge id behind a script handle, if that charge was recorded.
    pub fn charge_id(&self, tx: u32) -> Option<Uuid> {
        self.charges.get(&tx).copied()
    }

    pub async fn apply(&mut self, record: &CommandRecord) -> Result<()> {
        let caller = Caller::new(record.user);
        let engine = self.engine;
        let ledger = engine.ledger();
        match record.kind {
            CommandType::Earn => {
                let reason = record.detail().unwrap_or("earned");
                ledger
                    .earn_points(record.user, record.points()?, reason)
                    .await?;
            }
            CommandType::Recharge => {
                let amount = Amount::new(record.amount()?)?;
                ledger
                    .recharge_card(record.user, amount.as_money(), "recharge")
                    .await?;
            }
            CommandType::Freeze => {
                ledger.freeze_card(record.user).await?;
            }
            CommandType::Charge => self.charge(&caller, record).await?,
            CommandType::Notify => {
                let out_trade_no = self.out_trade_no(&caller, record).await?;
                let report = parse_report(record.detail())?;
                let view = self
                    .engine
                    .handle_notification(&out_trade_no, report)
                    .await?;
                info!(%out_trade_no, status = view.status.as_str(), "notification applied");
            }
            CommandType::Poll => {
                let out_trade_no = self.out_trade_no(&caller, record).await?;
                let view = StatusPoller::new(self.engine, self.poll)
                    .wait_for_terminal(&out_trade_no)
                    .await?;
                info!(%out_trade_no, status = view.status.as_str(), "poll finished");
            }
            CommandType::Cancel => {
                let charge_id = self.handle(record)?;
                let reason = record.detail().unwrap_or("cancelled by user");
                self.engine.reverse(&caller, charge_id, reason).await?;
            }
        }
        Ok(())
    }

    async fn charge(&mut self, caller: &Caller, record: &CommandRecord) -> Result<()> {
        let tx = record.tx()?;
        if self.charges.contains_key(&tx) {
            return Err(SettlementError::ValidationError(format!(
                "tx {tx} already names a charge"
            )));
        }
        let (related_type, related_id) = parse_related(record.related.as_deref())?;
        let request = ChargeRequest::new(
            record.amount()?,
            format!("{} #{related_id}", related_type.as_str()),
            related_type,
            related_id,
        )
        .with_points(record.points.unwrap_or(0))
        .with_card_balance(record.use_card.unwrap_or(true));

        let payment = self.engine.charge(caller, request).await?;
        self.charges.insert(tx, payment.charge_id());
        Ok(())
    }

    fn handle(&self, record: &CommandRecord) -> Result<Uuid> {
        let tx = record.tx()?;
        self.charge_id(tx)
            .ok_or_else(|| SettlementError::NotFound(format!("charge for tx {tx}")))
    }

    async fn out_trade_no(&self, caller: &Caller, record: &CommandRecord) -> Result<String> {
        let charge_id = self.handle(record)?;
        self.engine
            .find_charge(caller, charge_id)
            .await?
            .out_trade_no
            .ok_or_else(|| {
                SettlementError::ValidationError(format!(
                    "charge {charge_id} has no gateway session"
                ))
            })
    }
}

fn parse_related(value: Option<&str>) -> Result<(RelatedType, u64)> {
    let value = value.unwrap_or_default();
    let (kind, id) = value.split_once(':').ok_or_else(|| {
        SettlementError::ValidationError(format!("related must be `kind:id`, got '{value}'"))
    })?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| SettlementError::ValidationError(format!("invalid related id '{id}'")))?;
    Ok((kind.parse()?, id))
}

/// `paid`, `pending`, `failed` or `failed:<reason>`.
fn parse_report(detail: Option<&str>) -> Result<GatewayReport> {
    let detail = detail.unwrap_or_default();
    let (status, reason) = match detail.split_once(':') {
        Some((status, reason)) => (status.trim(), Some(reason.trim())),
        None => (detail, None),
    };
    match status.to_ascii_lowercase().as_str() {
        "paid" => Ok(GatewayReport::Paid {
            paid_at: Utc::now(),
        }),
        "pending" => Ok(GatewayReport::Pending),
        "failed" => Ok(GatewayReport::Failed {
            reason: reason.unwrap_or("declined").to_string(),
        }),
        other => Err(SettlementError::ValidationError(format!(
            "unknown notification status '{other}'"
        ))),
    }
}
