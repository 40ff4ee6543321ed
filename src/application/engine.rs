use super::ledger::{LedgerService, UserLedger};
use super::locks::KeyedLocks;
use super::refund::{FullRefund, RefundPolicy};
use crate::domain::allocation::{Allocation, Allocator};
use crate::domain::charge::{
    Caller, ChargeRequest, ChargeState, CombinedPayment, PaymentHandle, RefundResult,
    ReversalState, SettledCharge,
};
use crate::domain::gateway::{
    GatewayOrder, GatewayReport, GatewaySession, PaymentStatus, PaymentStatusView, SessionEvent,
    Transition, new_out_trade_no,
};
use crate::domain::money::Money;
use crate::domain::points::PointsStats;
use crate::domain::ports::{ChargeStoreBox, PaymentGatewayBox, SessionStoreBox, Stores};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Orchestrates allocation, ledger debits and gateway sessions.
///
/// `charge` either applies every ledger debit it needs and records the charge,
/// or leaves no trace. `reverse` undoes the ledger side of a charge exactly
/// once. Gateway reports may arrive through callbacks and polls in any order
/// and any number of times; only the first terminal report has an effect.
///
/// Locks are taken in a fixed order: charge, then session, then the user's
/// points and card accounts.
pub struct SettlementEngine {
    ledger: LedgerService,
    sessions: SessionStoreBox,
    charges: ChargeStoreBox,
    gateway: PaymentGatewayBox,
    allocator: Allocator,
    refund_policy: Box<dyn RefundPolicy>,
    charge_locks: KeyedLocks<Uuid>,
    session_locks: KeyedLocks<String>,
}

impl SettlementEngine {
    /// Creates a new `SettlementEngine`.
    ///
    /// # Arguments
    ///
    /// * `stores` - Persistence for ledgers, sessions, charges and the journal.
    /// * `gateway` - The external payment provider.
    /// * `allocator` - Points conversion and rounding rules.
    pub fn new(stores: Stores, gateway: PaymentGatewayBox, allocator: Allocator) -> Self {
        Self {
            ledger: LedgerService::new(stores.points, stores.cards, stores.journal),
            sessions: stores.sessions,
            charges: stores.charges,
            gateway,
            allocator,
            refund_policy: Box::new(FullRefund),
            charge_locks: KeyedLocks::new(),
            session_locks: KeyedLocks::new(),
        }
    }

    pub fn with_refund_policy(mut self, policy: Box<dyn RefundPolicy>) -> Self {
        self.refund_policy = policy;
        self
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Monetary value of `points` at the configured rate.
    pub fn points_value(&self, points: u64) -> Money {
        self.allocator.points_value(points)
    }

    pub async fn points_stats(&self, caller: &Caller) -> Result<PointsStats> {
        Ok(self.ledger.points_account(caller.user_id).await?.stats())
    }

    /// Covers `request.amount` from points, card balance and, for whatever is
    /// left, a new gateway session.
    pub async fn charge(&self, caller: &Caller, request: ChargeRequest) -> Result<CombinedPayment> {
        let user_id = caller.user_id;
        let charge_id = Uuid::new_v4();
        let now = Utc::now();

        let allocation = {
            let accounts = self.ledger.lock_user(user_id).await;
            let points = accounts.points().await?;
            let card_balance = accounts
                .card()
                .await?
                .map(|card| card.spendable())
                .unwrap_or(Money::ZERO);
            let allocation = self.allocator.allocate(
                request.amount,
                points.current_points,
                card_balance,
                request.use_card_balance,
                request.use_points,
            )?;
            self.debit_ledgers(&accounts, &allocation, &request.subject, charge_id)
                .await?;
            allocation
        };

        let mut charge = SettledCharge::new(charge_id, user_id, &request, allocation, now);

        let payment = if charge.allocation.gateway_amount.is_positive() {
            match self.open_session(&mut charge, &request, now).await {
                Ok(handle) => Some(handle),
                Err(err) => return Err(self.abort_charge(&charge, err).await),
            }
        } else {
            None
        };

        if let Err(err) = self.charges.store(charge.clone()).await {
            return Err(self.abort_charge(&charge, err).await);
        }

        info!(
            %charge_id,
            user_id,
            related = %format!("{}:{}", charge.related_type.as_str(), charge.related_id),
            amount = %charge.allocation.amount,
            points_used = charge.allocation.points_used,
            card_used = %charge.allocation.card_used,
            gateway_amount = %charge.allocation.gateway_amount,
            state = ?charge.state,
            "charge recorded"
        );

        Ok(CombinedPayment { charge, payment })
    }

    /// Undoes the ledger side of a charge and settles the gateway side:
    /// a pending session is cancelled, a paid one is refunded per policy.
    ///
    /// Reversing an already reversed charge returns the earlier outcome.
    pub async fn reverse(
        &self,
        caller: &Caller,
        charge_id: Uuid,
        reason: &str,
    ) -> Result<RefundResult> {
        let _guard = self.charge_locks.acquire(charge_id).await;
        let charge = self.owned_charge(caller, charge_id).await?;
        self.reverse_locked(charge, reason).await
    }

    /// Applies an asynchronous gateway callback.
    pub async fn handle_notification(
        &self,
        out_trade_no: &str,
        report: GatewayReport,
    ) -> Result<PaymentStatusView> {
        match report.into_event() {
            Some(event) => self.apply_session_event(out_trade_no, event).await,
            None => self.payment_status(out_trade_no).await,
        }
    }

    /// Asks the gateway about a pending session and applies its answer.
    /// Terminal sessions are answered from storage.
    pub async fn poll_payment(&self, out_trade_no: &str) -> Result<PaymentStatusView> {
        self.poll_payment_within(out_trade_no, None).await
    }

    /// Like [`poll_payment`](Self::poll_payment), but gives up on a slow
    /// gateway after `limit` and returns the stored view instead. Only the
    /// gateway query is bounded; applying its answer always runs to completion.
    pub async fn poll_payment_within(
        &self,
        out_trade_no: &str,
        limit: Option<Duration>,
    ) -> Result<PaymentStatusView> {
        let session = self.load_session(out_trade_no).await?;
        if session.status.is_terminal() {
            return Ok(session.status_view());
        }
        let report = match limit {
            Some(limit) => {
                match tokio::time::timeout(limit, self.gateway.query(out_trade_no)).await {
                    Ok(report) => report?,
                    Err(_) => return Ok(session.status_view()),
                }
            }
            None => self.gateway.query(out_trade_no).await?,
        };
        self.handle_notification(out_trade_no, report).await
    }

    pub async fn payment_status(&self, out_trade_no: &str) -> Result<PaymentStatusView> {
        Ok(self.load_session(out_trade_no).await?.status_view())
    }

    pub async fn charge_for_payment(&self, out_trade_no: &str) -> Result<SettledCharge> {
        let session = self.load_session(out_trade_no).await?;
        self.load_charge(session.charge_id).await
    }

    pub async fn find_charge(&self, caller: &Caller, charge_id: Uuid) -> Result<SettledCharge> {
        self.owned_charge(caller, charge_id).await
    }

    pub async fn charges(&self, caller: &Caller) -> Result<Vec<SettledCharge>> {
        self.charges.find_by_user(caller.user_id).await
    }

    async fn debit_ledgers(
        &self,
        accounts: &UserLedger<'_>,
        allocation: &Allocation,
        reason: &str,
        charge_id: Uuid,
    ) -> Result<()> {
        if allocation.points_used > 0 {
            accounts
                .debit_points(allocation.points_used, reason, Some(charge_id))
                .await?;
        }
        if allocation.card_used.is_positive() {
            if let Err(err) = accounts
                .debit_card(allocation.card_used, reason, Some(charge_id))
                .await
            {
                if allocation.points_used > 0 {
                    accounts
                        .credit_points(allocation.points_used, "charge rolled back", Some(charge_id))
                        .await
                        .map_err(|e| rollback_failure(charge_id, e))?;
                }
                warn!(%charge_id, error = %err, "card debit failed, points debit rolled back");
                return Err(err);
            }
        }
        Ok(())
    }

    async fn open_session(
        &self,
        charge: &mut SettledCharge,
        request: &ChargeRequest,
        now: DateTime<Utc>,
    ) -> Result<PaymentHandle> {
        let order = GatewayOrder {
            out_trade_no: new_out_trade_no(now),
            amount: charge.allocation.gateway_amount,
            subject: request.subject.clone(),
            description: request.description.clone(),
        };
        let ticket = self.gateway.create_session(&order).await?;
        let session = GatewaySession::open(
            order.out_trade_no.clone(),
            charge.charge_id,
            order.amount,
            order.subject,
            now,
        );
        let handle = PaymentHandle {
            payment_id: session.payment_id,
            out_trade_no: session.out_trade_no.clone(),
            amount: session.amount,
            pay_url: ticket.pay_url,
            qr_code: ticket.qr_code,
        };
        self.sessions.store(session).await?;
        charge.out_trade_no = Some(handle.out_trade_no.clone());
        charge.gateway_status = Some(PaymentStatus::Pending);
        Ok(handle)
    }

    /// Compensates a charge that could not be recorded. Returns the error to
    /// surface: the original one, or a ledger inconsistency if compensation
    /// itself failed.
    async fn abort_charge(&self, charge: &SettledCharge, cause: SettlementError) -> SettlementError {
        if let Some(out_trade_no) = &charge.out_trade_no {
            if let Err(err) = self.close_session(out_trade_no, SessionEvent::Cancelled).await {
                warn!(%out_trade_no, error = %err, "could not cancel session of aborted charge");
            }
        }

        let allocation = &charge.allocation;
        let accounts = self.ledger.lock_user(charge.user_id).await;
        let reason = "charge aborted";
        if allocation.points_used > 0 {
            if let Err(err) = accounts
                .credit_points(allocation.points_used, reason, Some(charge.charge_id))
                .await
            {
                return rollback_failure(charge.charge_id, err);
            }
        }
        if allocation.card_used.is_positive() {
            if let Err(err) = accounts
                .credit_card(allocation.card_used, reason, Some(charge.charge_id))
                .await
            {
                return rollback_failure(charge.charge_id, err);
            }
        }
        warn!(charge_id = %charge.charge_id, error = %cause, "charge aborted, ledger debits returned");
        cause
    }

    async fn reverse_locked(&self, mut charge: SettledCharge, reason: &str) -> Result<RefundResult> {
        if charge.is_reversed() {
            info!(charge_id = %charge.charge_id, "charge already reversed");
            return Ok(refund_result(&charge, true));
        }

        let now = Utc::now();
        if let Some(out_trade_no) = charge.out_trade_no.clone() {
            let (session, _) = self
                .close_session(&out_trade_no, SessionEvent::Cancelled)
                .await?;
            charge.record_gateway_status(session.status, now);
            if session.status == PaymentStatus::Paid {
                let refund = self.refund_policy.gateway_refund(&charge, session.amount);
                charge.reversal.gateway_refund = refund.min(session.amount);
            }
        }

        if charge.reversal.state == ReversalState::NotRequested {
            charge.reversal.state = ReversalState::Pending;
            charge.reversal.reason = Some(reason.to_string());
        }
        self.charges.store(charge.clone()).await?;

        if let Err(err) = self.restore_ledgers(&mut charge).await {
            if err.is_fatal() {
                error!(charge_id = %charge.charge_id, error = %err, "reversal hit a ledger inconsistency");
            } else {
                warn!(charge_id = %charge.charge_id, error = %err, "reversal left pending");
            }
            return Err(err);
        }

        charge.reversal.state = ReversalState::Completed;
        charge.reversal.completed_at = Some(now);
        charge.state = match charge.state {
            ChargeState::Committed => ChargeState::Refunded,
            ChargeState::Provisional => ChargeState::Voided,
            other => other,
        };
        self.charges.store(charge.clone()).await?;

        let result = refund_result(&charge, false);
        info!(
            charge_id = %charge.charge_id,
            points_restored = result.points_restored,
            card_restored = %result.card_restored,
            gateway_refund = %result.gateway_refund,
            reason = %result.reason,
            "charge reversed"
        );
        Ok(result)
    }

    /// Credits back whatever the charge took and has not yet been returned,
    /// persisting progress after each ledger so a retry never double-credits.
    async fn restore_ledgers(&self, charge: &mut SettledCharge) -> Result<()> {
        let accounts = self.ledger.lock_user(charge.user_id).await;
        let reason = charge
            .reversal
            .reason
            .clone()
            .unwrap_or_else(|| "reversal".to_string());

        let points = charge.points_to_restore();
        if points > 0 {
            accounts
                .credit_points(points, &reason, Some(charge.charge_id))
                .await?;
            charge.reversal.points_restored = true;
            self.charges.store(charge.clone()).await?;
        }

        let card = charge.card_to_restore();
        if card.is_positive() {
            accounts
                .credit_card(card, &reason, Some(charge.charge_id))
                .await?;
            charge.reversal.card_restored = true;
            self.charges.store(charge.clone()).await?;
        }
        Ok(())
    }

    async fn apply_session_event(
        &self,
        out_trade_no: &str,
        event: SessionEvent,
    ) -> Result<PaymentStatusView> {
        let charge_id = self.load_session(out_trade_no).await?.charge_id;
        let _charge_guard = self.charge_locks.acquire(charge_id).await;

        let reports_paid = matches!(event, SessionEvent::Paid { .. });
        let (session, transition) = self.close_session(out_trade_no, event).await?;
        if !transition.was_applied() {
            if reports_paid && session.status != PaymentStatus::Paid {
                warn!(
                    %out_trade_no,
                    status = session.status.as_str(),
                    "gateway reports payment for a closed session; reconcile with provider"
                );
            } else {
                info!(%out_trade_no, status = session.status.as_str(), "duplicate gateway report ignored");
            }
            return Ok(session.status_view());
        }

        let mut charge = self.load_charge(charge_id).await?;
        charge.record_gateway_status(session.status, Utc::now());
        self.charges.store(charge.clone()).await?;

        match session.status {
            PaymentStatus::Paid => {
                info!(%charge_id, %out_trade_no, "gateway confirmed payment, charge committed");
            }
            PaymentStatus::Failed => {
                warn!(
                    %charge_id,
                    %out_trade_no,
                    reason = session.failure_reason.as_deref().unwrap_or("unknown"),
                    "gateway payment failed, reversing ledger debits"
                );
                self.reverse_locked(charge, "gateway payment failed").await?;
            }
            PaymentStatus::Cancelled | PaymentStatus::Pending => {}
        }
        Ok(session.status_view())
    }

    /// Applies `event` under the session lock. A session that is already
    /// terminal is returned untouched.
    async fn close_session(
        &self,
        out_trade_no: &str,
        event: SessionEvent,
    ) -> Result<(GatewaySession, Transition)> {
        let _guard = self.session_locks.acquire(out_trade_no.to_string()).await;
        let mut session = self.load_session(out_trade_no).await?;
        let transition = session.apply(event, Utc::now());
        if transition.was_applied() {
            self.sessions.store(session.clone()).await?;
        }
        Ok((session, transition))
    }

    async fn load_session(&self, out_trade_no: &str) -> Result<GatewaySession> {
        self.sessions
            .get(out_trade_no)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("payment {out_trade_no}")))
    }

    async fn load_charge(&self, charge_id: Uuid) -> Result<SettledCharge> {
        self.charges
            .get(charge_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("charge {charge_id}")))
    }

    async fn owned_charge(&self, caller: &Caller, charge_id: Uuid) -> Result<SettledCharge> {
        let charge = self.load_charge(charge_id).await?;
        if charge.user_id != caller.user_id {
            return Err(SettlementError::NotFound(format!("charge {charge_id}")));
        }
        Ok(charge)
    }
}

fn rollback_failure(charge_id: Uuid, err: SettlementError) -> SettlementError {
    if err.is_fatal() {
        return err;
    }
    SettlementError::LedgerInconsistency(format!(
        "could not roll back ledger debits of charge {charge_id}: {err}"
    ))
}

/// Outcome of a completed reversal: every ledger debit has been returned.
fn refund_result(charge: &SettledCharge, already_reversed: bool) -> RefundResult {
    let allocation = &charge.allocation;
    RefundResult {
        charge_id: charge.charge_id,
        points_restored: allocation.points_used,
        card_restored: allocation.card_used,
        gateway_status: charge.gateway_status,
        gateway_refund: charge.reversal.gateway_refund,
        refund_amount: allocation.ledger_covered() + charge.reversal.gateway_refund,
        already_reversed,
        reason: charge.reversal.reason.clone().unwrap_or_default(),
    }
}
