use super::locks::KeyedLocks;
use crate::domain::journal::{EntryKind, LedgerEntry};
use crate::domain::member_card::MemberCardAccount;
use crate::domain::money::Money;
use crate::domain::points::{PointsAccount, UserId};
use crate::domain::ports::{CardStoreBox, JournalStoreBox, PointsStoreBox};
use crate::error::{LedgerKind, Result, SettlementError};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AccountKey {
    Points(UserId),
    Card(UserId),
}

/// Points and member-card ledgers with per-account serialization.
///
/// Every mutation loads the account, applies the domain rule, persists it and
/// appends a journal entry, all while holding that account's lock. Debits
/// either apply in full or not at all.
pub struct LedgerService {
    points: PointsStoreBox,
    cards: CardStoreBox,
    journal: JournalStoreBox,
    locks: KeyedLocks<AccountKey>,
}

/// Both of one user's accounts, locked for the lifetime of this value.
///
/// Lets the engine read balances, allocate and debit without another charge
/// for the same user slipping in between.
pub struct UserLedger<'a> {
    ledger: &'a LedgerService,
    user_id: UserId,
    _points: OwnedMutexGuard<()>,
    _card: OwnedMutexGuard<()>,
}

impl UserLedger<'_> {
    pub async fn points(&self) -> Result<PointsAccount> {
        self.ledger.load_points(self.user_id).await
    }

    pub async fn card(&self) -> Result<Option<MemberCardAccount>> {
        self.ledger.cards.get(self.user_id).await
    }

    pub async fn debit_points(
        &self,
        points: u64,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        self.ledger
            .debit_points_unlocked(self.user_id, points, reason, charge_id)
            .await
    }

    pub async fn credit_points(
        &self,
        points: u64,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        self.ledger
            .credit_points_unlocked(self.user_id, points, reason, charge_id)
            .await
    }

    pub async fn debit_card(
        &self,
        amount: Money,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        self.ledger
            .debit_card_unlocked(self.user_id, amount, reason, charge_id)
            .await
    }

    pub async fn credit_card(
        &self,
        amount: Money,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        self.ledger
            .credit_card_unlocked(self.user_id, amount, reason, charge_id)
            .await
    }
}

impl LedgerService {
    pub fn new(points: PointsStoreBox, cards: CardStoreBox, journal: JournalStoreBox) -> Self {
        Self {
            points,
            cards,
            journal,
            locks: KeyedLocks::new(),
        }
    }

    /// Locks points then card, always in that order.
    pub async fn lock_user(&self, user_id: UserId) -> UserLedger<'_> {
        let points = self.locks.acquire(AccountKey::Points(user_id)).await;
        let card = self.locks.acquire(AccountKey::Card(user_id)).await;
        UserLedger {
            ledger: self,
            user_id,
            _points: points,
            _card: card,
        }
    }

    pub async fn points_account(&self, user_id: UserId) -> Result<PointsAccount> {
        self.load_points(user_id).await
    }

    pub async fn card_account(&self, user_id: UserId) -> Result<Option<MemberCardAccount>> {
        self.cards.get(user_id).await
    }

    pub async fn all_points_accounts(&self) -> Result<Vec<PointsAccount>> {
        self.points.get_all().await
    }

    pub async fn all_card_accounts(&self) -> Result<Vec<MemberCardAccount>> {
        self.cards.get_all().await
    }

    pub async fn journal(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.journal.entries(user_id).await
    }

    /// Credit from the external earning process.
    pub async fn earn_points(
        &self,
        user_id: UserId,
        points: u64,
        reason: &str,
    ) -> Result<PointsAccount> {
        let _guard = self.locks.acquire(AccountKey::Points(user_id)).await;
        let previous = self.load_points(user_id).await?;
        let mut account = previous.clone();
        account.earn(points)?;
        self.commit_points(
            previous,
            account,
            EntryKind::PointsEarn,
            Decimal::from(points),
            reason,
            None,
        )
        .await
    }

    pub async fn debit_points(
        &self,
        user_id: UserId,
        points: u64,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        let _guard = self.locks.acquire(AccountKey::Points(user_id)).await;
        self.debit_points_unlocked(user_id, points, reason, charge_id)
            .await
    }

    pub async fn credit_points(
        &self,
        user_id: UserId,
        points: u64,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        let _guard = self.locks.acquire(AccountKey::Points(user_id)).await;
        self.credit_points_unlocked(user_id, points, reason, charge_id)
            .await
    }

    /// Tops up stored balance, opening an active card on first recharge.
    pub async fn recharge_card(
        &self,
        user_id: UserId,
        amount: Money,
        reason: &str,
    ) -> Result<MemberCardAccount> {
        let _guard = self.locks.acquire(AccountKey::Card(user_id)).await;
        let previous = self.cards.get(user_id).await?;
        let mut card = match &previous {
            Some(card) => card.clone(),
            None => MemberCardAccount::open(user_id, Utc::now()),
        };
        card.recharge(amount)?;
        self.commit_card(previous, card, EntryKind::CardRecharge, amount.value(), reason, None)
            .await
    }

    pub async fn debit_card(
        &self,
        user_id: UserId,
        amount: Money,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        let _guard = self.locks.acquire(AccountKey::Card(user_id)).await;
        self.debit_card_unlocked(user_id, amount, reason, charge_id)
            .await
    }

    pub async fn credit_card(
        &self,
        user_id: UserId,
        amount: Money,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        let _guard = self.locks.acquire(AccountKey::Card(user_id)).await;
        self.credit_card_unlocked(user_id, amount, reason, charge_id)
            .await
    }

    pub async fn freeze_card(&self, user_id: UserId) -> Result<MemberCardAccount> {
        let _guard = self.locks.acquire(AccountKey::Card(user_id)).await;
        let mut card = self
            .cards
            .get(user_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("member card for user {user_id}")))?;
        card.freeze();
        self.cards.store(card.clone()).await?;
        debug!(user_id, card_number = %card.card_number, "member card frozen");
        Ok(card)
    }

    async fn load_points(&self, user_id: UserId) -> Result<PointsAccount> {
        Ok(self
            .points
            .get(user_id)
            .await?
            .unwrap_or_else(|| PointsAccount::new(user_id)))
    }

    async fn debit_points_unlocked(
        &self,
        user_id: UserId,
        points: u64,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        let previous = self.load_points(user_id).await?;
        let mut account = previous.clone();
        account.debit(points)?;
        self.commit_points(
            previous,
            account,
            EntryKind::PointsUse,
            -Decimal::from(points),
            reason,
            charge_id,
        )
        .await
    }

    async fn credit_points_unlocked(
        &self,
        user_id: UserId,
        points: u64,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        let previous = self.load_points(user_id).await?;
        let mut account = previous.clone();
        account.credit(points)?;
        self.commit_points(
            previous,
            account,
            EntryKind::PointsAdjust,
            Decimal::from(points),
            reason,
            charge_id,
        )
        .await
    }

    async fn debit_card_unlocked(
        &self,
        user_id: UserId,
        amount: Money,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        let previous = self.cards.get(user_id).await?.ok_or_else(|| {
            SettlementError::InsufficientBalance {
                ledger: LedgerKind::Card,
                requested: amount.value(),
                available: Decimal::ZERO,
            }
        })?;
        let mut card = previous.clone();
        card.debit(amount)?;
        self.commit_card(
            Some(previous),
            card,
            EntryKind::CardConsume,
            -amount.value(),
            reason,
            charge_id,
        )
        .await
    }

    async fn credit_card_unlocked(
        &self,
        user_id: UserId,
        amount: Money,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        let previous = self.cards.get(user_id).await?.ok_or_else(|| {
            SettlementError::LedgerInconsistency(format!(
                "refund of {amount} to user {user_id} who has no member card"
            ))
        })?;
        let mut card = previous.clone();
        card.credit(amount)?;
        self.commit_card(
            Some(previous),
            card,
            EntryKind::CardRefund,
            amount.value(),
            reason,
            charge_id,
        )
        .await
    }

    /// Persists `account` and journals the change. If the journal append
    /// fails, `previous` is written back before the error is returned.
    async fn commit_points(
        &self,
        previous: PointsAccount,
        account: PointsAccount,
        kind: EntryKind,
        delta: Decimal,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<PointsAccount> {
        self.points.store(account.clone()).await?;
        let entry = LedgerEntry::new(
            account.user_id,
            kind,
            delta,
            Decimal::from(account.current_points),
            reason,
            charge_id,
        );
        if let Err(err) = self.journal.append(entry).await {
            let user_id = account.user_id;
            self.points
                .store(previous)
                .await
                .map_err(|e| unrestored(LedgerKind::Points, user_id, e))?;
            warn!(user_id, ?kind, error = %err, "journal append failed, points change undone");
            return Err(err);
        }
        debug!(user_id = account.user_id, ?kind, %delta, balance = account.current_points, "points ledger updated");
        Ok(account)
    }

    /// Card counterpart of [`commit_points`](Self::commit_points). A card
    /// opened by this change is removed again when undone.
    async fn commit_card(
        &self,
        previous: Option<MemberCardAccount>,
        card: MemberCardAccount,
        kind: EntryKind,
        delta: Decimal,
        reason: &str,
        charge_id: Option<Uuid>,
    ) -> Result<MemberCardAccount> {
        self.cards.store(card.clone()).await?;
        let entry = LedgerEntry::new(
            card.user_id,
            kind,
            delta,
            card.balance.value(),
            reason,
            charge_id,
        );
        if let Err(err) = self.journal.append(entry).await {
            let user_id = card.user_id;
            let undone = match previous {
                Some(previous) => self.cards.store(previous).await,
                None => self.cards.remove(user_id).await,
            };
            undone.map_err(|e| unrestored(LedgerKind::Card, user_id, e))?;
            warn!(user_id, ?kind, error = %err, "journal append failed, card change undone");
            return Err(err);
        }
        debug!(user_id = card.user_id, ?kind, %delta, balance = %card.balance, "card ledger updated");
        Ok(card)
    }
}

fn unrestored(ledger: LedgerKind, user_id: UserId, err: SettlementError) -> SettlementError {
    SettlementError::LedgerInconsistency(format!(
        "{ledger} account of user {user_id} changed without a journal entry: {err}"
    ))
}
