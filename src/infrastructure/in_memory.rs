use crate::domain::charge::SettledCharge;
use crate::domain::gateway::GatewaySession;
use crate::domain::journal::LedgerEntry;
use crate::domain::member_card::MemberCardAccount;
use crate::domain::points::{PointsAccount, UserId};
use crate::domain::ports::{CardStore, ChargeStore, JournalStore, PointsStore, SessionStore, Stores};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A complete set of in-memory stores.
pub fn stores() -> Stores {
    Stores {
        points: Box::new(InMemoryPointsStore::new()),
        cards: Box::new(InMemoryCardStore::new()),
        sessions: Box::new(InMemorySessionStore::new()),
        charges: Box::new(InMemoryChargeStore::new()),
        journal: Box::new(InMemoryJournalStore::new()),
    }
}

/// A thread-safe in-memory store for points accounts.
///
/// Uses `Arc<RwLock<HashMap<..>>>` to allow shared concurrent access.
/// Ideal for testing or small datasets where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryPointsStore {
    accounts: Arc<RwLock<HashMap<UserId, PointsAccount>>>,
}

impl InMemoryPointsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PointsStore for InMemoryPointsStore {
    async fn store(&self, account: PointsAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.user_id, account);
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<PointsAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&user_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PointsAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCardStore {
    cards: Arc<RwLock<HashMap<UserId, MemberCardAccount>>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn store(&self, card: MemberCardAccount) -> Result<()> {
        let mut cards = self.cards.write().await;
        cards.insert(card.user_id, card);
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<MemberCardAccount>> {
        let cards = self.cards.read().await;
        Ok(cards.get(&user_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<MemberCardAccount>> {
        let cards = self.cards.read().await;
        Ok(cards.values().cloned().collect())
    }

    async fn remove(&self, user_id: UserId) -> Result<()> {
        let mut cards = self.cards.write().await;
        cards.remove(&user_id);
        Ok(())
    }
}

/// Gateway sessions keyed by `out_trade_no`.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, GatewaySession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store(&self, session: GatewaySession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.out_trade_no.clone(), session);
        Ok(())
    }

    async fn get(&self, out_trade_no: &str) -> Result<Option<GatewaySession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(out_trade_no).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryChargeStore {
    charges: Arc<RwLock<HashMap<Uuid, SettledCharge>>>,
}

impl InMemoryChargeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChargeStore for InMemoryChargeStore {
    async fn store(&self, charge: SettledCharge) -> Result<()> {
        let mut charges = self.charges.write().await;
        charges.insert(charge.charge_id, charge);
        Ok(())
    }

    async fn get(&self, charge_id: Uuid) -> Result<Option<SettledCharge>> {
        let charges = self.charges.read().await;
        Ok(charges.get(&charge_id).cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<SettledCharge>> {
        let charges = self.charges.read().await;
        let mut found: Vec<SettledCharge> = charges
            .values()
            .filter(|charge| charge.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|charge| charge.created_at);
        Ok(found)
    }
}

/// Append-only journal, one vector per user.
#[derive(Default, Clone)]
pub struct InMemoryJournalStore {
    entries: Arc<RwLock<HashMap<UserId, Vec<LedgerEntry>>>>,
}

impl InMemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.entry(entry.user_id).or_default().push(entry);
        Ok(())
    }

    async fn entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::journal::EntryKind;
    use crate::domain::money::Money;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_in_memory_points_store() {
        let store = InMemoryPointsStore::new();
        let mut account = PointsAccount::new(1);
        account.earn(100).unwrap();

        store.store(account.clone()).await.unwrap();
        let retrieved = store.get(1).await.unwrap().unwrap();
        assert_eq!(retrieved, account);

        assert!(store.get(2).await.unwrap().is_none());
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_card_store() {
        let store = InMemoryCardStore::new();
        let mut card = MemberCardAccount::open(4, Utc::now());
        card.recharge(Money::new(dec!(20))).unwrap();

        store.store(card.clone()).await.unwrap();
        assert_eq!(store.get(4).await.unwrap(), Some(card));
        assert!(store.get(5).await.unwrap().is_none());

        store.remove(4).await.unwrap();
        assert!(store.get(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_session_store() {
        let store = InMemorySessionStore::new();
        let session = GatewaySession::open(
            "20260101120000aaaabbbbcccc".to_string(),
            Uuid::new_v4(),
            Money::new(dec!(12.5)),
            "Vaccination".to_string(),
            Utc::now(),
        );

        store.store(session.clone()).await.unwrap();
        let retrieved = store.get(&session.out_trade_no).await.unwrap().unwrap();
        assert_eq!(retrieved, session);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_journal_keeps_order() {
        let store = InMemoryJournalStore::new();
        for delta in [dec!(10), dec!(-4), dec!(4)] {
            store
                .append(LedgerEntry::new(1, EntryKind::PointsEarn, delta, dec!(0), "t", None))
                .await
                .unwrap();
        }
        let deltas: Vec<_> = store
            .entries(1)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.delta)
            .collect();
        assert_eq!(deltas, vec![dec!(10), dec!(-4), dec!(4)]);
        assert!(store.entries(2).await.unwrap().is_empty());
    }
}
