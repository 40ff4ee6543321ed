use super::charge::SettledCharge;
use super::gateway::{GatewayOrder, GatewayReport, GatewaySession, GatewayTicket};
use super::journal::LedgerEntry;
use super::member_card::MemberCardAccount;
use super::points::{PointsAccount, UserId};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait PointsStore: Send + Sync {
    async fn store(&self, account: PointsAccount) -> Result<()>;
    async fn get(&self, user_id: UserId) -> Result<Option<PointsAccount>>;
    async fn get_all(&self) -> Result<Vec<PointsAccount>>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn store(&self, card: MemberCardAccount) -> Result<()>;
    async fn get(&self, user_id: UserId) -> Result<Option<MemberCardAccount>>;
    async fn get_all(&self) -> Result<Vec<MemberCardAccount>>;
    async fn remove(&self, user_id: UserId) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn store(&self, session: GatewaySession) -> Result<()>;
    async fn get(&self, out_trade_no: &str) -> Result<Option<GatewaySession>>;
}

#[async_trait]
pub trait ChargeStore: Send + Sync {
    async fn store(&self, charge: SettledCharge) -> Result<()>;
    async fn get(&self, charge_id: Uuid) -> Result<Option<SettledCharge>>;
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<SettledCharge>>;
}

#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn append(&self, entry: LedgerEntry) -> Result<()>;
    /// Entries for one user, oldest first.
    async fn entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>>;
}

/// The external payment provider. The core never speaks its wire protocol.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, order: &GatewayOrder) -> Result<GatewayTicket>;
    async fn query(&self, out_trade_no: &str) -> Result<GatewayReport>;
}

pub type PointsStoreBox = Box<dyn PointsStore>;
pub type CardStoreBox = Box<dyn CardStore>;
pub type SessionStoreBox = Box<dyn SessionStore>;
pub type ChargeStoreBox = Box<dyn ChargeStore>;
pub type JournalStoreBox = Box<dyn JournalStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;

/// Every persistence port the engine needs, wired by the caller.
pub struct Stores {
    pub points: PointsStoreBox,
    pub cards: CardStoreBox,
    pub sessions: SessionStoreBox,
    pub charges: ChargeStoreBox,
    pub journal: JournalStoreBox,
}
