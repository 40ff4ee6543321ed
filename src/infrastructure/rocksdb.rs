use crate::domain::charge::SettledCharge;
use crate::domain::gateway::GatewaySession;
use crate::domain::journal::LedgerEntry;
use crate::domain::member_card::MemberCardAccount;
use crate::domain::points::{PointsAccount, UserId};
use crate::domain::ports::{CardStore, ChargeStore, JournalStore, PointsStore, SessionStore, Stores};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Column Family for points accounts, keyed by user id.
pub const CF_POINTS: &str = "points";
/// Column Family for member cards, keyed by user id.
pub const CF_CARDS: &str = "cards";
/// Column Family for gateway sessions, keyed by `out_trade_no`.
pub const CF_SESSIONS: &str = "sessions";
/// Column Family for settled charges, keyed by charge id.
pub const CF_CHARGES: &str = "charges";
/// Column Family for the ledger journal, keyed by user id, time and entry id.
pub const CF_JOURNAL: &str = "journal";

const COLUMN_FAMILIES: [&str; 5] = [CF_POINTS, CF_CARDS, CF_SESSIONS, CF_CHARGES, CF_JOURNAL];

/// A persistent store implementation using RocksDB.
///
/// Each entity type lives in its own Column Family and is stored as JSON.
/// Cloning shares the underlying `Arc<DB>`, so one opened database can back
/// every port at once.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Every port backed by this database.
    pub fn stores(&self) -> Stores {
        Stores {
            points: Box::new(self.clone()),
            cards: Box::new(self.clone()),
            sessions: Box::new(self.clone()),
            charges: Box::new(self.clone()),
            journal: Box::new(self.clone()),
        }
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SettlementError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn put_json<T: Serialize>(&self, cf_name: &'static str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &'static str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order.
    fn scan_json<T: DeserializeOwned>(&self, cf_name: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };

        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

fn journal_key(entry: &LedgerEntry) -> Vec<u8> {
    let nanos = entry.created_at.timestamp_nanos_opt().unwrap_or(i64::MAX) as u64;
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&entry.user_id.to_be_bytes());
    key.extend_from_slice(&nanos.to_be_bytes());
    key.extend_from_slice(entry.id.as_bytes());
    key
}

#[async_trait]
impl PointsStore for RocksDBStore {
    async fn store(&self, account: PointsAccount) -> Result<()> {
        self.put_json(CF_POINTS, &account.user_id.to_be_bytes(), &account)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<PointsAccount>> {
        self.get_json(CF_POINTS, &user_id.to_be_bytes())
    }

    async fn get_all(&self) -> Result<Vec<PointsAccount>> {
        self.scan_json(CF_POINTS, &[])
    }
}

#[async_trait]
impl CardStore for RocksDBStore {
    async fn store(&self, card: MemberCardAccount) -> Result<()> {
        self.put_json(CF_CARDS, &card.user_id.to_be_bytes(), &card)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<MemberCardAccount>> {
        self.get_json(CF_CARDS, &user_id.to_be_bytes())
    }

    async fn get_all(&self) -> Result<Vec<MemberCardAccount>> {
        self.scan_json(CF_CARDS, &[])
    }

    async fn remove(&self, user_id: UserId) -> Result<()> {
        let cf = self.cf(CF_CARDS)?;
        self.db.delete_cf(cf, user_id.to_be_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RocksDBStore {
    async fn store(&self, session: GatewaySession) -> Result<()> {
        self.put_json(CF_SESSIONS, session.out_trade_no.as_bytes(), &session)
    }

    async fn get(&self, out_trade_no: &str) -> Result<Option<GatewaySession>> {
        self.get_json(CF_SESSIONS, out_trade_no.as_bytes())
    }
}

#[async_trait]
impl ChargeStore for RocksDBStore {
    async fn store(&self, charge: SettledCharge) -> Result<()> {
        self.put_json(CF_CHARGES, charge.charge_id.as_bytes(), &charge)
    }

    async fn get(&self, charge_id: Uuid) -> Result<Option<SettledCharge>> {
        self.get_json(CF_CHARGES, charge_id.as_bytes())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<SettledCharge>> {
        let mut charges: Vec<SettledCharge> = self
            .scan_json::<SettledCharge>(CF_CHARGES, &[])?
            .into_iter()
            .filter(|charge| charge.user_id == user_id)
            .collect();
        charges.sort_by_key(|charge| charge.created_at);
        Ok(charges)
    }
}

#[async_trait]
impl JournalStore for RocksDBStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        self.put_json(CF_JOURNAL, &journal_key(&entry), &entry)
    }

    async fn entries(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.scan_json(CF_JOURNAL, &user_id.to_be_bytes())
    }
}
