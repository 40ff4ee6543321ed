use rust_decimal::Decimal;
use thiserror::Error;

/// Which ledger a balance error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Points,
    Card,
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerKind::Points => f.write_str("points"),
            LedgerKind::Card => f.write_str("member card"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Invalid amount: {0} (must be greater than zero)")]
    InvalidAmount(Decimal),
    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: u64, available: u64 },
    #[error("Insufficient {ledger} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        ledger: LedgerKind,
        requested: Decimal,
        available: Decimal,
    },
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),
    #[error("Account unavailable: {0}")]
    AccountUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    /// Transient failures the caller may retry. The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::GatewayUnavailable(_))
    }

    /// Bookkeeping corruption; requires operator intervention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SettlementError::LedgerInconsistency(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for SettlementError {
    fn from(err: rocksdb::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(err: serde_json::Error) -> Self {
        SettlementError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
