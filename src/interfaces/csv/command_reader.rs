use crate::domain::points::UserId;
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Earn,
    Recharge,
    Freeze,
    Charge,
    Notify,
    Poll,
    Cancel,
}

/// One row of a settlement script.
///
/// Columns a command does not use may be left empty or omitted entirely.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub user: UserId,
    /// Script-local handle naming a charge for later rows.
    pub tx: Option<u32>,
    pub amount: Option<Decimal>,
    pub points: Option<u64>,
    pub use_card: Option<bool>,
    /// `kind:id`, e.g. `boarding:42`.
    pub related: Option<String>,
    pub detail: Option<String>,
}

impl CommandRecord {
    pub fn tx(&self) -> Result<u32> {
        self.tx.ok_or_else(|| self.missing("tx"))
    }

    pub fn amount(&self) -> Result<Decimal> {
        self.amount.ok_or_else(|| self.missing("amount"))
    }

    pub fn points(&self) -> Result<u64> {
        self.points.ok_or_else(|| self.missing("points"))
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref().filter(|d| !d.is_empty())
    }

    fn missing(&self, column: &str) -> SettlementError {
        SettlementError::ValidationError(format!(
            "{:?} command for user {} requires `{column}`",
            self.kind, self.user
        ))
    }
}

/// Reads commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding rows lazily so large scripts stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(SettlementError::from))
    }
}
