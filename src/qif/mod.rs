use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

pub mod date;
mod parser;
mod writer;


pub use date::{parse_date, DateOrder};
pub use parser::{parse_amount, QifParser, Records};
pub use writer::write_qif;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QifError {
    #[error("malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },
    #[error("record starting at line {line} is never terminated")]
    IncompleteRecord { line: usize },
    #[error("cannot parse date {0:?}")]
    DateFormat(String),
}

impl QifError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> QifError {
        QifError::MalformedInput {
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub date_order: DateOrder,
    /// Largest accepted difference between a transaction total and the sum of its splits.
    pub split_tolerance: Decimal,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            date_order: DateOrder::default(),
            split_tolerance: dec!(0.005),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QifSplit {
    pub category: Option<String>,
    pub memo: Option<String>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QifTransaction {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payee: Option<String>,
    pub memo: Option<String>,
    pub category: Option<String>,
    pub number: Option<String>,
    pub cleared: Option<String>,
    pub splits: Vec<QifSplit>,
    /// Account named by the `!Account` block preceding this transaction, if any.
    pub account: Option<String>,
}

impl QifTransaction {
    pub fn new(date: NaiveDate, amount: Decimal) -> QifTransaction {
        QifTransaction {
            date,
            amount,
            payee: None,
            memo: None,
            category: None,
            number: None,
            cleared: None,
            splits: Vec::new(),
            account: None,
        }
    }

    pub fn split_total(&self) -> Decimal {
        self.splits.iter().map(|split| split.amount).sum()
    }

    pub fn has_splits(&self) -> bool {
        !self.splits.is_empty()
    }
}
