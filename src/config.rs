use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::qif::{DateOrder, ParseOptions};

pub const DEFAULT_CURRENCY: &str = "EUR";
pub const DEFAULT_SOURCE_ACCOUNT: [&str; 2] = ["Assets", "Imported"];

/// Settings for one import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// ISO 4217 code used for every posting, since QIF carries no currency.
    pub currency: String,
    /// Separator between account names in a category, e.g. `Expenses:Food`.
    pub separator: char,
    pub date_order: DateOrder,
    pub split_tolerance: Decimal,
    /// Account the transactions of a file belong to when the file has no `!Account` block.
    /// Defaults to `Assets` / `Imported` joined by `separator`.
    pub source_account: Option<String>,
    /// Account for transactions without a category. Defaults to `Imbalance-<currency>`.
    pub imbalance_account: Option<String>,
    /// Transactions dated before this are left out.
    pub date_from: Option<NaiveDate>,
    /// Leave out transactions identical to one already imported during this run.
    pub skip_duplicate_entries: bool,
}

impl ImportConfig {
    pub fn imbalance_account(&self) -> String {
        self.imbalance_account
            .clone()
            .unwrap_or_else(|| format!("Imbalance-{}", self.currency))
    }

    pub fn source_account(&self) -> String {
        self.source_account
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE_ACCOUNT.join(&self.separator.to_string()))
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            date_order: self.date_order,
            split_tolerance: self.split_tolerance,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            currency: DEFAULT_CURRENCY.to_string(),
            separator: ':',
            date_order: DateOrder::default(),
            split_tolerance: dec!(0.005),
            source_account: None,
            imbalance_account: None,
            date_from: None,
            skip_duplicate_entries: false,
        }
    }
}
