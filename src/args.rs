use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use log::LevelFilter;
use rust_decimal_macros::dec;

use qif_ledger_import::config::{ImportConfig, DEFAULT_CURRENCY};
use qif_ledger_import::qif::DateOrder;
use qif_ledger_import::sources::{IdentifierStrategy, SourceSpec};

/// Import QIF files into a double-entry ledger, skipping files that were already imported.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Verbose (debug) logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Silent mode, only log warnings
    #[arg(short, long)]
    pub quiet: bool,

    /// Parse and resolve everything, but do not change the ledger or the import cache
    #[arg(long)]
    pub dry_run: bool,

    /// Only import transactions on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_from: Option<NaiveDate>,

    /// Currency of the imported transactions (ISO 4217)
    #[arg(short, long, default_value = DEFAULT_CURRENCY)]
    pub currency: String,

    /// Ledger to import into: a JSON ledger file, or an SQLite database (`sqlite:PATH`, `*.sqlite`, `*.db`)
    #[arg(short = 'f', long, env = "QIF_LEDGER")]
    pub ledger: String,

    /// Create the ledger if it does not exist
    #[arg(long)]
    pub create_ledger: bool,

    /// Account of the imported transactions when a file names none [default: Assets<SEPARATOR>Imported]
    #[arg(long)]
    pub account: Option<String>,

    /// Account for transactions without a category [default: Imbalance-<CURRENCY>]
    #[arg(long)]
    pub imbalance_account: Option<String>,

    /// Separator between account names in categories
    #[arg(long, default_value_t = ':')]
    pub separator: char,

    /// Order of day and month in numeric QIF dates (mdy or dmy)
    #[arg(long, default_value = "mdy")]
    pub date_order: DateOrder,

    /// Remember files by their name or by a hash of their content (name or hash)
    #[arg(long, default_value = "name")]
    pub identify_by: IdentifierStrategy,

    /// Leave out transactions identical to one imported earlier in the same run
    #[arg(long)]
    pub skip_duplicate_entries: bool,

    /// Import cache file [default: ~/.qif-ledger-import-cache.json]
    #[arg(long, env = "QIF_IMPORT_CACHE")]
    pub cache: Option<PathBuf>,

    /// QIF files to import; `mtp:REGEX` imports matching files from an attached MTP device
    #[arg(required = true)]
    pub files: Vec<SourceSpec>,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    pub fn import_config(&self) -> ImportConfig {
        ImportConfig {
            currency: self.currency.clone(),
            separator: self.separator,
            date_order: self.date_order,
            split_tolerance: dec!(0.005),
            source_account: self.account.clone(),
            imbalance_account: self.imbalance_account.clone(),
            date_from: self.date_from,
            skip_duplicate_entries: self.skip_duplicate_entries,
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
