use std::path::{Path, PathBuf};

use enum_dispatch::enum_dispatch;
use rust_decimal::Decimal;
use thiserror::Error;

pub mod account;
pub mod file_ledger;
pub mod ledger;
pub mod resolver;
pub mod sqlite_ledger;
pub mod transactions;


use account::{Account, AccountId, NewAccount};
use file_ledger::FileLedger;
use sqlite_ledger::SqliteLedger;
use transactions::LedgerTransaction;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cannot open ledger {location}: {reason}")]
    Open { location: String, reason: String },
    #[error("transaction {description:?} does not balance, postings sum to {total}")]
    Unbalanced { description: String, total: Decimal },
    #[error("account {0} does not exist")]
    UnknownAccount(AccountId),
    #[error("account {0:?} already exists")]
    DuplicateAccount(String),
    #[error("no ledger transaction is open")]
    NoOpenTransaction,
    #[error("stored amount {0:?} is not a decimal")]
    InvalidAmount(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode ledger: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What the import engine needs from a ledger store.
///
/// Changes are grouped by `begin` and then either kept with `commit` or discarded with `rollback`;
/// `save` makes committed changes durable.
#[enum_dispatch]
pub trait LedgerBackend {
    /// Whether `rollback` leaves no trace in the stored ledger, so a dry run can be simulated.
    fn supports_dry_run(&self) -> bool;

    fn find_account(&self, parent: Option<AccountId>, name: &str) -> Result<Option<AccountId>, LedgerError>;
    fn account(&self, id: AccountId) -> Result<Account, LedgerError>;
    fn create_account(&mut self, parent: Option<AccountId>, account: NewAccount) -> Result<AccountId, LedgerError>;

    fn begin(&mut self) -> Result<(), LedgerError>;
    fn post_transaction(&mut self, transaction: &LedgerTransaction) -> Result<(), LedgerError>;
    fn commit(&mut self) -> Result<(), LedgerError>;
    fn rollback(&mut self) -> Result<(), LedgerError>;
    fn save(&mut self) -> Result<(), LedgerError>;

    fn balance(&self, account: AccountId) -> Result<Decimal, LedgerError>;
    fn transaction_count(&self) -> Result<usize, LedgerError>;
}

#[enum_dispatch(LedgerBackend)]
pub enum Backend {
    FileLedger,
    SqliteLedger,
}

impl Backend {
    /// Opens the ledger at `location`. `sqlite:` locations and `.sqlite`/`.db` files are SQLite
    /// databases, everything else a JSON ledger file. A missing ledger is created only if `create`
    /// is set.
    pub fn open(location: &str, create: bool) -> Result<Backend, LedgerError> {
        if let Some(path) = location.strip_prefix("sqlite:") {
            return Ok(Backend::SqliteLedger(SqliteLedger::open(Path::new(path), create)?));
        }

        let path = Path::new(location);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("sqlite" | "sqlite3" | "db") => Ok(Backend::SqliteLedger(SqliteLedger::open(path, create)?)),
            _ => Ok(Backend::FileLedger(FileLedger::open(path, create)?)),
        }
    }
}
