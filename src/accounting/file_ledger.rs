use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use log::{debug, info};
use rust_decimal::Decimal;
use tempfile::NamedTempFile;

use super::account::{Account, AccountId, NewAccount};
use super::ledger::Ledger;
use super::transactions::LedgerTransaction;
use super::{LedgerBackend, LedgerError};

/// Ledger kept in memory and written to a JSON file on `save`.
///
/// `begin` takes a checkpoint of the whole ledger and `rollback` restores it, so every change since
/// `begin` (including created accounts) can be discarded.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    ledger: Ledger,
    checkpoint: Option<Ledger>,
}

impl FileLedger {
    pub fn open(path: &Path, create: bool) -> Result<FileLedger, LedgerError> {
        let ledger = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|err| LedgerError::Open {
                location: path.display().to_string(),
                reason: err.to_string(),
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound && create => {
                info!("creating new ledger file {}", path.display());
                Ledger::new()
            },
            Err(err) => {
                return Err(LedgerError::Open {
                    location: path.display().to_string(),
                    reason: err.to_string(),
                })
            },
        };

        Ok(FileLedger {
            path: path.to_path_buf(),
            ledger,
            checkpoint: None,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerBackend for FileLedger {
    fn supports_dry_run(&self) -> bool {
        true
    }

    fn find_account(&self, parent: Option<AccountId>, name: &str) -> Result<Option<AccountId>, LedgerError> {
        Ok(self.ledger.find_account(parent, name))
    }

    fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.ledger.account(id).cloned().ok_or(LedgerError::UnknownAccount(id))
    }

    fn create_account(&mut self, parent: Option<AccountId>, account: NewAccount) -> Result<AccountId, LedgerError> {
        self.ledger.add_account(parent, account)
    }

    fn begin(&mut self) -> Result<(), LedgerError> {
        self.checkpoint = Some(self.ledger.clone());
        Ok(())
    }

    fn post_transaction(&mut self, transaction: &LedgerTransaction) -> Result<(), LedgerError> {
        if self.checkpoint.is_none() {
            return Err(LedgerError::NoOpenTransaction);
        }
        self.ledger.execute_transaction(transaction.clone())
    }

    fn commit(&mut self) -> Result<(), LedgerError> {
        self.checkpoint.take().map(|_| ()).ok_or(LedgerError::NoOpenTransaction)
    }

    fn rollback(&mut self) -> Result<(), LedgerError> {
        let checkpoint = self.checkpoint.take().ok_or(LedgerError::NoOpenTransaction)?;
        self.ledger = checkpoint;
        Ok(())
    }

    fn save(&mut self) -> Result<(), LedgerError> {
        debug!("saving ledger to {}", self.path.display());
        let content = serde_json::to_string_pretty(&self.ledger)?;

        // Write next to the target first so a failed write never truncates the ledger.
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(|err| self.io_error(err))?;
        file.write_all(content.as_bytes()).map_err(|err| self.io_error(err))?;
        file.persist(&self.path).map_err(|err| self.io_error(err.error))?;

        Ok(())
    }

    fn balance(&self, account: AccountId) -> Result<Decimal, LedgerError> {
        Ok(self.ledger.balance(account))
    }

    fn transaction_count(&self) -> Result<usize, LedgerError> {
        Ok(self.ledger.transactions().len())
    }
}
