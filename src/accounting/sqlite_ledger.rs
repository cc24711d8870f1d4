use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use super::account::{Account, AccountId, AccountKind, NewAccount};
use super::transactions::LedgerTransaction;
use super::{LedgerBackend, LedgerError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    parent_id INTEGER REFERENCES accounts(id),
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    placeholder INTEGER NOT NULL,
    currency TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    currency TEXT NOT NULL,
    description TEXT NOT NULL,
    notes TEXT,
    entered_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS postings (
    id INTEGER PRIMARY KEY,
    transaction_id INTEGER NOT NULL REFERENCES transactions(id),
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    amount TEXT NOT NULL,
    memo TEXT
);
";

/// Ledger stored in a SQLite database.
///
/// Does not support dry runs. `begin`/`rollback` only keep the transactions of a single source
/// atomic.
pub struct SqliteLedger {
    conn: Connection,
    in_transaction: bool,
}

impl SqliteLedger {
    pub fn open(path: &Path, create: bool) -> Result<SqliteLedger, LedgerError> {
        if !create && !path.exists() {
            return Err(LedgerError::Open {
                location: path.display().to_string(),
                reason: "database does not exist".to_string(),
            });
        }
        info!("opening ledger database {}", path.display());
        SqliteLedger::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<SqliteLedger, LedgerError> {
        SqliteLedger::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<SqliteLedger, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteLedger {
            conn,
            in_transaction: false,
        })
    }

    fn account_exists(&self, id: AccountId) -> Result<bool, LedgerError> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM accounts WHERE id = ?1", params![id.0], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl LedgerBackend for SqliteLedger {
    fn supports_dry_run(&self) -> bool {
        false
    }

    fn find_account(&self, parent: Option<AccountId>, name: &str) -> Result<Option<AccountId>, LedgerError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM accounts WHERE parent_id IS ?1 AND name = ?2",
                params![parent.map(|parent| parent.0), name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(AccountId))
    }

    fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let row = self
            .conn
            .query_row(
                "SELECT parent_id, name, kind, placeholder, currency FROM accounts WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let (parent, name, kind, placeholder, currency) = row.ok_or(LedgerError::UnknownAccount(id))?;
        Ok(Account::new(
            id,
            parent.map(AccountId),
            NewAccount {
                name,
                kind: AccountKind::from_str(&kind).unwrap_or(AccountKind::Unspecified),
                placeholder,
                currency,
            },
        ))
    }

    fn create_account(&mut self, parent: Option<AccountId>, account: NewAccount) -> Result<AccountId, LedgerError> {
        if let Some(parent) = parent {
            if !self.account_exists(parent)? {
                return Err(LedgerError::UnknownAccount(parent));
            }
        }
        if self.find_account(parent, &account.name)?.is_some() {
            return Err(LedgerError::DuplicateAccount(account.name));
        }

        self.conn.execute(
            "INSERT INTO accounts (parent_id, name, kind, placeholder, currency) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parent.map(|parent| parent.0),
                account.name,
                account.kind.as_str(),
                account.placeholder,
                account.currency,
            ],
        )?;
        Ok(AccountId(self.conn.last_insert_rowid()))
    }

    fn begin(&mut self) -> Result<(), LedgerError> {
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn post_transaction(&mut self, transaction: &LedgerTransaction) -> Result<(), LedgerError> {
        if !self.in_transaction {
            return Err(LedgerError::NoOpenTransaction);
        }
        if !transaction.is_balanced() {
            return Err(LedgerError::Unbalanced {
                description: transaction.description.clone(),
                total: transaction.total(),
            });
        }
        for posting in &transaction.postings {
            if !self.account_exists(posting.account)? {
                return Err(LedgerError::UnknownAccount(posting.account));
            }
        }

        self.conn.execute(
            "INSERT INTO transactions (date, currency, description, notes, entered_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                transaction.date.format("%Y-%m-%d").to_string(),
                transaction.currency,
                transaction.description,
                transaction.notes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let transaction_id = self.conn.last_insert_rowid();

        let mut insert = self
            .conn
            .prepare_cached("INSERT INTO postings (transaction_id, account_id, amount, memo) VALUES (?1, ?2, ?3, ?4)")?;
        for posting in &transaction.postings {
            insert.execute(params![transaction_id, posting.account.0, posting.amount.to_string(), posting.memo])?;
        }
        debug!("stored transaction {} with {} postings", transaction_id, transaction.postings.len());

        Ok(())
    }

    fn commit(&mut self) -> Result<(), LedgerError> {
        if !self.in_transaction {
            return Err(LedgerError::NoOpenTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), LedgerError> {
        if !self.in_transaction {
            return Err(LedgerError::NoOpenTransaction);
        }
        self.conn.execute_batch("ROLLBACK")?;
        self.in_transaction = false;
        Ok(())
    }

    fn save(&mut self) -> Result<(), LedgerError> {
        // Committed statements are already on disk.
        Ok(())
    }

    fn balance(&self, account: AccountId) -> Result<Decimal, LedgerError> {
        let mut statement = self.conn.prepare_cached("SELECT amount FROM postings WHERE account_id = ?1")?;
        let amounts = statement.query_map(params![account.0], |row| row.get::<_, String>(0))?;

        let mut total = Decimal::ZERO;
        for amount in amounts {
            let amount = amount?;
            total += Decimal::from_str(&amount).map_err(|_| LedgerError::InvalidAmount(amount.clone()))?;
        }
        Ok(total)
    }

    fn transaction_count(&self) -> Result<usize, LedgerError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
