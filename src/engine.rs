use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use getset::{CopyGetters, Getters};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::accounting::account::{AccountId, AccountPath};
use crate::accounting::resolver::{AccountResolver, ResolveError};
use crate::accounting::transactions::{LedgerTransaction, Posting};
use crate::accounting::{LedgerBackend, LedgerError};
use crate::cache::{CacheError, ImportCache};
use crate::config::ImportConfig;
use crate::qif::{QifError, QifParser, QifTransaction};
use crate::sources::{Source, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Skipped,
    DryRun { transactions: usize },
    Imported { transactions: usize },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Qif(#[from] QifError),
    #[error(transparent)]
    AccountResolution(#[from] ResolveError),
    #[error(transparent)]
    LedgerCommit(#[from] LedgerError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ImportError {
    /// Errors that stop a run instead of failing a single source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Cache(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Imported,
    Skipped,
    DryRun,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Imported => "imported",
            SourceStatus::Skipped => "skipped",
            SourceStatus::DryRun => "dry-run",
            SourceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct SourceReport {
    #[getset(get = "pub")]
    identifier: String,
    #[getset(get_copy = "pub")]
    status: SourceStatus,
    #[getset(get_copy = "pub")]
    transactions: usize,
    #[getset(get = "pub")]
    error: Option<String>,
}

impl SourceReport {
    fn new(identifier: String, result: &Result<ImportOutcome, ImportError>) -> SourceReport {
        let (status, transactions, error) = match result {
            Ok(ImportOutcome::Skipped) => (SourceStatus::Skipped, 0, None),
            Ok(ImportOutcome::DryRun { transactions }) => (SourceStatus::DryRun, *transactions, None),
            Ok(ImportOutcome::Imported { transactions }) => (SourceStatus::Imported, *transactions, None),
            Err(err) => (SourceStatus::Failed, 0, Some(err.to_string())),
        };
        SourceReport {
            identifier,
            status,
            transactions,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    reports: Vec<SourceReport>,
}

impl RunSummary {
    pub fn reports(&self) -> &[SourceReport] {
        &self.reports
    }

    pub fn count(&self, status: SourceStatus) -> usize {
        self.reports.iter().filter(|report| report.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(SourceStatus::Failed) > 0
    }
}

type EntryKey = (NaiveDate, Decimal, Option<String>, Option<String>, Option<String>);

fn entry_key(transaction: &QifTransaction) -> EntryKey {
    (
        transaction.date,
        transaction.amount,
        transaction.payee.clone(),
        transaction.memo.clone(),
        transaction.category.clone(),
    )
}

/// Imports QIF sources into a ledger, each source atomically and at most once.
pub struct ImportEngine<'a, B, C> {
    backend: &'a mut B,
    cache: &'a mut C,
    config: &'a ImportConfig,
    resolver: AccountResolver,
    seen_entries: HashSet<EntryKey>,
}

impl<'a, B: LedgerBackend, C: ImportCache> ImportEngine<'a, B, C> {
    pub fn new(backend: &'a mut B, cache: &'a mut C, config: &'a ImportConfig) -> ImportEngine<'a, B, C> {
        let resolver = AccountResolver::new(config.separator, &config.currency, &config.imbalance_account());
        ImportEngine {
            backend,
            cache,
            config,
            resolver,
            seen_entries: HashSet::new(),
        }
    }

    pub fn import_source(&mut self, identifier: &str, raw_text: &str, dry_run: bool) -> Result<ImportOutcome, ImportError> {
        if self.cache.contains(identifier) {
            info!("skipping {identifier}, already imported");
            debug!("{identifier}: pending -> skipped");
            return Ok(ImportOutcome::Skipped);
        }

        let parsed = QifParser::new(raw_text, self.config.parse_options()).parse_all()?;
        let transactions = self.select(parsed);
        debug!("{identifier}: pending -> parsed ({} transactions)", transactions.len());

        self.backend.begin()?;
        if let Err(err) = self.post_all(&transactions) {
            debug!("{identifier}: parsed -> failed");
            self.rollback(identifier);
            return Err(err);
        }
        debug!("{identifier}: parsed -> resolved");

        let count = transactions.len();
        if dry_run {
            if self.backend.supports_dry_run() {
                self.backend.rollback()?;
                self.remember(&transactions);
                info!("dry run: {identifier} would import {count} transactions");
                return Ok(ImportOutcome::DryRun { transactions: count });
            }
            warn!("ledger backend writes immediately, {identifier} is written despite dry run");
        }

        if let Err(err) = self.backend.commit() {
            debug!("{identifier}: resolved -> failed");
            self.rollback(identifier);
            return Err(err.into());
        }
        self.backend.save()?;
        debug!("{identifier}: resolved -> committed");

        if dry_run {
            self.remember(&transactions);
            info!("dry run: {identifier} left out of the import cache");
            return Ok(ImportOutcome::DryRun { transactions: count });
        }

        self.cache.record(identifier)?;
        self.remember(&transactions);
        debug!("{identifier}: committed -> recorded");
        info!("imported {count} transactions from {identifier}");

        Ok(ImportOutcome::Imported { transactions: count })
    }

    /// Imports `sources` in order. A source that fails is reported and the run continues, unless the
    /// error is fatal.
    pub fn run<I>(&mut self, sources: I, dry_run: bool) -> Result<RunSummary, ImportError>
    where
        I: IntoIterator<Item = Result<Source, SourceError>>,
    {
        let mut summary = RunSummary::default();

        for source in sources {
            let (identifier, result) = match source {
                Ok(source) => {
                    let result = self.import_source(&source.identifier, &source.text, dry_run);
                    (source.identifier, result)
                },
                Err(err) => (err.identifier().to_string(), Err(ImportError::from(err))),
            };

            let report = SourceReport::new(identifier, &result);
            match result {
                Err(err) if err.is_fatal() => {
                    error!("aborting import at {}: {err}", report.identifier);
                    return Err(err);
                },
                Err(err) => error!("failed to import {}: {err}", report.identifier),
                Ok(_) => {},
            }
            summary.reports.push(report);
        }

        Ok(summary)
    }

    fn select(&self, parsed: Vec<QifTransaction>) -> Vec<QifTransaction> {
        let mut batch = HashSet::new();
        parsed
            .into_iter()
            .filter(|transaction| match self.config.date_from {
                Some(date_from) if transaction.date < date_from => {
                    debug!("leaving out transaction dated {} before {date_from}", transaction.date);
                    false
                },
                _ => true,
            })
            .filter(|transaction| {
                if !self.config.skip_duplicate_entries {
                    return true;
                }
                let key = entry_key(transaction);
                if self.seen_entries.contains(&key) || !batch.insert(key) {
                    debug!("leaving out duplicate entry dated {} for {}", transaction.date, transaction.amount);
                    return false;
                }
                true
            })
            .collect()
    }

    fn remember(&mut self, transactions: &[QifTransaction]) {
        if self.config.skip_duplicate_entries {
            self.seen_entries.extend(transactions.iter().map(entry_key));
        }
    }

    fn rollback(&mut self, identifier: &str) {
        if let Err(err) = self.backend.rollback() {
            error!("rollback of {identifier} failed: {err}");
        }
    }

    fn post_all(&mut self, transactions: &[QifTransaction]) -> Result<(), ImportError> {
        for transaction in transactions {
            let ledger_transaction = self.build(transaction)?;
            self.backend.post_transaction(&ledger_transaction)?;
        }
        Ok(())
    }

    fn source_account(&mut self, transaction: &QifTransaction) -> Result<AccountId, ResolveError> {
        let name = transaction.account.clone().unwrap_or_else(|| self.config.source_account());
        let path = AccountPath::parse(&name, self.config.separator).ok_or(ResolveError::EmptySegment(name))?;
        self.resolver.resolve_path(&mut *self.backend, &path)
    }

    fn build(&mut self, qif: &QifTransaction) -> Result<LedgerTransaction, ImportError> {
        let source = self.source_account(qif)?;

        let (description, notes) = match (&qif.payee, &qif.memo) {
            (Some(payee), memo) => (payee.clone(), memo.clone()),
            (None, Some(memo)) => (memo.clone(), None),
            (None, None) => (String::new(), None),
        };
        let mut transaction = LedgerTransaction::new(qif.date, &self.config.currency, description);
        transaction.notes = notes;
        transaction.push_posting(Posting::new(source, qif.amount));

        if qif.has_splits() {
            for split in &qif.splits {
                let category = self.resolver.resolve(&mut *self.backend, split.category.as_deref())?;
                transaction.push_posting(Posting::new(category.id, -split.amount).with_memo(split.memo.clone()));
            }

            let residual = transaction.total();
            if !residual.is_zero() {
                debug!("moving split residual {residual} onto the last split of {:?}", transaction.description);
                if let Some(last) = transaction.postings.last_mut() {
                    last.amount -= residual;
                }
            }
        } else {
            let category = self.resolver.resolve(&mut *self.backend, qif.category.as_deref())?;
            transaction.push_posting(Posting::new(category.id, -qif.amount));
        }

        Ok(transaction)
    }
}
