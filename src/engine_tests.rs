use anyhow::{bail, Result};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::accounting::account::{AccountId, AccountPath};
use crate::accounting::file_ledger::FileLedger;
use crate::accounting::resolver::ResolveError;
use crate::accounting::sqlite_ledger::SqliteLedger;
use crate::accounting::LedgerBackend;
use crate::cache::{CacheError, ImportCache, JsonFileCache, MemoryCache};
use crate::config::ImportConfig;
use crate::engine::*;
use crate::qif::QifError;
use crate::sources::{Source, SourceError};

const COFFEE: &str = "!Type:Bank\nD2014-01-02\nT-12.50\nPCoffee Shop\nLExpenses:Food\n^\n";
const GROCERIES: &str = "!Type:Bank\nD2014-01-05\nT-42.00\nPMarket\nMWeekly shopping\nLExpenses:Food\n^\n";

fn file_ledger() -> Result<(tempfile::TempDir, FileLedger)> {
    let dir = tempfile::tempdir()?;
    let ledger = FileLedger::open(&dir.path().join("ledger.json"), true)?;
    Ok((dir, ledger))
}

fn find<B: LedgerBackend>(backend: &B, path: &str) -> Result<Option<AccountId>> {
    let Some(path) = AccountPath::parse(path, ':') else {
        bail!("invalid account path {path:?}");
    };
    let mut parent = None;
    for name in path.segments() {
        match backend.find_account(parent, name)? {
            Some(id) => parent = Some(id),
            None => return Ok(None),
        }
    }
    Ok(parent)
}

fn balance_of<B: LedgerBackend>(backend: &B, path: &str) -> Result<Decimal> {
    match find(backend, path)? {
        Some(id) => Ok(backend.balance(id)?),
        None => bail!("account {path} does not exist"),
    }
}

fn source(identifier: &str, text: &str) -> Result<Source, SourceError> {
    Ok(Source {
        identifier: identifier.to_string(),
        text: text.to_string(),
    })
}

#[test]
fn test_import_coffee_shop() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();

    let outcome = ImportEngine::new(&mut ledger, &mut cache, &config).import_source("2014-01.qif", COFFEE, false)?;

    assert_eq!(outcome, ImportOutcome::Imported { transactions: 1 });
    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(12.50));
    assert_eq!(balance_of(&ledger, "Assets:Imported")?, dec!(-12.50));
    assert!(cache.contains("2014-01.qif"));

    let stored = &ledger.ledger().transactions()[0];
    assert_eq!(stored.currency, "EUR");
    assert_eq!(stored.description, "Coffee Shop");
    assert_eq!(stored.date, NaiveDate::from_ymd_opt(2014, 1, 2).unwrap());
    assert_eq!(stored.notes, None);

    Ok(())
}

#[test]
fn test_second_import_is_skipped() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let mut engine = ImportEngine::new(&mut ledger, &mut cache, &config);

    engine.import_source("2014-01.qif", COFFEE, false)?;
    let outcome = engine.import_source("2014-01.qif", COFFEE, false)?;

    assert_eq!(outcome, ImportOutcome::Skipped);
    assert_eq!(ledger.transaction_count()?, 1);
    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(12.50));

    Ok(())
}

#[test]
fn test_import_is_idempotent_across_runs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ledger_path = dir.path().join("ledger.json");
    let cache_path = dir.path().join("cache.json");
    let config = ImportConfig::default();

    for _ in 0..2 {
        let mut ledger = FileLedger::open(&ledger_path, true)?;
        let mut cache = JsonFileCache::load(&cache_path)?;
        ImportEngine::new(&mut ledger, &mut cache, &config).import_source("2014-01.qif", COFFEE, false)?;
    }

    let ledger = FileLedger::open(&ledger_path, false)?;
    assert_eq!(ledger.transaction_count()?, 1);
    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(12.50));

    Ok(())
}

#[test]
fn test_split_mismatch_commits_nothing() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = format!("{COFFEE}D2014-01-03\nT-100.00\nPFuel Station\nSExpenses:Food\n$-60.00\nSExpenses:Fuel\n$-30.00\n^\n");

    match ImportEngine::new(&mut ledger, &mut cache, &config).import_source("split.qif", &text, false) {
        Err(ImportError::Qif(QifError::MalformedInput { .. })) => {},
        Err(err) => bail!("unexpected error {err}"),
        Ok(outcome) => bail!("mismatched splits were imported: {outcome:?}"),
    }

    assert_eq!(ledger.transaction_count()?, 0);
    assert!(ledger.ledger().accounts().is_empty());
    assert!(!cache.contains("split.qif"));

    Ok(())
}

#[test]
fn test_splits_balance_exactly() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = "!Type:Bank\nD2014-01-03\nT-100.00\nPFuel Station\nSExpenses:Food\nESnacks\n$-60.00\nSExpenses:Fuel\n$-39.996\n^\n";

    ImportEngine::new(&mut ledger, &mut cache, &config).import_source("split.qif", text, false)?;

    let stored = &ledger.ledger().transactions()[0];
    assert_eq!(stored.postings.len(), 3);
    assert_eq!(stored.total(), Decimal::ZERO);
    assert_eq!(stored.postings[1].memo.as_deref(), Some("Snacks"));
    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(60));
    assert_eq!(balance_of(&ledger, "Expenses:Fuel")?, dec!(40));
    assert_eq!(balance_of(&ledger, "Assets:Imported")?, dec!(-100));

    Ok(())
}

#[test]
fn test_every_posted_transaction_balances() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = "!Type:Bank\nD2014-01-02\nT-12.50\nLExpenses:Food\n^\nD2014-01-03\nT1500\nLIncome:Salary\n^\nD2014-01-04\nT-3\n^\nD2014-01-05\nT-200\nL[Assets:Savings]\n^\n";

    ImportEngine::new(&mut ledger, &mut cache, &config).import_source("mixed.qif", text, false)?;

    let transactions = ledger.ledger().transactions();
    assert_eq!(transactions.len(), 4);
    assert!(transactions.iter().all(|transaction| transaction.is_balanced()));
    assert_eq!(balance_of(&ledger, "Imbalance-EUR")?, dec!(3));
    assert_eq!(balance_of(&ledger, "Assets:Savings")?, dec!(200));

    Ok(())
}

#[test]
fn test_description_falls_back_to_memo() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = format!("{GROCERIES}D2014-01-06\nT-1\nMATM fee\nLExpenses:Bank\n^\n");

    ImportEngine::new(&mut ledger, &mut cache, &config).import_source("memo.qif", &text, false)?;

    let transactions = ledger.ledger().transactions();
    assert_eq!(transactions[0].description, "Market");
    assert_eq!(transactions[0].notes.as_deref(), Some("Weekly shopping"));
    assert_eq!(transactions[1].description, "ATM fee");
    assert_eq!(transactions[1].notes, None);

    Ok(())
}

#[test]
fn test_account_block_selects_source_account() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = "!Account\nNAssets:Checking\nTBank\n^\n!Type:Bank\nD2014-01-02\nT-12.50\nLExpenses:Food\n^\n";

    ImportEngine::new(&mut ledger, &mut cache, &config).import_source("checking.qif", text, false)?;

    assert_eq!(balance_of(&ledger, "Assets:Checking")?, dec!(-12.50));
    assert_eq!(find(&ledger, "Assets:Imported")?, None);

    Ok(())
}

#[test]
fn test_slash_separator_builds_nested_accounts() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig {
        separator: '/',
        ..ImportConfig::default()
    };
    let text = "!Type:Bank\nD2014-01-02\nT-12.50\nPCoffee Shop\nLExpenses/Food\n^\n";

    ImportEngine::new(&mut ledger, &mut cache, &config).import_source("2014-01.qif", text, false)?;

    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(12.50));
    assert_eq!(balance_of(&ledger, "Assets:Imported")?, dec!(-12.50));
    assert_eq!(ledger.ledger().accounts().len(), 4);

    Ok(())
}

#[test]
fn test_dry_run_leaves_no_trace() -> Result<()> {
    let (dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let mut engine = ImportEngine::new(&mut ledger, &mut cache, &config);

    let outcome = engine.import_source("2014-01.qif", COFFEE, true)?;
    assert_eq!(outcome, ImportOutcome::DryRun { transactions: 1 });

    // A later real import of the same source is not blocked.
    let outcome = engine.import_source("2014-01.qif", COFFEE, false)?;
    assert_eq!(outcome, ImportOutcome::Imported { transactions: 1 });

    assert_eq!(ledger.transaction_count()?, 1);
    assert!(cache.contains("2014-01.qif"));
    assert!(dir.path().join("ledger.json").exists());

    Ok(())
}

#[test]
fn test_dry_run_does_not_touch_ledger_or_cache() -> Result<()> {
    let (dir, mut ledger) = file_ledger()?;
    let cache_path = dir.path().join("cache.json");
    let mut cache = JsonFileCache::load(&cache_path)?;
    let config = ImportConfig::default();

    ImportEngine::new(&mut ledger, &mut cache, &config).import_source("2014-01.qif", COFFEE, true)?;

    assert_eq!(ledger.transaction_count()?, 0);
    assert!(ledger.ledger().accounts().is_empty());
    assert!(cache.is_empty());
    assert!(!cache_path.exists());
    assert!(!dir.path().join("ledger.json").exists());

    Ok(())
}

#[test]
fn test_dry_run_on_sqlite_never_records_identifier() -> Result<()> {
    let mut ledger = SqliteLedger::open_in_memory()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let mut engine = ImportEngine::new(&mut ledger, &mut cache, &config);

    for _ in 0..2 {
        let outcome = engine.import_source("2014-01.qif", COFFEE, true)?;
        assert_eq!(outcome, ImportOutcome::DryRun { transactions: 1 });
    }

    // The database writes immediately, but the file stays importable.
    assert!(!cache.contains("2014-01.qif"));
    assert!(cache.is_empty());
    assert_eq!(ledger.transaction_count()?, 2);

    Ok(())
}

#[test]
fn test_resolution_failure_rolls_back_whole_file() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = format!("{COFFEE}D2014-01-03\nT-5\nLExpenses::Broken\n^\n");

    match ImportEngine::new(&mut ledger, &mut cache, &config).import_source("broken.qif", &text, false) {
        Err(ImportError::AccountResolution(ResolveError::EmptySegment(category))) => {
            assert_eq!(category, "Expenses::Broken")
        },
        Err(err) => bail!("unexpected error {err}"),
        Ok(outcome) => bail!("file with an invalid category was imported: {outcome:?}"),
    }

    assert_eq!(ledger.transaction_count()?, 0);
    assert!(ledger.ledger().accounts().is_empty());
    assert!(!cache.contains("broken.qif"));

    Ok(())
}

#[test]
fn test_resolution_failure_rolls_back_sqlite() -> Result<()> {
    let mut ledger = SqliteLedger::open_in_memory()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let text = format!("{COFFEE}D2014-01-03\nT-5\nLExpenses::Broken\n^\n");

    let result = ImportEngine::new(&mut ledger, &mut cache, &config).import_source("broken.qif", &text, false);

    assert!(matches!(result, Err(ImportError::AccountResolution(_))));
    assert_eq!(ledger.transaction_count()?, 0);
    assert_eq!(find(&ledger, "Expenses:Food")?, None);

    Ok(())
}

#[test]
fn test_date_from_leaves_out_older_transactions() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig {
        date_from: NaiveDate::from_ymd_opt(2014, 1, 3),
        ..ImportConfig::default()
    };
    let text = format!("{COFFEE}D2014-01-03\nT-5\nLExpenses:Food\n^\n");

    let outcome = ImportEngine::new(&mut ledger, &mut cache, &config).import_source("2014-01.qif", &text, false)?;

    assert_eq!(outcome, ImportOutcome::Imported { transactions: 1 });
    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(5));

    Ok(())
}

#[test]
fn test_skip_duplicate_entries() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig {
        skip_duplicate_entries: true,
        ..ImportConfig::default()
    };
    let mut engine = ImportEngine::new(&mut ledger, &mut cache, &config);

    let first = engine.import_source("2014-01.qif", &format!("{COFFEE}D2014-01-02\nT-12.50\nPCoffee Shop\nLExpenses:Food\n^\n"), false)?;
    let overlapping = engine.import_source("2014-01-full.qif", &format!("{COFFEE}{GROCERIES}"), false)?;

    assert_eq!(first, ImportOutcome::Imported { transactions: 1 });
    assert_eq!(overlapping, ImportOutcome::Imported { transactions: 1 });
    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(54.50));

    Ok(())
}

#[test]
fn test_duplicates_are_kept_by_default() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    let config = ImportConfig::default();
    let mut engine = ImportEngine::new(&mut ledger, &mut cache, &config);

    engine.import_source("a.qif", COFFEE, false)?;
    engine.import_source("b.qif", COFFEE, false)?;

    assert_eq!(balance_of(&ledger, "Expenses:Food")?, dec!(25));

    Ok(())
}

#[test]
fn test_run_continues_past_failed_sources() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let mut cache = MemoryCache::new();
    cache.record("old.qif")?;
    let config = ImportConfig::default();

    let sources = vec![
        source("2014-01.qif", COFFEE),
        source("broken.qif", "!Type:Bank\nD2014-01-03\nTtwelve\n^\n"),
        Err(SourceError::Device {
            identifier: "phone.qif".to_string(),
            reason: "device disconnected".to_string(),
        }),
        source("old.qif", COFFEE),
        source("2014-02.qif", GROCERIES),
    ];
    let summary = ImportEngine::new(&mut ledger, &mut cache, &config).run(sources, false)?;

    let statuses: Vec<(&str, SourceStatus)> = summary
        .reports()
        .iter()
        .map(|report| (report.identifier().as_str(), report.status()))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("2014-01.qif", SourceStatus::Imported),
            ("broken.qif", SourceStatus::Failed),
            ("phone.qif", SourceStatus::Failed),
            ("old.qif", SourceStatus::Skipped),
            ("2014-02.qif", SourceStatus::Imported),
        ]
    );
    assert_eq!(summary.count(SourceStatus::Imported), 2);
    assert!(summary.has_failures());
    assert!(summary.reports()[1].error().is_some());
    assert_eq!(ledger.transaction_count()?, 2);
    assert!(!cache.contains("broken.qif"));

    Ok(())
}

struct BrokenCache;

impl ImportCache for BrokenCache {
    fn contains(&self, _identifier: &str) -> bool {
        false
    }

    fn record(&mut self, _identifier: &str) -> Result<(), CacheError> {
        Err(CacheError::Corrupt {
            path: "cache.json".into(),
            reason: "disk full".to_string(),
        })
    }
}

#[test]
fn test_cache_failure_stops_run() -> Result<()> {
    let (_dir, mut ledger) = file_ledger()?;
    let config = ImportConfig::default();

    let sources = vec![source("2014-01.qif", COFFEE), source("2014-02.qif", GROCERIES)];
    let result = ImportEngine::new(&mut ledger, &mut BrokenCache, &config).run(sources, false);

    if let Err(err) = result {
        assert!(err.is_fatal());
        assert!(matches!(err, ImportError::Cache(_)));
    } else {
        bail!("a cache that cannot record should abort the run");
    }

    // The second source was never attempted.
    assert_eq!(ledger.transaction_count()?, 1);

    Ok(())
}
