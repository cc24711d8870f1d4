use std::process::ExitCode;

use anyhow::{Context, Result};
use log::info;

use qif_ledger_import::accounting::Backend;
use qif_ledger_import::cache::JsonFileCache;
use qif_ledger_import::data;
use qif_ledger_import::engine::{ImportEngine, SourceStatus};
use qif_ledger_import::sources::{MtpTools, SourceEnumerator};

mod args;

fn main() -> Result<ExitCode> {
    let args = args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    let cache_path = match &args.cache {
        Some(path) => path.clone(),
        None => JsonFileCache::default_path().context("cannot locate the home directory, pass --cache")?,
    };
    let mut cache = JsonFileCache::load(&cache_path)?;
    let mut backend = Backend::open(&args.ledger, args.create_ledger)?;

    let config = args.import_config();
    let enumerator = SourceEnumerator::new(args.files.clone(), args.identify_by, MtpTools);
    let summary = ImportEngine::new(&mut backend, &mut cache, &config).run(enumerator.sources(), args.dry_run)?;

    data::export_csv(&summary, std::io::stdout())?;
    info!(
        "{} imported, {} skipped, {} dry run, {} failed",
        summary.count(SourceStatus::Imported),
        summary.count(SourceStatus::Skipped),
        summary.count(SourceStatus::DryRun),
        summary.count(SourceStatus::Failed)
    );

    if summary.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
