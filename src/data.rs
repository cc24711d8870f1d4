use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::engine::{RunSummary, SourceReport};

#[derive(Debug, Serialize)]
pub struct SummaryRecord {
    pub identifier: String,
    pub status: String,
    pub transactions: usize,
    pub error: Option<String>,
}

impl From<&SourceReport> for SummaryRecord {
    fn from(report: &SourceReport) -> Self {
        SummaryRecord {
            identifier: report.identifier().clone(),
            status: report.status().to_string(),
            transactions: report.transactions(),
            error: report.error().clone(),
        }
    }
}

/// Writes one CSV row per source of the run.
pub fn export_csv(summary: &RunSummary, writer: impl Write) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    for report in summary.reports() {
        let record: SummaryRecord = report.into();
        csv_writer.serialize(record)?;
    }

    csv_writer.flush()?;

    Ok(())
}
