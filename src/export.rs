//! Final CSV for the email run: the input table with an `Emails` column.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info};

use crate::coordinator::ResolutionReport;
use crate::email::NONE_FOUND;
use crate::input::{effective_limit, InputTable};
use crate::result_sink::CsvSink;

pub const EMAILS_HEADER: &str = "Emails";

/// Which processed rows make it into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowGate {
    /// Drop rows whose result is `NA`
    #[default]
    RequireEmail,
    KeepAll,
}

impl RowGate {
    pub fn admits(&self, emails: &str) -> bool {
        match self {
            RowGate::RequireEmail => !emails.is_empty() && emails != NONE_FOUND,
            RowGate::KeepAll => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows within the limit that were looked up
    pub processed: usize,
    /// Processed rows removed by the row gate
    pub dropped: usize,
    /// Rows past the limit, passed through with an empty `Emails` cell
    pub passed_through: usize,
}

/// Insert `Emails` after the website column (or at the end) and fill it for
/// the first `limit` rows (0 = all).
pub fn enrich_table(table: &InputTable, report: &ResolutionReport, limit: usize, gate: RowGate) -> EnrichedTable {
    let width = table.headers.len();
    let position = table.website_column.map(|i| i + 1).unwrap_or(width);

    let mut headers = table.headers.clone();
    headers.insert(position, EMAILS_HEADER.to_string());

    let cut = effective_limit(limit, table.rows.len());
    let mut enriched = EnrichedTable {
        headers,
        processed: cut,
        ..Default::default()
    };

    for row in &table.rows[..cut] {
        let website = table.website(row);
        let emails = if website.is_empty() {
            NONE_FOUND
        } else {
            report.result_for(website)
        };

        if gate.admits(emails) {
            enriched.rows.push(with_cell(row, width, position, emails));
        } else {
            enriched.dropped += 1;
        }
    }

    for row in &table.rows[cut..] {
        enriched.rows.push(with_cell(row, width, position, ""));
        enriched.passed_through += 1;
    }

    debug!(
        "Enriched {} rows ({} dropped, {} passed through)",
        enriched.processed, enriched.dropped, enriched.passed_through
    );
    enriched
}

/// Fit `row` to the header width, then insert `value` at `position`. Cells
/// past the last header are dropped so every output record has one cell per
/// column.
fn with_cell(row: &[String], width: usize, position: usize, value: &str) -> Vec<String> {
    let mut out: Vec<String> = row.iter().take(width).cloned().collect();
    out.resize(width, String::new());
    out.insert(position.min(width), value.to_string());
    out
}

/// Write the enriched table. Returns the number of rows written.
pub fn write_enriched(path: &Path, table: &EnrichedTable) -> Result<usize> {
    let header: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    let mut sink = CsvSink::create(path, &header)?;
    for row in &table.rows {
        sink.append_row(row);
    }
    info!("Wrote {} rows to {}", sink.written(), path.display());
    Ok(sink.written())
}
