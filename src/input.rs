//! Tabular input for the email run.

use std::path::Path;

use anyhow::{Context, Result};

/// Header used when no column looks like a website column.
pub const DEFAULT_WEBSITE_HEADER: &str = "Website";

/// A CSV file held in memory, rows padded to the header width.
#[derive(Debug, Clone)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Index of the website column, if the file has one
    pub website_column: Option<usize>,
}

impl InputTable {
    pub fn website<'a>(&self, row: &'a [String]) -> &'a str {
        self.website_column
            .and_then(|i| row.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    /// Non-empty website cells of the first `limit` rows (0 = all).
    pub fn websites(&self, limit: usize) -> Vec<String> {
        self.rows
            .iter()
            .take(effective_limit(limit, self.rows.len()))
            .map(|row| self.website(row))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub fn effective_limit(limit: usize, total: usize) -> usize {
    if limit == 0 {
        total
    } else {
        limit.min(total)
    }
}

/// First header containing `website` or `url` (case-insensitive), else an
/// exact `Website` header.
pub fn detect_website_column(headers: &[String]) -> Option<usize> {
    headers
        .iter()
        .position(|h| {
            let h = h.to_lowercase();
            h.contains("website") || h.contains("url")
        })
        .or_else(|| headers.iter().position(|h| h == DEFAULT_WEBSITE_HEADER))
}

pub fn read_table(path: &Path) -> Result<InputTable> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Input file not found or unreadable: {}", path.display()))?;
    parse_table(&content)
}

pub fn parse_table(content: &str) -> Result<InputTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to parse CSV record")?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len().max(row.len()), String::new());
        rows.push(row);
    }

    let website_column = detect_website_column(&headers);
    Ok(InputTable {
        headers,
        rows,
        website_column,
    })
}
