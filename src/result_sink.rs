// result_sink.rs - Append-only CSV output
//
// Every record is written and flushed as soon as it is accepted, so a crash
// loses at most the row in flight. Write failures are logged and counted but
// never propagated: one bad row or one broken destination must not stop the run.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::detail::DetailRecord;

pub const LISTING_HEADER: [&str; 6] = ["Name", "Category", "Address", "Website", "Phone", "Url"];
pub const COMBINED_HEADER: [&str; 7] = ["Location", "Name", "Category", "Address", "Website", "Phone", "Url"];

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n|\r|\n").expect("valid line break pattern"));

/// Collapse line breaks to spaces and trim. Idempotent.
pub fn sanitize_field(value: &str) -> String {
    LINE_BREAK.replace_all(value, " ").trim().to_string()
}

/// Anything that accepts listing records for persistence.
pub trait RecordSink {
    /// Persist one record. Returns `true` if at least one destination took it.
    fn append(&mut self, record: &DetailRecord) -> bool;
}

/// A CSV file (or any writer) with every field quoted.
pub struct CsvSink {
    writer: csv::Writer<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
    written: usize,
    failures: usize,
}

impl CsvSink {
    /// Create (truncating) a CSV file and write its header.
    pub fn create(path: &Path, header: &[&str]) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        let mut sink = Self::from_writer(Box::new(BufWriter::new(file)), header)?;
        sink.path = Some(path.to_path_buf());
        Ok(sink)
    }

    /// Wrap an arbitrary writer (tests, stdout).
    pub fn from_writer(writer: Box<dyn Write + Send>, header: &[&str]) -> Result<Self> {
        // A row of the wrong width is still written as one whole record
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .flexible(true)
            .from_writer(writer);
        writer.write_record(header).context("Failed to write CSV header")?;
        writer.flush().context("Failed to flush CSV header")?;

        Ok(Self {
            writer,
            path: None,
            written: 0,
            failures: 0,
        })
    }

    /// Sanitize, write and flush one row. Errors are logged, not returned.
    pub fn append_row<I, S>(&mut self, row: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cells: Vec<String> = row.into_iter().map(|c| sanitize_field(c.as_ref())).collect();
        let result = self
            .writer
            .write_record(&cells)
            .map_err(anyhow::Error::from)
            .and_then(|_| self.writer.flush().map_err(anyhow::Error::from));

        match result {
            Ok(()) => {
                self.written += 1;
                true
            }
            Err(e) => {
                self.failures += 1;
                warn!("Failed to write row to {}: {}", self.display_name(), e);
                false
            }
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn display_name(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stream>".to_string())
    }
}

/// Writes each listing to the per-target file and to the combined file,
/// the latter with a leading location column.
pub struct ListingWriter<'a> {
    location: &'a str,
    per_target: &'a mut CsvSink,
    combined: Option<&'a mut CsvSink>,
}

impl<'a> ListingWriter<'a> {
    pub fn new(location: &'a str, per_target: &'a mut CsvSink, combined: Option<&'a mut CsvSink>) -> Self {
        Self {
            location,
            per_target,
            combined,
        }
    }
}

impl RecordSink for ListingWriter<'_> {
    fn append(&mut self, record: &DetailRecord) -> bool {
        let row = record.row();
        let wrote_target = self.per_target.append_row(row);
        let wrote_combined = match self.combined.as_deref_mut() {
            Some(combined) => combined.append_row(std::iter::once(self.location).chain(row)),
            None => false,
        };
        wrote_target || wrote_combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn sample_record(name: &str) -> DetailRecord {
        DetailRecord {
            url: "https://maps.example/place/1".to_string(),
            name: name.to_string(),
            category: "Furniture store".to_string(),
            address: "Calle Mayor 1\nToledo".to_string(),
            website: String::new(),
            phone: "+34 925 000 000".to_string(),
        }
    }

    /// Writer that always fails, for exercising error tolerance.
    struct BrokenWriter {
        fail: Arc<Mutex<bool>>,
    }

    impl Write for BrokenWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if *self.fail.lock().unwrap() {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            } else {
                Ok(buf.len())
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            if *self.fail.lock().unwrap() {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_sanitize_collapses_line_breaks() {
        assert_eq!(sanitize_field("  a\r\nb\nc\rd  "), "a b c d");
        assert_eq!(sanitize_field(&sanitize_field("x\ny")), "x y");
    }

    #[test]
    fn test_create_writes_quoted_header_and_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("listings.csv");
        let mut sink = CsvSink::create(&path, &LISTING_HEADER).unwrap();

        assert!(sink.append_row(["Bob's \"Best\" Shop", "", "Main St\n2", "", "", "u"]));
        assert_eq!(sink.written(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"Name\",\"Category\",\"Address\",\"Website\",\"Phone\",\"Url\""
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"Bob's \"\"Best\"\" Shop\",\"\",\"Main St 2\",\"\",\"\",\"u\""
        );
    }

    #[test]
    fn test_rows_visible_before_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("incremental.csv");
        let mut sink = CsvSink::create(&path, &LISTING_HEADER).unwrap();
        sink.append_row(["a", "b", "c", "d", "e", "f"]);

        // Flushed per row: readable while the sink is still open.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        drop(sink);
    }

    #[test]
    fn test_uneven_row_does_not_merge_with_next() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("uneven.csv");
        let mut sink = CsvSink::create(&path, &["Name", "Website"]).unwrap();

        assert!(sink.append_row(["A", "a.com", "extra"]));
        assert!(sink.append_row(["B", "b.com"]));
        assert_eq!(sink.written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "\"B\",\"b.com\"");
    }

    #[test]
    fn test_write_failure_is_counted_not_raised() {
        let fail = Arc::new(Mutex::new(false));
        let mut sink = CsvSink::from_writer(Box::new(BrokenWriter { fail: fail.clone() }), &LISTING_HEADER).unwrap();
        *fail.lock().unwrap() = true;

        assert!(!sink.append_row(["a", "b", "c", "d", "e", "f"]));
        assert_eq!(sink.failures(), 1);
        assert_eq!(sink.written(), 0);
    }

    #[test]
    fn test_listing_writer_fills_both_destinations() {
        let tmp = TempDir::new().unwrap();
        let mut per_target = CsvSink::create(&tmp.path().join("t.csv"), &LISTING_HEADER).unwrap();
        let mut combined = CsvSink::create(&tmp.path().join("all.csv"), &COMBINED_HEADER).unwrap();

        {
            let mut writer = ListingWriter::new("toledo", &mut per_target, Some(&mut combined));
            assert!(writer.append(&sample_record("Casa Muebles")));
        }

        let combined_text = std::fs::read_to_string(tmp.path().join("all.csv")).unwrap();
        assert!(combined_text.lines().nth(1).unwrap().starts_with("\"toledo\",\"Casa Muebles\""));
        assert!(combined_text.contains("\"Calle Mayor 1 Toledo\""));
        assert_eq!(per_target.written(), 1);
        assert_eq!(combined.written(), 1);
    }

    #[test]
    fn test_listing_writer_survives_one_broken_destination() {
        let tmp = TempDir::new().unwrap();
        let fail = Arc::new(Mutex::new(false));
        let mut broken = CsvSink::from_writer(Box::new(BrokenWriter { fail: fail.clone() }), &LISTING_HEADER).unwrap();
        let mut combined = CsvSink::create(&tmp.path().join("all.csv"), &COMBINED_HEADER).unwrap();
        *fail.lock().unwrap() = true;

        let mut writer = ListingWriter::new("toledo", &mut broken, Some(&mut combined));
        assert!(writer.append(&sample_record("Casa Muebles")));
        drop(writer);

        assert_eq!(broken.failures(), 1);
        assert_eq!(combined.written(), 1);
    }
}
