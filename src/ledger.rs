//! CSV ledger.
//!
//! One file per scanning session, opened once and appended to. Every row is
//! flushed before the next cert starts so a crash never loses a written row.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{CertRequest, ImagePair, ValuationResult};

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One ledger line. Field order is the column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerRow {
    #[serde(rename = "Cert Number")]
    pub cert_number: String,
    #[serde(rename = "Estimated Value")]
    pub estimated_value: String,
    #[serde(rename = "Payout")]
    pub payout: String,
    #[serde(rename = "Last Sale Date")]
    pub last_sale_date: String,
    #[serde(rename = "Confidence")]
    pub confidence: String,
    #[serde(rename = "Grader")]
    pub grader: String,
    #[serde(rename = "Index")]
    pub index: String,
    #[serde(rename = "Index ID")]
    pub index_id: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Grade")]
    pub grade: String,
    #[serde(rename = "Population")]
    pub population: String,
    #[serde(rename = "Index % Change")]
    pub index_percent_change: String,
    #[serde(rename = "Front Image URL")]
    pub front_image_url: String,
    #[serde(rename = "Back Image URL")]
    pub back_image_url: String,
}

impl LedgerRow {
    /// Combine a cert, its valuation and its images into a row.
    pub fn new(
        cert: &CertRequest,
        valuation: &ValuationResult,
        images: &ImagePair,
        payout_rate: Decimal,
    ) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            cert_number: cert.cert_number.clone(),
            estimated_value: valuation
                .estimated_value
                .map(|v| v.normalize().to_string())
                .unwrap_or_default(),
            payout: payout(valuation.estimated_value, payout_rate),
            last_sale_date: text(&valuation.last_sale_date),
            confidence: text(&valuation.confidence),
            grader: cert.grader.to_string(),
            index: text(&valuation.index),
            index_id: text(&valuation.index_id),
            description: text(&valuation.description),
            grade: text(&valuation.grade),
            population: text(&valuation.population),
            index_percent_change: text(&valuation.index_percent_change),
            front_image_url: images.front_image_url.clone(),
            back_image_url: images.back_image_url.clone(),
        }
    }

    /// Row recording a cert that could not be processed.
    pub fn error(cert: &CertRequest, reason: &str) -> Self {
        Self {
            cert_number: cert.cert_number.clone(),
            grader: cert.grader.to_string(),
            description: format!("ERROR: {reason}"),
            ..Self::default()
        }
    }
}

/// Offer price: `estimated × rate`, two decimals, half away from zero.
/// Empty when there is no estimate.
pub fn payout(estimated: Option<Decimal>, rate: Decimal) -> String {
    estimated
        .map(|v| {
            let p = (v * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            format!("{p:.2}")
        })
        .unwrap_or_default()
}

/// Convert the configured payout rate into a `Decimal`.
pub fn payout_rate(rate: f64) -> Result<Decimal> {
    Decimal::from_f64(rate)
        .map(|d| d.round_dp(6))
        .with_context(|| format!("Invalid payout rate: {rate}"))
}

// ---------------------------------------------------------------------------
// File naming
// ---------------------------------------------------------------------------

/// Resolve the operator's filename answer into a ledger path.
///
/// Blank → `SCAN_<date>.csv`; a name without `.csv` gets the extension.
/// Only the final path component is used, so the ledger always lands
/// directly inside `scans_dir`.
pub fn resolve_ledger_path(scans_dir: &Path, answer: &str, today: NaiveDate) -> PathBuf {
    let name = Path::new(answer.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let file_name = match name {
        None => format!("SCAN_{}.csv", today.format("%Y-%m-%d")),
        Some(n) if n.ends_with(".csv") => n.to_string(),
        Some(n) => format!("{n}.csv"),
    };
    scans_dir.join(file_name)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only CSV ledger.
pub struct Ledger {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: usize,
}

impl Ledger {
    /// Open (or create) the ledger. The header is written with the first row
    /// when the file is new or empty; existing content is never truncated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open ledger {}", path.display()))?;

        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to stat ledger {}", path.display()))?
            .len()
            == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);

        info!(path = %path.display(), appending = !is_empty, "Ledger opened");

        Ok(Self {
            path,
            writer,
            rows_written: 0,
        })
    }

    /// Append one row and flush it to disk.
    pub fn append(&mut self, row: &LedgerRow) -> Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("Failed to write row for cert {}", row.cert_number))?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush ledger {}", self.path.display()))?;
        self.rows_written += 1;
        debug!(cert = %row.cert_number, rows = self.rows_written, "Row appended");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle (not counting pre-existing rows).
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Grader;
    use rust_decimal_macros::dec;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("certscan_test_{}", uuid::Uuid::new_v4()));
        p.push("ledger.csv");
        p
    }

    fn sample_row(cert: &str) -> LedgerRow {
        let valuation = ValuationResult {
            gem_rate_id: Some("g-1".into()),
            description: Some("1999 Pokemon Base Charizard".into()),
            grade: Some("9".into()),
            estimated_value: Some(dec!(100)),
            ..ValuationResult::default()
        };
        let images = ImagePair {
            front_image_url: "https://img/f.jpg".into(),
            back_image_url: "https://img/b.jpg".into(),
        };
        LedgerRow::new(&CertRequest::new(Grader::Psa, cert), &valuation, &images, dec!(0.90))
    }

    #[test]
    fn test_payout() {
        assert_eq!(payout(Some(dec!(100)), dec!(0.90)), "90.00");
        assert_eq!(payout(Some(dec!(12.345)), dec!(1)), "12.35");
        assert_eq!(payout(Some(dec!(0.005)), dec!(1)), "0.01");
        assert_eq!(payout(Some(dec!(0)), dec!(0.90)), "0.00");
        assert_eq!(payout(None, dec!(0.90)), "");
    }

    #[test]
    fn test_payout_rate_conversion() {
        assert_eq!(payout_rate(0.90).unwrap(), dec!(0.9));
        assert!(payout_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_row_from_parts() {
        let row = sample_row("12345678");
        assert_eq!(row.cert_number, "12345678");
        assert_eq!(row.estimated_value, "100");
        assert_eq!(row.payout, "90.00");
        assert_eq!(row.grader, "PSA");
        assert_eq!(row.front_image_url, "https://img/f.jpg");
        assert_eq!(row.last_sale_date, "");
    }

    #[test]
    fn test_error_row() {
        let row = LedgerRow::error(&CertRequest::new(Grader::Sgc, "555555"), "timeout");
        assert_eq!(row.grader, "SGC");
        assert_eq!(row.description, "ERROR: timeout");
        assert_eq!(row.payout, "");
    }

    #[test]
    fn test_resolve_path() {
        let dir = Path::new("scans");
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            resolve_ledger_path(dir, "  ", day),
            PathBuf::from("scans/SCAN_2026-10-18.csv")
        );
        assert_eq!(
            resolve_ledger_path(dir, "show-day", day),
            PathBuf::from("scans/show-day.csv")
        );
        assert_eq!(
            resolve_ledger_path(dir, "show-day.csv", day),
            PathBuf::from("scans/show-day.csv")
        );
    }

    #[test]
    fn test_resolve_path_stays_in_scans_dir() {
        let dir = Path::new("scans");
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            resolve_ledger_path(dir, "/tmp/x", day),
            PathBuf::from("scans/x.csv")
        );
        assert_eq!(
            resolve_ledger_path(dir, "../../etc/night.csv", day),
            PathBuf::from("scans/night.csv")
        );
        assert_eq!(
            resolve_ledger_path(dir, "..", day),
            PathBuf::from("scans/SCAN_2026-10-18.csv")
        );
        assert_eq!(
            resolve_ledger_path(dir, "/", day),
            PathBuf::from("scans/SCAN_2026-10-18.csv")
        );
    }

    #[test]
    fn test_header_written_once_across_reopen() {
        let path = temp_path();

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&sample_row("111111")).unwrap();
        drop(ledger);

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&sample_row("222222")).unwrap();
        assert_eq!(ledger.rows_written(), 1);
        drop(ledger);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Cert Number,Estimated Value,Payout,Last Sale Date"));
        assert!(lines[0].ends_with("Front Image URL,Back Image URL"));
        assert!(lines[1].starts_with("111111,100,90.00,"));
        assert!(lines[2].starts_with("222222,"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_same_cert_twice_gives_two_rows() {
        let path = temp_path();
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&sample_row("333333")).unwrap();
        ledger.append(&sample_row("333333")).unwrap();
        drop(ledger);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let certs: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[0].to_string())
            .collect();
        assert_eq!(certs, vec!["333333", "333333"]);

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_description_with_comma_is_quoted() {
        let path = temp_path();
        let mut ledger = Ledger::open(&path).unwrap();
        let mut row = sample_row("444444");
        row.description = "Jordan, Michael".into();
        ledger.append(&row).unwrap();
        drop(ledger);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rec = reader.records().next().unwrap().unwrap();
        assert_eq!(&rec[8], "Jordan, Michael");

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
