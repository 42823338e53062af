//! Batch scanner.
//!
//! Takes the certs parsed from one line of input and, strictly one at a
//! time, looks up the valuation, then the images, then appends a ledger
//! row. Each cert moves through
//! `Pending → Fetching Valuation → Fetching Images → Writing Row → Done`
//! and can end in `Failed` at either fetch.
//!
//! Credential expiry triggers one refresh of the rejected service's tokens
//! and one retry of the same cert. Nothing else aborts a batch except a
//! refresh that cannot complete.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rust_decimal::Decimal;
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clients::{ImageSource, ValuationSource};
use crate::config::ScannerConfig;
use crate::ledger::{payout_rate, Ledger, LedgerRow};
use crate::tokens::TokenProvider;
use crate::types::{CertRequest, Credentials, ImagePair, ScanError, Service, ValuationResult};

/// 30-cell bar of `#` and `-` with percent and counts.
const PROGRESS_TEMPLATE: &str = "[{bar:30}] {percent}% ({pos}/{len}) {msg}";

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

/// Per-session behaviour switches.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub payout_rate: Decimal,
    pub bell: bool,
    pub write_error_rows: bool,
    pub show_progress: bool,
}

impl ScanSettings {
    pub fn from_config(config: &ScannerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            payout_rate: payout_rate(config.payout_rate)?,
            bell: config.bell,
            write_error_rows: config.write_error_rows,
            show_progress: true,
        })
    }
}

/// How a single cert ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertOutcome {
    Written,
    NoMatch,
    Failed(String),
}

/// Summary of one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Every cert attempted, whatever its outcome.
    pub processed: usize,
    pub written: usize,
    pub no_match: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finished scanning {} cert(s) in {:.1} seconds!",
            self.processed,
            self.elapsed.as_secs_f64()
        )
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    valuation: Box<dyn ValuationSource>,
    images: Box<dyn ImageSource>,
    tokens: Box<dyn TokenProvider>,
    ledger: Ledger,
    creds: Credentials,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        valuation: Box<dyn ValuationSource>,
        images: Box<dyn ImageSource>,
        tokens: Box<dyn TokenProvider>,
        ledger: Ledger,
        creds: Credentials,
        settings: ScanSettings,
    ) -> Self {
        Self {
            valuation,
            images,
            tokens,
            ledger,
            creds,
            settings,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn credentials(&self) -> &Credentials {
        &self.creds
    }

    /// Scan every cert in order, one at a time.
    ///
    /// Returns `Err` only when a credential refresh fails; every other
    /// failure is reported inline and counted in the report.
    pub async fn run_batch(&mut self, certs: &[CertRequest]) -> Result<BatchReport, ScanError> {
        let started = Instant::now();
        let pb = self.progress_bar(certs.len() as u64);
        let mut report = BatchReport {
            processed: 0,
            written: 0,
            no_match: 0,
            failed: 0,
            elapsed: Duration::ZERO,
        };

        info!(count = certs.len(), "Starting batch");

        for cert in certs {
            pb.set_message(format!("Scanning {} Cert: {}", cert.grader, cert.cert_number));

            let outcome = match self.process_cert(cert, &pb).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    pb.abandon();
                    warn!(cert = %cert, error = %e, "Batch aborted");
                    return Err(e);
                }
            };

            report.processed += 1;
            match outcome {
                CertOutcome::Written => report.written += 1,
                CertOutcome::NoMatch => report.no_match += 1,
                CertOutcome::Failed(_) => report.failed += 1,
            }
            pb.inc(1);
        }

        pb.finish();
        report.elapsed = started.elapsed();

        info!(
            processed = report.processed,
            written = report.written,
            no_match = report.no_match,
            failed = report.failed,
            elapsed_secs = format!("{:.1}", report.elapsed.as_secs_f64()),
            "Batch complete"
        );
        Ok(report)
    }

    /// Drive one cert through fetch → write, with one refresh-and-retry.
    async fn process_cert(
        &mut self,
        cert: &CertRequest,
        pb: &ProgressBar,
    ) -> Result<CertOutcome, ScanError> {
        let fetched = match self.fetch(cert).await {
            Err(ScanError::CredentialsExpired { service }) => {
                notify(pb, format!("🔑 {service} credentials expired"));
                self.refresh(service, pb).await?;
                notify(pb, format!("🔄 Rescanning Cert: {}", cert.cert_number));
                self.fetch(cert).await
            }
            other => other,
        };

        let (valuation, images) = match fetched {
            Ok(Some(found)) => found,
            Ok(None) => {
                notify(pb, format!("⚠️ No valuation found for {cert}, skipping."));
                return Ok(CertOutcome::NoMatch);
            }
            Err(e) => return Ok(self.record_failure(cert, &e, pb)),
        };

        debug!(cert = %cert, "Writing row");
        let row = LedgerRow::new(cert, &valuation, &images, self.settings.payout_rate);
        if let Err(e) = self.ledger.append(&row) {
            let err = ScanError::Ledger(format!("{e:#}"));
            return Ok(self.record_failure(cert, &err, pb));
        }

        if self.settings.bell {
            print!("\x07");
            let _ = std::io::stdout().flush();
        }
        Ok(CertOutcome::Written)
    }

    /// Valuation, then images. `None` when the valuation service has no
    /// record; images are not requested in that case.
    async fn fetch(
        &self,
        cert: &CertRequest,
    ) -> Result<Option<(ValuationResult, ImagePair)>, ScanError> {
        debug!(cert = %cert, "Fetching valuation");
        let Some(valuation) = self.valuation.get_valuation(&self.creds, cert).await? else {
            return Ok(None);
        };

        debug!(cert = %cert, "Fetching images");
        let images = self.images.get_images(&self.creds, &cert.cert_number).await?;
        Ok(Some((valuation, images)))
    }

    /// Swap in fresh credentials for `service`. The bar is hidden while the
    /// provider may be prompting the operator.
    async fn refresh(&mut self, service: Service, pb: &ProgressBar) -> Result<(), ScanError> {
        info!(%service, provider = self.tokens.name(), "Refreshing credentials");

        let visible = !pb.is_hidden();
        pb.set_draw_target(ProgressDrawTarget::hidden());
        let result = self.tokens.refresh(service, &self.creds).await;
        if visible {
            pb.set_draw_target(ProgressDrawTarget::stderr());
        }

        self.creds = result.map_err(|e| ScanError::RefreshFailed(format!("{e:#}")))?;
        Ok(())
    }

    fn record_failure(&mut self, cert: &CertRequest, err: &ScanError, pb: &ProgressBar) -> CertOutcome {
        let reason = err.to_string();
        warn!(cert = %cert, error = %reason, "Cert failed");
        notify(pb, format!("❌ Failed to scan {cert}: {reason}"));

        if self.settings.write_error_rows {
            if let Err(e) = self.ledger.append(&LedgerRow::error(cert, &reason)) {
                warn!(cert = %cert, error = %e, "Could not write error row");
            }
        }
        CertOutcome::Failed(reason)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#-");
        ProgressBar::new(total).with_style(style)
    }
}

/// Print a message above the bar, or plainly when there is no bar.
fn notify(pb: &ProgressBar, msg: String) {
    if pb.is_hidden() {
        println!("{msg}");
    } else {
        pb.println(msg);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
