//! Core engine: the per-batch scan → value → image → ledger loop.

pub mod scanner;

pub use scanner::{BatchReport, CertOutcome, ScanSettings, Scanner};
