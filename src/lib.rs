//! CERTSCAN: trading-card cert valuation scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry points.

pub mod config;
pub mod types;
pub mod parser;
pub mod clients;
pub mod tokens;
pub mod console;
pub mod ledger;
pub mod engine;
pub mod logging;
