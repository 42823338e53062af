//! Credential acquisition.
//!
//! Defines the `TokenProvider` trait and provides two sources:
//! - `StaticTokenProvider`: env vars, operator re-entry on expiry
//! - `BrowserTokenProvider`: headless login that captures tokens off the wire
//!
//! Refreshed tokens are written back to the env file so the next session
//! starts with them.

pub mod browser;
pub mod capture;
pub mod env_file;
pub mod manual;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::config::{AppConfig, TokenSource, TokensConfig};
use crate::console::Prompter;
use crate::types::{Credentials, Service};

pub use browser::BrowserTokenProvider;
pub use manual::StaticTokenProvider;

/// Abstraction over credential sources.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Credentials to start the session with.
    async fn initial(&self) -> Result<Credentials>;

    /// Re-acquire the tokens for `service`. The returned set carries the
    /// other service's tokens over from `current`.
    async fn refresh(&self, service: Service, current: &Credentials) -> Result<Credentials>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Build the provider selected in config.
pub fn build_provider(config: &AppConfig, prompter: Arc<dyn Prompter>) -> Box<dyn TokenProvider> {
    let manual = StaticTokenProvider::new(config.tokens.clone(), prompter);
    match config.tokens.source {
        TokenSource::Static => Box::new(manual),
        TokenSource::Browser => Box::new(BrowserTokenProvider::new(config.browser.clone(), manual)),
    }
}

/// Write the tokens of `service` back to the configured env file.
pub fn persist(config: &TokensConfig, service: Service, creds: &Credentials) -> Result<()> {
    match service {
        Service::Valuation => env_file::upsert(
            &config.env_file,
            &[
                (config.auth_token_env.as_str(), creds.auth_token.expose_secret().as_str()),
                (config.app_check_env.as_str(), creds.app_check_token.expose_secret().as_str()),
            ],
        ),
        Service::Images => env_file::upsert(
            &config.env_file,
            &[(config.image_token_env.as_str(), creds.image_token.expose_secret().as_str())],
        ),
    }
}
