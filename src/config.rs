//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (tokens, login credentials) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Every field has a
//! default so a partial or missing file still yields a working setup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub valuation: ValuationConfig,
    pub images: ImagesConfig,
    pub tokens: TokensConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// Directory ledgers are written into.
    pub scans_dir: String,
    /// Fraction of the estimated value offered as payout.
    pub payout_rate: f64,
    /// Ring the terminal bell after each written row.
    pub bell: bool,
    /// Write an explicit error row for failed certs instead of skipping.
    pub write_error_rows: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scans_dir: "scans".to_string(),
            payout_rate: 0.90,
            bell: true,
            write_error_rows: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValuationConfig {
    pub search_url: String,
    pub estimate_url: String,
    /// Condition sent to the estimate step when search omits one.
    pub default_condition: String,
    pub timeout_secs: u64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            search_url: "https://us-central1-cardladder-71d53.cloudfunctions.net/httpCertSearch"
                .to_string(),
            estimate_url:
                "https://us-central1-cardladder-71d53.cloudfunctions.net/httpEstimateValue"
                    .to_string(),
            default_condition: "g10".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    pub base_url: String,
    pub placeholder: String,
    pub timeout_secs: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.psacard.com/publicapi/cert/GetImagesByCertNumber".to_string(),
            placeholder: "./No-Image-Placeholder.svg.png".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where credentials come from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    #[default]
    Static,
    Browser,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokensConfig {
    pub source: TokenSource,
    /// Env file refreshed tokens are written back to.
    pub env_file: String,
    pub auth_token_env: String,
    pub app_check_env: String,
    pub image_token_env: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            source: TokenSource::Static,
            env_file: ".env".to_string(),
            auth_token_env: "CARDLADDER_AUTHORIZATION".to_string(),
            app_check_env: "CARDLADDER_APP_CHECK".to_string(),
            image_token_env: "PSA_API_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub login_url: String,
    pub email_env: String,
    pub password_env: String,
    pub headless: bool,
    pub user_agent: String,
    /// URL fragment of the identity provider's password sign-in call.
    pub sign_in_marker: String,
    /// URL fragment of the valuation search call.
    pub search_marker: String,
    pub email_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    pub input_delay_ms: u64,
    pub post_submit_wait_secs: u64,
    pub element_timeout_secs: u64,
    pub capture_timeout_secs: u64,
    /// Unset means retry the login page forever.
    pub max_login_attempts: Option<u32>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            login_url: "https://app.cardladder.com/login".to_string(),
            email_env: "CARDLADDER_EMAIL".to_string(),
            password_env: "CARDLADDER_PASSWORD".to_string(),
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
                .to_string(),
            sign_in_marker: "identitytoolkit.googleapis.com/v1/accounts:signInWithPassword"
                .to_string(),
            search_marker: "search-zzvl7ri3bq-uc.a.run.app/search".to_string(),
            email_selector: "#email".to_string(),
            password_selector: "#password".to_string(),
            submit_selector: "button.btn.primary.block".to_string(),
            input_delay_ms: 1000,
            post_submit_wait_secs: 10,
            element_timeout_secs: 10,
            capture_timeout_secs: 180,
            max_login_attempts: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            warn!(path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
