//! Log in through the browser, capture the valuation tokens and save them
//! to the env file so the scanner can start with fresh credentials.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, warn};

use certscan::config::AppConfig;
use certscan::console::TerminalPrompter;
use certscan::logging;
use certscan::tokens::{env_file, persist, BrowserTokenProvider, StaticTokenProvider};
use certscan::types::{redact, Service};

#[tokio::main]
async fn main() -> Result<()> {
    let env_problem = env_file::load_default();

    let cfg = AppConfig::load_or_default("config.toml")?;
    logging::init("certscan=info,capture_tokens=info");

    if let Some(e) = env_problem {
        warn!(error = %e, "Could not fully load .env, keys from the bad line on are missing");
    }

    let env_tokens = StaticTokenProvider::new(cfg.tokens.clone(), Arc::new(TerminalPrompter));
    let current = env_tokens.load_from_env();

    let provider = BrowserTokenProvider::new(
        cfg.browser.clone(),
        StaticTokenProvider::new(cfg.tokens.clone(), Arc::new(TerminalPrompter)),
    );

    println!("🔐 Logging in at {} ...", cfg.browser.login_url);
    let captured = provider.capture().await.context("Token capture failed")?;
    let creds = current.with_valuation(captured.auth_token, captured.app_check_token);

    persist(&cfg.tokens, Service::Valuation, &creds)
        .with_context(|| format!("Failed to save tokens to {}", cfg.tokens.env_file))?;
    info!(env_file = %cfg.tokens.env_file, "Captured tokens saved");

    println!("✅ Tokens saved to {}", cfg.tokens.env_file);
    println!("   {} = {}", cfg.tokens.auth_token_env, redact(creds.auth_token.expose_secret()));
    println!("   {} = {}", cfg.tokens.app_check_env, redact(creds.app_check_token.expose_secret()));
    Ok(())
}
