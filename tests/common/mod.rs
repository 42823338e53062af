//! Shared fixtures for integration tests.
//!
//! Hand-written stand-ins for the operator prompt and the token provider,
//! plus config builders that point the real HTTP clients at a `wiremock`
//! server.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use certscan::config::{ImagesConfig, TokensConfig, ValuationConfig};
use certscan::console::Prompter;
use certscan::engine::ScanSettings;
use certscan::tokens::TokenProvider;
use certscan::types::{Credentials, Service};

pub const PLACEHOLDER: &str = "./No-Image-Placeholder.svg.png";

// ---------------------------------------------------------------------------
// Config builders
// ---------------------------------------------------------------------------

pub fn valuation_config(server_uri: &str) -> ValuationConfig {
    ValuationConfig {
        search_url: format!("{server_uri}/search"),
        estimate_url: format!("{server_uri}/estimate"),
        default_condition: "g10".to_string(),
        timeout_secs: 5,
    }
}

pub fn images_config(server_uri: &str) -> ImagesConfig {
    ImagesConfig {
        base_url: format!("{server_uri}/images/"),
        placeholder: PLACEHOLDER.to_string(),
        timeout_secs: 5,
    }
}

/// Token config whose env file lives in `dir`.
pub fn tokens_config(dir: &Path) -> TokensConfig {
    TokensConfig {
        env_file: dir.join(".env").to_string_lossy().to_string(),
        ..TokensConfig::default()
    }
}

pub fn quiet_settings() -> ScanSettings {
    ScanSettings {
        payout_rate: dec!(0.90),
        bell: false,
        write_error_rows: false,
        show_progress: false,
    }
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

pub fn search_body(gem_rate_id: &str) -> Value {
    json!({ "result": { "gemRateId": gem_rate_id, "condition": "g10" } })
}

pub fn estimate_body(description: &str, value: f64) -> Value {
    json!({
        "result": {
            "description": description,
            "grade": "10",
            "estimatedValue": value,
            "confidence": "high",
            "index": "Pokemon",
            "indexId": "pk-1",
            "population": 120,
            "indexPercentChange": 2.5,
            "lastSaleDate": "2026-09-30"
        }
    })
}

pub fn images_body(cert: &str) -> Value {
    json!([
        { "IsFrontImage": true, "ImageURL": format!("https://img.test/{cert}/front.jpg") },
        { "IsFrontImage": false, "ImageURL": format!("https://img.test/{cert}/back.jpg") }
    ])
}

// ---------------------------------------------------------------------------
// Scripted prompter
// ---------------------------------------------------------------------------

/// Answers prompts from a fixed script and records what was asked.
#[derive(Clone, Default)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<String>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.iter().map(|a| a.to_string()).collect())),
            asked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, prompt: &str) -> Result<String> {
        self.asked.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("input closed"))
    }
}

// ---------------------------------------------------------------------------
// Token provider
// ---------------------------------------------------------------------------

/// Provider that hands out fixed replacement tokens and counts refreshes.
#[derive(Clone)]
pub struct MockTokenProvider {
    refreshes: Arc<Mutex<Vec<Service>>>,
    /// If set, every refresh fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockTokenProvider {
    pub fn new() -> Self {
        Self {
            refreshes: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(msg: &str) -> Self {
        let p = Self::new();
        *p.force_error.lock().unwrap() = Some(msg.to_string());
        p
    }

    pub fn refreshes(&self) -> Vec<Service> {
        self.refreshes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn initial(&self) -> Result<Credentials> {
        Ok(Credentials::new("Bearer old", "app-old", "img-old"))
    }

    async fn refresh(&self, service: Service, current: &Credentials) -> Result<Credentials> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        self.refreshes.lock().unwrap().push(service);
        Ok(match service {
            Service::Valuation => {
                current.with_valuation("Bearer new".to_string(), "app-new".to_string())
            }
            Service::Images => current.with_image_token("img-new".to_string()),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
