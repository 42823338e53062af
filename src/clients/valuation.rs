//! Valuation service integration.
//!
//! Two Firebase callable functions, always used in sequence:
//! 1. `httpCertSearch`: cert + grader → `gemRateId` (+ condition)
//! 2. `httpEstimateValue`: gemRateId + grader + condition → valuation
//!
//! Requests use the callable envelope `{"data": {...}}` and responses come
//! back as `{"result": {...}}`.
//!
//! Auth headers: `authorization` (sent as stored, already carries its
//! `Bearer` prefix) and `x-firebase-appcheck`. A 401 on either step means
//! the tokens have expired.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{ValuationSource, USER_AGENT};
use crate::config::ValuationConfig;
use crate::types::{
    loose_string, CertRequest, Credentials, ScanError, Service, ValuationResult,
};

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default, deserialize_with = "loose_string")]
    gem_rate_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EstimateEnvelope {
    #[serde(default)]
    result: Option<ValuationResult>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the valuation service.
pub struct ValuationClient {
    http: Client,
    search_url: String,
    estimate_url: String,
    default_condition: String,
}

impl ValuationClient {
    pub fn new(config: &ValuationConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for valuation service")?;

        Ok(Self {
            http,
            search_url: config.search_url.clone(),
            estimate_url: config.estimate_url.clone(),
            default_condition: config.default_condition.clone(),
        })
    }

    /// POST a callable-function payload and decode the JSON response.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        step: &str,
        creds: &Credentials,
        data: serde_json::Value,
    ) -> Result<T, ScanError> {
        debug!(url, step, "Valuation request");

        let resp = self
            .http
            .post(url)
            .header("accept", "*/*")
            .header("authorization", creds.auth_token.expose_secret().as_str())
            .header("x-firebase-appcheck", creds.app_check_token.expose_secret().as_str())
            .json(&json!({ "data": data }))
            .send()
            .await
            .map_err(|e| ScanError::transient(Service::Valuation, format!("{step}: {e}")))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            info!(step, "Valuation service rejected credentials");
            return Err(ScanError::CredentialsExpired {
                service: Service::Valuation,
            });
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::transient(
                Service::Valuation,
                format!("{step} error {status}: {body}"),
            ));
        }

        resp.json().await.map_err(|e| {
            ScanError::transient(Service::Valuation, format!("{step} response: {e}"))
        })
    }
}

#[async_trait]
impl ValuationSource for ValuationClient {
    async fn get_valuation(
        &self,
        creds: &Credentials,
        cert: &CertRequest,
    ) -> Result<Option<ValuationResult>, ScanError> {
        let grader = cert.grader.as_lower();

        // 1. Search
        let search: SearchEnvelope = self
            .call(
                &self.search_url,
                "search",
                creds,
                json!({ "cert": cert.cert_number, "grader": grader }),
            )
            .await?;

        let Some(found) = search.result else {
            debug!(cert = %cert, "Search returned no result");
            return Ok(None);
        };
        let Some(gem_rate_id) = found.gem_rate_id else {
            debug!(cert = %cert, "No gemRateId for cert");
            return Ok(None);
        };
        let condition = found
            .condition
            .unwrap_or_else(|| self.default_condition.clone());

        // 2. Estimate
        let estimate: EstimateEnvelope = self
            .call(
                &self.estimate_url,
                "estimateValue",
                creds,
                json!({
                    "gemRateId": gem_rate_id,
                    "gradingCompany": grader,
                    "condition": condition,
                }),
            )
            .await?;

        Ok(estimate.result.map(|mut v| {
            if v.gem_rate_id.is_none() {
                v.gem_rate_id = Some(gem_rate_id);
            }
            v
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
