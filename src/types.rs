//! Shared types for CERTSCAN.
//!
//! These types form the data model used across the parser, the service
//! clients, the token providers and the scan engine.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Grader
// ---------------------------------------------------------------------------

/// Grading authority that issued a cert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grader {
    Psa,
    Sgc,
    Bgs,
}

impl Grader {
    /// Lower-case form expected by the valuation service.
    pub fn as_lower(&self) -> &'static str {
        match self {
            Grader::Psa => "psa",
            Grader::Sgc => "sgc",
            Grader::Bgs => "bgs",
        }
    }
}

impl fmt::Display for Grader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grader::Psa => write!(f, "PSA"),
            Grader::Sgc => write!(f, "SGC"),
            Grader::Bgs => write!(f, "BGS"),
        }
    }
}

impl FromStr for Grader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PSA" => Ok(Grader::Psa),
            "SGC" => Ok(Grader::Sgc),
            "BGS" => Ok(Grader::Bgs),
            other => Err(format!("Unknown grader: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Cert request
// ---------------------------------------------------------------------------

/// One cert extracted from operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRequest {
    pub grader: Grader,
    /// At least six digits.
    pub cert_number: String,
}

impl CertRequest {
    pub fn new(grader: Grader, cert_number: impl Into<String>) -> Self {
        Self {
            grader,
            cert_number: cert_number.into(),
        }
    }
}

impl fmt::Display for CertRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.grader, self.cert_number)
    }
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

/// Market valuation for a single cert, as returned by the estimate step.
///
/// The valuation service is loose about JSON types (a grade may arrive as
/// `"10"` or `10`), so display fields are normalised to strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    #[serde(default, deserialize_with = "loose_string")]
    pub gem_rate_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub grade: Option<String>,
    #[serde(default, deserialize_with = "loose_decimal")]
    pub estimated_value: Option<Decimal>,
    #[serde(default, deserialize_with = "loose_string")]
    pub confidence: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub index: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub index_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub population: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub index_percent_change: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub last_sale_date: Option<String>,
}

/// Accept a string, number or bool and normalise it to a string.
/// `null` and empty strings become `None`.
pub(crate) fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

/// Accept a JSON number or numeric string as a `Decimal`.
fn loose_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let text = match value {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s,
        _ => return Ok(None),
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map(Some)
        .map_err(serde::de::Error::custom)
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Front and back image URLs for a cert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub front_image_url: String,
    pub back_image_url: String,
}

impl ImagePair {
    /// Both sides pointing at the placeholder image.
    pub fn placeholder(placeholder: &str) -> Self {
        Self {
            front_image_url: placeholder.to_string(),
            back_image_url: placeholder.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Which upstream service a set of tokens belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Valuation,
    Images,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Valuation => write!(f, "valuation"),
            Service::Images => write!(f, "images"),
        }
    }
}

/// Bearer credentials for both services.
///
/// Owned by the scan engine and passed by reference into every client
/// call. A refresh produces a whole new value.
pub struct Credentials {
    /// Sent verbatim as the valuation `authorization` header.
    pub auth_token: SecretString,
    /// Sent as the valuation `x-firebase-appcheck` header.
    pub app_check_token: SecretString,
    /// Bearer token for the image service.
    pub image_token: SecretString,
}

impl Credentials {
    pub fn new(
        auth_token: impl Into<String>,
        app_check_token: impl Into<String>,
        image_token: impl Into<String>,
    ) -> Self {
        Self {
            auth_token: SecretString::new(auth_token.into()),
            app_check_token: SecretString::new(app_check_token.into()),
            image_token: SecretString::new(image_token.into()),
        }
    }

    /// Replace the valuation tokens, keeping the image token.
    pub fn with_valuation(&self, auth_token: String, app_check_token: String) -> Self {
        Self::new(
            auth_token,
            app_check_token,
            self.image_token.expose_secret().clone(),
        )
    }

    /// Replace the image token, keeping the valuation tokens.
    pub fn with_image_token(&self, image_token: String) -> Self {
        Self::new(
            self.auth_token.expose_secret().clone(),
            self.app_check_token.expose_secret().clone(),
            image_token,
        )
    }

    /// Whether both valuation tokens are non-empty.
    pub fn has_valuation(&self) -> bool {
        !self.auth_token.expose_secret().is_empty()
            && !self.app_check_token.expose_secret().is_empty()
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self::new(
            self.auth_token.expose_secret().clone(),
            self.app_check_token.expose_secret().clone(),
            self.image_token.expose_secret().clone(),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_token", &redact(self.auth_token.expose_secret()))
            .field("app_check_token", &redact(self.app_check_token.expose_secret()))
            .field("image_token", &redact(self.image_token.expose_secret()))
            .finish()
    }
}

/// Short, log-safe preview of a token.
pub fn redact(token: &str) -> String {
    if token.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}… ({} chars)", token.chars().count())
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures the scan engine makes decisions on.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{service} credentials expired")]
    CredentialsExpired { service: Service },

    #[error("{service} request failed: {message}")]
    Transient { service: Service, message: String },

    #[error("Ledger write failed: {0}")]
    Ledger(String),

    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),
}

impl ScanError {
    pub fn transient(service: Service, err: impl fmt::Display) -> Self {
        ScanError::Transient {
            service,
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
