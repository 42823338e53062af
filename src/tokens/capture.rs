//! Token extraction from observed browser requests.
//!
//! The login page makes two calls that carry what we need:
//! - the identity provider's password sign-in, with `x-firebase-appcheck`
//! - the valuation search, with `authorization`
//!
//! Each header is taken from the first matching request only.

use tracing::info;

/// Tokens harvested from a completed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedTokens {
    pub auth_token: String,
    pub app_check_token: String,
}

/// Accumulates tokens from a stream of outgoing requests.
#[derive(Debug, Clone)]
pub struct TokenCapture {
    sign_in_marker: String,
    search_marker: String,
    app_check_token: Option<String>,
    auth_token: Option<String>,
}

impl TokenCapture {
    pub fn new(sign_in_marker: impl Into<String>, search_marker: impl Into<String>) -> Self {
        Self {
            sign_in_marker: sign_in_marker.into(),
            search_marker: search_marker.into(),
            app_check_token: None,
            auth_token: None,
        }
    }

    /// Inspect one request. `headers` is the CDP header object.
    /// Returns `true` once both tokens have been seen.
    pub fn observe(&mut self, url: &str, method: &str, headers: &serde_json::Value) -> bool {
        if method.eq_ignore_ascii_case("OPTIONS") {
            return self.is_complete();
        }

        if self.app_check_token.is_none() && url.contains(&self.sign_in_marker) {
            if let Some(token) = header(headers, "x-firebase-appcheck") {
                info!("Captured app-check token");
                self.app_check_token = Some(token);
            }
        }

        if self.auth_token.is_none() && url.contains(&self.search_marker) {
            if let Some(token) = header(headers, "authorization") {
                info!("Captured authorization token");
                self.auth_token = Some(token);
            }
        }

        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.app_check_token.is_some() && self.auth_token.is_some()
    }

    /// Both tokens, if the capture is complete.
    pub fn tokens(&self) -> Option<CapturedTokens> {
        Some(CapturedTokens {
            auth_token: self.auth_token.clone()?,
            app_check_token: self.app_check_token.clone()?,
        })
    }
}

/// Case-insensitive header lookup; empty values count as absent.
fn header(headers: &serde_json::Value, name: &str) -> Option<String> {
    headers
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
