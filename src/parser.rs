//! Cert extraction from free-form operator input.
//!
//! Handles scanner output (`PSA12345678`), pasted lists with mixed graders
//! and bare cert numbers, which default to PSA.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{CertRequest, Grader};

static GRADER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PSA|SGC|BGS").expect("valid grader regex"));

static CERT_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{6,}").expect("valid cert regex"));

/// Extract every `(grader, cert)` pair from a line of input.
///
/// Each grader token claims the first run of six or more digits between it
/// and the next token. Tokens without such a run are dropped. With no
/// grader token at all, the first digit run is taken as a PSA cert.
pub fn parse_certs(input: &str) -> Vec<CertRequest> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    let tokens: Vec<_> = GRADER_TOKEN.find_iter(&cleaned).collect();

    if tokens.is_empty() {
        return CERT_DIGITS
            .find(&cleaned)
            .map(|m| vec![CertRequest::new(Grader::Psa, m.as_str())])
            .unwrap_or_default();
    }

    let mut certs = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        let segment_end = tokens.get(i + 1).map_or(cleaned.len(), |next| next.start());
        let segment = &cleaned[token.end()..segment_end];

        let Ok(grader) = token.as_str().parse::<Grader>() else {
            continue;
        };
        if let Some(digits) = CERT_DIGITS.find(segment) {
            certs.push(CertRequest::new(grader, digits.as_str()));
        }
    }
    certs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
