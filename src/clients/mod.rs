//! Upstream service integrations.
//!
//! Defines the `ValuationSource` and `ImageSource` traits and provides the
//! HTTP implementations for:
//! - the valuation service (search by cert → estimate value)
//! - the grading authority's public image API

pub mod images;
pub mod valuation;

use async_trait::async_trait;

use crate::types::{CertRequest, Credentials, ImagePair, ScanError, ValuationResult};

/// Abstraction over the market-valuation lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ValuationSource: Send + Sync {
    /// Look up the valuation for a cert.
    ///
    /// `Ok(None)` means the service has no record for this cert.
    async fn get_valuation(
        &self,
        creds: &Credentials,
        cert: &CertRequest,
    ) -> Result<Option<ValuationResult>, ScanError>;
}

/// Abstraction over the cert image lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch front/back image URLs. Unexpected response shapes degrade to
    /// placeholders rather than failing.
    async fn get_images(&self, creds: &Credentials, cert_number: &str)
        -> Result<ImagePair, ScanError>;
}

/// Shared user agent for all service clients.
pub(crate) const USER_AGENT: &str = "CERTSCAN/0.1.0 (cert-valuation-scanner)";
