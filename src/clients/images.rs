//! Grading-authority image API.
//!
//! `GET {base}/{cert}` with `Authorization: Bearer {token}` returns an array
//! of image descriptors: `[{ "IsFrontImage": true, "ImageURL": "..." }, ...]`.
//! Anything else is treated as "no images" and both sides fall back to the
//! placeholder.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ImageSource, USER_AGENT};
use crate::config::ImagesConfig;
use crate::types::{Credentials, ImagePair, ScanError, Service};

/// One entry in the image API response.
#[derive(Debug, Deserialize)]
struct ImageDescriptor {
    #[serde(rename = "IsFrontImage", default)]
    is_front_image: Option<bool>,
    #[serde(rename = "ImageURL", default)]
    image_url: Option<String>,
}

/// HTTP client for cert images.
pub struct ImageClient {
    http: Client,
    base_url: String,
    placeholder: String,
}

impl ImageClient {
    pub fn new(config: &ImagesConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for image service")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            placeholder: config.placeholder.clone(),
        })
    }

    /// Pick front/back URLs out of a decoded response body.
    fn select_images(&self, body: serde_json::Value) -> ImagePair {
        let serde_json::Value::Array(entries) = body else {
            warn!("Image response has unexpected format, using placeholders");
            return ImagePair::placeholder(&self.placeholder);
        };

        let descriptors: Vec<ImageDescriptor> = entries
            .into_iter()
            .filter_map(|e| serde_json::from_value(e).ok())
            .collect();

        let url_for = |front: bool| {
            descriptors
                .iter()
                .find(|d| d.is_front_image == Some(front))
                .and_then(|d| d.image_url.clone())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.placeholder.clone())
        };

        ImagePair {
            front_image_url: url_for(true),
            back_image_url: url_for(false),
        }
    }
}

#[async_trait]
impl ImageSource for ImageClient {
    async fn get_images(
        &self,
        creds: &Credentials,
        cert_number: &str,
    ) -> Result<ImagePair, ScanError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(cert_number));
        debug!(url = %url, "Fetching cert images");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(creds.image_token.expose_secret())
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ScanError::transient(Service::Images, e))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ScanError::CredentialsExpired {
                service: Service::Images,
            });
        }

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ScanError::transient(Service::Images, e))?;

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(body) => Ok(self.select_images(body)),
            Err(e) => {
                warn!(%status, error = %e, "Image response is not JSON, using placeholders");
                Ok(ImagePair::placeholder(&self.placeholder))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
