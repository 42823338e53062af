//! Browser-captured valuation tokens.
//!
//! Drives a headless Chromium through the valuation site's login page and
//! lifts the `authorization` and `x-firebase-appcheck` headers off the
//! requests the page makes once signed in. There is no token endpoint to
//! call directly, so this is the only automated way to obtain them.
//!
//! Login is retried (reload + re-enter) for as long as the page stays on
//! the login route, unless `max_login_attempts` caps it. Every input action
//! is followed by a short pause; typing at machine speed gets the session
//! flagged.
//!
//! The image token cannot be obtained this way; its refresh falls back to
//! the operator prompt.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::capture::{CapturedTokens, TokenCapture};
use super::manual::StaticTokenProvider;
use super::{persist, TokenProvider};
use crate::config::{AppConfig, BrowserConfig};
use crate::types::{Credentials, Service};

/// Hides the usual automation fingerprints before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
window.chrome = { runtime: {} };
"#;

/// Poll interval while waiting for a selector to appear.
const ELEMENT_POLL: Duration = Duration::from_millis(250);

pub struct BrowserTokenProvider {
    config: BrowserConfig,
    fallback: StaticTokenProvider,
}

impl BrowserTokenProvider {
    pub fn new(config: BrowserConfig, fallback: StaticTokenProvider) -> Self {
        Self { config, fallback }
    }

    /// Run one full login session and return the captured tokens.
    pub async fn capture(&self) -> Result<CapturedTokens> {
        let email = AppConfig::resolve_env(&self.config.email_env)?;
        let password = SecretString::new(AppConfig::resolve_env(&self.config.password_env)?);

        let mut launch = LaunchConfig::builder()
            .window_size(1366, 768)
            .viewport(Viewport {
                width: 1366,
                height: 768,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .arg(format!("--user-agent={}", self.config.user_agent));
        if !self.config.headless {
            launch = launch.with_head();
        }
        let launch = launch
            .build()
            .map_err(|e| anyhow!("Invalid browser launch config: {e}"))?;

        info!(url = %self.config.login_url, "Launching browser for token capture");
        let (mut browser, mut handler) = Browser::launch(launch)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.run_session(&browser, &email, &password).await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        let _ = handler_task.await;

        result
    }

    async fn run_session(
        &self,
        browser: &Browser,
        email: &str,
        password: &SecretString,
    ) -> Result<CapturedTokens> {
        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser page")?;

        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .context("Failed to install init script")?;

        // Listen before navigating so the sign-in request is not missed.
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("Failed to subscribe to network events")?;
        let mut capture = TokenCapture::new(
            self.config.sign_in_marker.clone(),
            self.config.search_marker.clone(),
        );
        let (tx, rx) = oneshot::channel();
        let listener = tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let request = &event.request;
                if capture.observe(&request.url, &request.method, request.headers.inner()) {
                    let _ = tx.send(capture.tokens());
                    return;
                }
            }
        });

        info!("Navigating to login page");
        page.goto(self.config.login_url.as_str())
            .await
            .context("Failed to load login page")?;

        let login = self.login_until_accepted(&page, email, password).await;
        if let Err(e) = login {
            listener.abort();
            return Err(e);
        }

        let wait = Duration::from_secs(self.config.capture_timeout_secs);
        let captured = tokio::time::timeout(wait, rx).await;
        listener.abort();

        match captured {
            Ok(Ok(Some(tokens))) => {
                info!("Captured both valuation tokens");
                Ok(tokens)
            }
            Ok(_) => bail!("Network listener ended before both tokens were seen"),
            Err(_) => bail!(
                "Timed out after {}s waiting for valuation tokens",
                self.config.capture_timeout_secs
            ),
        }
    }

    /// Submit the login form until the page leaves the login route.
    async fn login_until_accepted(
        &self,
        page: &Page,
        email: &str,
        password: &SecretString,
    ) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.submit_login(page, email, password).await?;

            let url = page.url().await?.unwrap_or_default();
            if !url.contains("login") {
                info!(url = %url, attempt, "Login successful");
                return Ok(());
            }

            if let Some(max) = self.config.max_login_attempts {
                if attempt >= max {
                    bail!("Login rejected after {attempt} attempts");
                }
            }

            warn!(attempt, "Login failed, reloading");
            page.reload().await.context("Failed to reload login page")?;
        }
    }

    async fn submit_login(&self, page: &Page, email: &str, password: &SecretString) -> Result<()> {
        let pause = Duration::from_millis(self.config.input_delay_ms);

        debug!("Waiting for email field");
        let email_field = self.wait_for(page, &self.config.email_selector).await?;
        tokio::time::sleep(pause).await;
        email_field.click().await?.type_str(email).await?;

        tokio::time::sleep(pause).await;
        let password_field = self.wait_for(page, &self.config.password_selector).await?;
        password_field
            .click()
            .await?
            .type_str(password.expose_secret())
            .await?;

        tokio::time::sleep(pause).await;
        self.wait_for(page, &self.config.submit_selector)
            .await?
            .click()
            .await?;
        debug!("Clicked login button");

        tokio::time::sleep(Duration::from_secs(self.config.post_submit_wait_secs)).await;
        Ok(())
    }

    /// Poll for `selector` until it appears or the element timeout elapses.
    async fn wait_for(&self, page: &Page, selector: &str) -> Result<Element> {
        let deadline = Instant::now() + Duration::from_secs(self.config.element_timeout_secs);
        loop {
            match page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(e) if Instant::now() >= deadline => {
                    return Err(e).with_context(|| format!("Timed out waiting for {selector}"));
                }
                Err(_) => tokio::time::sleep(ELEMENT_POLL).await,
            }
        }
    }

    fn persist_capture(&self, creds: &Credentials) {
        if let Err(e) = persist(self.fallback.config(), Service::Valuation, creds) {
            warn!(error = %e, "Could not save captured tokens to env file");
        }
    }
}

#[async_trait]
impl TokenProvider for BrowserTokenProvider {
    async fn initial(&self) -> Result<Credentials> {
        let creds = self.fallback.load_from_env();
        if creds.has_valuation() {
            info!("Using valuation tokens from environment");
            return Ok(creds);
        }
        self.refresh(Service::Valuation, &creds).await
    }

    async fn refresh(&self, service: Service, current: &Credentials) -> Result<Credentials> {
        match service {
            Service::Valuation => {
                println!("\n🔄 Logging in to refresh valuation tokens...");
                let tokens = self.capture().await?;
                let updated = current.with_valuation(tokens.auth_token, tokens.app_check_token);
                self.persist_capture(&updated);
                println!("✅ Valuation tokens refreshed.\n");
                Ok(updated)
            }
            Service::Images => self.fallback.prompt_refresh(service, current),
        }
    }

    fn name(&self) -> &str {
        "browser"
    }
}
