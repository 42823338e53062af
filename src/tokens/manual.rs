//! Static tokens with operator re-entry.
//!
//! Tokens are read from env vars at startup. When a service rejects them
//! the operator pastes replacements, which are saved to the env file.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{persist, TokenProvider};
use crate::config::TokensConfig;
use crate::console::Prompter;
use crate::types::{Credentials, Service};

pub struct StaticTokenProvider {
    config: TokensConfig,
    prompter: Arc<dyn Prompter>,
}

impl StaticTokenProvider {
    pub fn new(config: TokensConfig, prompter: Arc<dyn Prompter>) -> Self {
        Self { config, prompter }
    }

    pub fn config(&self) -> &TokensConfig {
        &self.config
    }

    /// Read all three tokens from the environment. Missing variables become
    /// empty tokens so the first rejected request triggers re-entry.
    pub fn load_from_env(&self) -> Credentials {
        let read = |name: &str| {
            std::env::var(name).unwrap_or_else(|_| {
                warn!(var = name, "Token not set in environment");
                String::new()
            })
        };
        Credentials::new(
            read(&self.config.auth_token_env),
            read(&self.config.app_check_env),
            read(&self.config.image_token_env),
        )
    }

    /// Ask the operator for one token; blank answers fail the refresh.
    fn ask_token(&self, var: &str) -> Result<String> {
        let answer = self
            .prompter
            .ask(&format!("Paste new {var} token"))
            .with_context(|| format!("Failed to read {var}"))?;
        let token = answer.trim();
        if token.is_empty() {
            bail!("No value entered for {var}");
        }
        Ok(token.to_string())
    }

    /// Prompt for the expired service's tokens and persist them.
    pub fn prompt_refresh(&self, service: Service, current: &Credentials) -> Result<Credentials> {
        println!("\n🔄 {service} tokens expired. Please paste new tokens:");

        let updated = match service {
            Service::Valuation => {
                let auth = self.ask_token(&self.config.auth_token_env)?;
                let app_check = self.ask_token(&self.config.app_check_env)?;
                current.with_valuation(auth, app_check)
            }
            Service::Images => {
                let image = self.ask_token(&self.config.image_token_env)?;
                current.with_image_token(image)
            }
        };

        persist(&self.config, service, &updated)?;
        info!(%service, env_file = %self.config.env_file, "Tokens updated");
        println!("✅ {} updated. Reloading tokens...\n", self.config.env_file);
        Ok(updated)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn initial(&self) -> Result<Credentials> {
        Ok(self.load_from_env())
    }

    async fn refresh(&self, service: Service, current: &Credentials) -> Result<Credentials> {
        self.prompt_refresh(service, current)
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MockPrompter;
    use secrecy::ExposeSecret;

    fn temp_config() -> TokensConfig {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut env_file = std::env::temp_dir();
        env_file.push(format!("certscan_manual_{id}"));
        TokensConfig {
            env_file: env_file.to_string_lossy().to_string(),
            auth_token_env: format!("CERTSCAN_TEST_AUTH_{id}"),
            app_check_env: format!("CERTSCAN_TEST_APP_{id}"),
            image_token_env: format!("CERTSCAN_TEST_IMG_{id}"),
            ..TokensConfig::default()
        }
    }

    #[test]
    fn test_load_from_env_missing_is_empty() {
        let cfg = temp_config();
        std::env::set_var(&cfg.image_token_env, "img-token");
        let provider = StaticTokenProvider::new(cfg.clone(), Arc::new(MockPrompter::new()));

        let creds = provider.load_from_env();
        assert!(!creds.has_valuation());
        assert_eq!(creds.image_token.expose_secret(), "img-token");
        std::env::remove_var(&cfg.image_token_env);
    }

    #[test]
    fn test_refresh_valuation_prompts_twice_and_persists() {
        let cfg = temp_config();
        let auth_var = cfg.auth_token_env.clone();
        let app_var = cfg.app_check_env.clone();
        let mut prompter = MockPrompter::new();
        prompter
            .expect_ask()
            .withf(move |p| p.contains(auth_var.as_str()))
            .times(1)
            .returning(|_| Ok("  Bearer fresh \n".to_string()));
        prompter
            .expect_ask()
            .withf(move |p| p.contains(app_var.as_str()))
            .times(1)
            .returning(|_| Ok("app-fresh".to_string()));

        let provider = StaticTokenProvider::new(cfg.clone(), Arc::new(prompter));
        let current = Credentials::new("old", "old", "img");
        let updated = provider.prompt_refresh(Service::Valuation, &current).unwrap();

        assert_eq!(updated.auth_token.expose_secret(), "Bearer fresh");
        assert_eq!(updated.app_check_token.expose_secret(), "app-fresh");
        assert_eq!(updated.image_token.expose_secret(), "img");

        let saved = std::fs::read_to_string(&cfg.env_file).unwrap();
        assert!(saved.contains(&format!("{}=\"Bearer fresh\"", cfg.auth_token_env)));
        assert!(saved.contains(&format!("{}=\"app-fresh\"", cfg.app_check_env)));
        assert!(!saved.contains(&cfg.image_token_env));
        std::fs::remove_file(&cfg.env_file).unwrap();
    }

    #[test]
    fn test_refresh_images_prompts_once() {
        let cfg = temp_config();
        let mut prompter = MockPrompter::new();
        prompter
            .expect_ask()
            .times(1)
            .returning(|_| Ok("psa-new".to_string()));

        let provider = StaticTokenProvider::new(cfg.clone(), Arc::new(prompter));
        let updated = provider
            .prompt_refresh(Service::Images, &Credentials::new("a", "b", "old"))
            .unwrap();
        assert_eq!(updated.image_token.expose_secret(), "psa-new");
        assert_eq!(updated.auth_token.expose_secret(), "a");
        std::fs::remove_file(&cfg.env_file).unwrap();
    }

    #[test]
    fn test_blank_answer_fails_refresh() {
        let cfg = temp_config();
        let mut prompter = MockPrompter::new();
        prompter.expect_ask().returning(|_| Ok("   ".to_string()));

        let provider = StaticTokenProvider::new(cfg.clone(), Arc::new(prompter));
        let result = provider.prompt_refresh(Service::Images, &Credentials::new("a", "b", "c"));
        assert!(result.is_err());
        assert!(!std::path::Path::new(&cfg.env_file).exists());
    }

    #[tokio::test]
    async fn test_initial_reads_env() {
        let cfg = temp_config();
        std::env::set_var(&cfg.auth_token_env, "Bearer x");
        std::env::set_var(&cfg.app_check_env, "y");
        let provider = StaticTokenProvider::new(cfg.clone(), Arc::new(MockPrompter::new()));

        let creds = provider.initial().await.unwrap();
        assert!(creds.has_valuation());
        std::env::remove_var(&cfg.auth_token_env);
        std::env::remove_var(&cfg.app_check_env);
    }
}
