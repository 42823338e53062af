//! Operator prompts.
//!
//! Every read from the terminal goes through `Prompter` so the token
//! providers and the scan loop can be driven by scripted answers in tests.

use anyhow::{Context, Result};
use dialoguer::Input;

#[cfg_attr(test, mockall::automock)]
pub trait Prompter: Send + Sync {
    /// Show `prompt` and return the line the operator typed (may be empty).
    fn ask(&self, prompt: &str) -> Result<String>;
}

/// Interactive terminal prompts via `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, prompt: &str) -> Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .context("Failed to read from terminal")
    }
}
