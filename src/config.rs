//! # Configuration Module
//!
//! This module handles loading the tool's own settings from environment
//! variables (and a local `.env` file). It demonstrates:
//! - Structs with named fields
//! - The Default trait for sensible defaults
//! - Error handling with Result types
//!
//! Note that this is *not* the project configuration (see `workflow.rs`),
//! only where to find the platform and how long to wait for it.

use anyhow::{Context, Result};
use reqwest::Url;
use std::env;
use std::path::PathBuf;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Settings shared by every subcommand.
///
/// # Rust Concept: Derive Macros
/// - Debug: Allows printing with {:?} format
/// - Clone: Creates a deep copy of the struct
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the AI Refinery API
    pub base_url: String,

    /// The `.env` file holding ACCOUNT and API_KEY
    pub env_file: PathBuf,

    /// Base URL of the mermaid.ink rendering service
    pub mermaid_ink_url: String,

    /// Timeout for every HTTP request, in seconds
    pub timeout_secs: u64,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://api.airefinery.accenture.com".to_string(),

            // Credentials live next to the project, like python-dotenv does it
            env_file: PathBuf::from(".env"),

            mermaid_ink_url: "https://mermaid.ink".to_string(),

            timeout_secs: 30,
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Rust Concept: The ? Operator
    ///
    /// If a variable is set but can't be parsed, `?` returns the error
    /// early, with the message added by `.context()`.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(val) = lookup("AIR_BASE_URL") {
            config.base_url = val;
        }

        if let Some(val) = lookup("AIR_ENV_FILE") {
            config.env_file = PathBuf::from(val);
        }

        if let Some(val) = lookup("MERMAID_INK_URL") {
            config.mermaid_ink_url = val;
        }

        if let Some(val) = lookup("AIR_TIMEOUT_SECS") {
            config.timeout_secs = val
                .parse()
                .context("AIR_TIMEOUT_SECS must be a valid positive integer")?;
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Fail fast with a clear error instead of a confusing connection error
    /// later.
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.base_url) {
            anyhow::bail!(
                "AIR_BASE_URL must be an http(s) URL, got: {:?}",
                self.base_url
            );
        }

        if !is_http_url(&self.mermaid_ink_url) {
            anyhow::bail!(
                "MERMAID_INK_URL must be an http(s) URL, got: {:?}",
                self.mermaid_ink_url
            );
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("AIR_TIMEOUT_SECS must be at least 1");
        }

        if self.env_file.as_os_str().is_empty() {
            anyhow::bail!("AIR_ENV_FILE cannot be empty");
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}
