//! Configuration management for the ViettelPay client.
//!
//! This module provides TOML-based configuration file loading with environment
//! variable overrides. The default configuration path is
//! `~/.config/viettelpay/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::{KeyStore, ProcessorOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of every environment variable override.
pub const ENV_PREFIX: &str = "VIETTELPAY_";

/// Default partner API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://partnerapi.bankplus.viettel.com/PartnerAPI/PartnerAPI";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("base_url must start with http:// or https://, got {0}")]
    InvalidBaseUrl(String),

    #[error("timeout_secs must be between 1 and 600, got {0}")]
    InvalidTimeout(u64),

    #[error("account.{0} must not be empty")]
    MissingCredential(&'static str),

    #[error("no {0} key configured: set a path or inline PEM")]
    MissingKey(&'static str),

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Partner API endpoint.
    pub endpoint: EndpointConfig,

    /// Partner account credentials.
    pub account: AccountConfig,

    /// RSA key material.
    pub keys: KeysConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// SOAP endpoint URL.
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Partner account credentials.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    pub service_code: String,
}

/// Key material, either as file paths or inline PEM text.
///
/// Inline PEM wins over a path when both are set.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct KeysConfig {
    /// Path to the partner PKCS#1 private key.
    pub private_key_path: Option<PathBuf>,

    /// Path to the ViettelPay SPKI public key.
    pub public_key_path: Option<PathBuf>,

    /// Inline partner private key PEM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_pem: Option<String>,

    /// Inline ViettelPay public key PEM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("service_code", &self.service_code)
            .finish()
    }
}

impl std::fmt::Debug for KeysConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysConfig")
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field(
                "private_key_pem",
                &self.private_key_pem.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_key_pem", &self.public_key_pem.is_some())
            .finish()
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("viettelpay")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables (all prefixed with `VIETTELPAY_`):
    /// - BASE_URL, USERNAME, PASSWORD, SERVICE_CODE
    /// - PARTNER_PRIVATE_KEY, VIETTEL_PUBLIC_KEY: inline PEM text
    /// - LOG_LEVEL
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok());
    }

    /// Apply overrides from an arbitrary lookup, keyed by unprefixed variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(url) = get("BASE_URL") {
            tracing::info!("Overriding base_url from environment: {}", url);
            self.endpoint.base_url = url;
        }
        if let Some(username) = get("USERNAME") {
            self.account.username = username;
        }
        if let Some(password) = get("PASSWORD") {
            self.account.password = password;
        }
        if let Some(service_code) = get("SERVICE_CODE") {
            self.account.service_code = service_code;
        }
        if let Some(pem) = get("PARTNER_PRIVATE_KEY") {
            tracing::debug!("Using partner private key from environment");
            self.keys.private_key_pem = Some(pem);
        }
        if let Some(pem) = get("VIETTEL_PUBLIC_KEY") {
            tracing::debug!("Using ViettelPay public key from environment");
            self.keys.public_key_pem = Some(pem);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.endpoint.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(url.clone()));
        }

        if self.endpoint.timeout_secs == 0 || self.endpoint.timeout_secs > 600 {
            return Err(ConfigError::InvalidTimeout(self.endpoint.timeout_secs));
        }

        if self.account.username.is_empty() {
            return Err(ConfigError::MissingCredential("username"));
        }
        if self.account.password.is_empty() {
            return Err(ConfigError::MissingCredential("password"));
        }
        if self.account.service_code.is_empty() {
            return Err(ConfigError::MissingCredential("service_code"));
        }

        if self.keys.private_key_pem.is_none() && self.keys.private_key_path.is_none() {
            return Err(ConfigError::MissingKey("partner private"));
        }
        if self.keys.public_key_pem.is_none() && self.keys.public_key_path.is_none() {
            return Err(ConfigError::MissingKey("ViettelPay public"));
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.timeout_secs)
    }

    /// Account settings handed to the envelope processor.
    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions::new(
            self.account.username.clone(),
            self.account.password.clone(),
            self.account.service_code.clone(),
        )
    }

    /// Reads the configured PEM material and builds the key store.
    pub fn load_key_store(&self) -> Result<KeyStore> {
        let private_pem = read_pem(
            self.keys.private_key_pem.as_deref(),
            self.keys.private_key_path.as_deref(),
            "partner private key",
        )?;
        let public_pem = read_pem(
            self.keys.public_key_pem.as_deref(),
            self.keys.public_key_path.as_deref(),
            "ViettelPay public key",
        )?;

        KeyStore::from_pem(&private_pem, &public_pem).context("Failed to load key material")
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Returns inline PEM text or the contents of `path`.
fn read_pem(inline: Option<&str>, path: Option<&Path>, what: &str) -> Result<String> {
    if let Some(pem) = inline {
        return Ok(pem.to_string());
    }

    let path = path.with_context(|| format!("No {} configured", what))?;
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}: {}", what, path.display()))
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
