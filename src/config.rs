//! Configuration management via environment variables
//!
//! Loads configuration from environment variables with .env file support.
//! Follows 12-factor app principles for cloud-native deployments.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, WafError};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub inspection: InspectionConfig,
    pub access_log: AccessLogConfig,
}

/// Server binding configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream_url: String,
    pub timeout: Duration,
    pub preserve_host: bool,
}

/// Body inspection settings
#[derive(Debug, Clone)]
pub struct InspectionConfig {
    pub enabled: bool,
    /// HTTP status returned for blocked requests
    pub rejection_status: u16,
    /// On engine or framing failure: allow (true) or block (false)
    pub fail_open: bool,
    /// Path to the JSON signature rule file; no file means no rules
    pub rules_path: Option<PathBuf>,
    /// Whether writable temp storage is available for uploaded files
    pub tmp_storage: bool,
    /// Directory for temp files; system default when unset
    pub tmp_dir: Option<PathBuf>,
}

/// Operator-facing access log settings
#[derive(Debug, Clone)]
pub struct AccessLogConfig {
    /// Append-only log file; stdout-only when unset
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Reads .env file if present, then parses environment variables.
    /// Returns error if required variables are missing or invalid.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            server: ServerConfig::from_env()?,
            proxy: ProxyConfig::from_env()?,
            inspection: InspectionConfig::from_env()?,
            access_log: AccessLogConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| WafError::Config(format!("Invalid SERVER_PORT: {}", e)))?;

        Ok(Self { host, port })
    }
}

impl ProxyConfig {
    fn from_env() -> Result<Self> {
        let upstream_url = env::var("PROXY_UPSTREAM_URL")
            .map_err(|_| WafError::Config("PROXY_UPSTREAM_URL is required".to_string()))?;

        let timeout_secs = env::var("PROXY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|e| WafError::Config(format!("Invalid PROXY_TIMEOUT_SECS: {}", e)))?;

        let preserve_host = env::var("PROXY_PRESERVE_HOST")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .map_err(|e| WafError::Config(format!("Invalid PROXY_PRESERVE_HOST: {}", e)))?;

        Ok(Self {
            upstream_url,
            timeout: Duration::from_secs(timeout_secs),
            preserve_host,
        })
    }
}

impl InspectionConfig {
    fn from_env() -> Result<Self> {
        let enabled = env::var("INSPECTION_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .map_err(|e| WafError::Config(format!("Invalid INSPECTION_ENABLED: {}", e)))?;

        let rejection_status = env::var("INSPECTION_REJECTION_STATUS")
            .unwrap_or_else(|_| "403".to_string())
            .parse::<u16>()
            .map_err(|e| {
                WafError::Config(format!("Invalid INSPECTION_REJECTION_STATUS: {}", e))
            })?;

        if !(100..=599).contains(&rejection_status) {
            return Err(WafError::Config(
                "INSPECTION_REJECTION_STATUS must be a valid HTTP status".to_string(),
            ));
        }

        let fail_open = env::var("INSPECTION_FAIL_OPEN")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .map_err(|e| WafError::Config(format!("Invalid INSPECTION_FAIL_OPEN: {}", e)))?;

        let rules_path = env::var("INSPECTION_RULES_PATH").ok().map(PathBuf::from);

        let tmp_storage = env::var("INSPECTION_TMP_STORAGE")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .map_err(|e| WafError::Config(format!("Invalid INSPECTION_TMP_STORAGE: {}", e)))?;

        let tmp_dir = env::var("INSPECTION_TMP_DIR").ok().map(PathBuf::from);

        Ok(Self {
            enabled,
            rejection_status,
            fail_open,
            rules_path,
            tmp_storage,
            tmp_dir,
        })
    }
}

impl AccessLogConfig {
    fn from_env() -> Result<Self> {
        let path = env::var("ACCESS_LOG_PATH").ok().map(PathBuf::from);

        Ok(Self { path })
    }
}
