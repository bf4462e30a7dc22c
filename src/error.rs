//! Unified error types for waf-gate

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WafError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Upstream connection failed: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule set error: {0}")]
    Rules(String),
}

pub type Result<T> = std::result::Result<T, WafError>;
