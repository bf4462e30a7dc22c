//! waf-gate - HTTP-inspecting reverse proxy
//!
//! Sits between clients and a backend service:
//! - Decomposes multipart/form-data bodies into named variables
//! - Evaluates the variables against a signature rule set
//! - Forwards allowed requests, rejects blocked ones
//! - Correlates block verdicts with request/response log records

pub mod access_log;
pub mod config;
pub mod correlation;
pub mod error;
pub mod inspect;
pub mod proxy;
pub mod server;
