//! waf-gate - Entry point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use waf_gate::access_log::AccessLog;
use waf_gate::config::Config;
use waf_gate::correlation::CorrelationLog;
use waf_gate::inspect::{InspectionGate, SignatureRuleSet, TempStorage};
use waf_gate::proxy::{ProxyClient, ProxyConfig};
use waf_gate::server::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let rule_set = match &config.inspection.rules_path {
        Some(path) => {
            let rule_set = SignatureRuleSet::from_file(path)?;
            tracing::info!(path = %path.display(), rules = rule_set.len(), "Rule set loaded");
            rule_set
        }
        None => {
            tracing::warn!("No rule set configured, all traffic passes inspection");
            SignatureRuleSet::empty()
        }
    };

    let storage = TempStorage::new(
        config.inspection.tmp_storage,
        config.inspection.tmp_dir.clone(),
    );
    let gate = InspectionGate::new(
        Arc::new(rule_set),
        storage,
        config.inspection.enabled,
        config.inspection.fail_open,
    );

    let correlation = Arc::new(CorrelationLog::new());
    let access_log = AccessLog::open(config.access_log.path.as_deref())?;

    let proxy_config = ProxyConfig::new(config.proxy.upstream_url.clone())
        .with_timeout(config.proxy.timeout)
        .with_preserve_host(config.proxy.preserve_host);
    let proxy_client = ProxyClient::new(proxy_config)?;

    let server = Server::bind(
        addr,
        gate,
        correlation,
        proxy_client,
        access_log,
        config.inspection.rejection_status,
    )
    .await?;
    server.run().await?;

    Ok(())
}
