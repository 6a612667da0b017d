//! NVMe Health Agent - one polling pass over local NVMe drives
//!
//! Configuration comes from `$NVME_HEALTH_CONFIG` or the OS config directory,
//! log level from `RUST_LOG`. Exit status is non-zero when a row could not be
//! written or the report is unusable.

use anyhow::{Context, Result};
use nvme_health_agent::{Agent, AgentConfig, NvmeCli, ReportStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nvme_health_agent=info")),
        )
        .init();

    info!("NVMe Health Agent v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load().await.context("Failed to load configuration")?;

    let store = ReportStore::open_with(&config.report.path, config.store_options())
        .context("Failed to open health report")?;

    let agent = Agent::new(NvmeCli::from_config(&config.nvme), &config, store);
    let summary = agent.run_once().await.context("Polling aborted")?;
    agent.into_store().close();

    if !summary.failed.is_empty() {
        warn!("Rows not written for: {}", summary.failed.join(", "));
        std::process::exit(1);
    }

    Ok(())
}
