use anyhow::Context;

use docsync_agent::{Agent, build_store, default_registry};
use docsync_infra::AgentConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docsync_observability::init();

    let config = AgentConfig::from_env().context("invalid agent configuration")?;
    let store = build_store(&config)
        .await
        .context("failed to open the durable store")?;
    let registry = default_registry().context("connector plugin registration failed")?;

    let agent = Agent::start(&config, store, registry).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    agent.shutdown().await;
    Ok(())
}
