//! strata Node Agent
//!
//! The node agent runs on each worker host. It registers with the
//! master, launches per-framework executors through the isolation
//! backend, routes tasks, and streams status updates back.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use strata_node_agent::agent::{Agent, AgentEvent};
use strata_node_agent::catalog::AgentInfo;
use strata_node_agent::{actors, Config, MockIsolation, MockTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting strata node agent");

    // Load configuration and probe the host. A failed hostname probe
    // is fatal: the agent cannot register without one.
    let config = Config::from_env()?;
    let info = AgentInfo::detect(&config)?;
    info!(
        hostname = %info.hostname,
        resources = %info.resources,
        work_dir = %config.work_dir.display(),
        "Configuration loaded"
    );

    // The wire transport and the isolation backend are deployment
    // concerns; the development binary runs against the mocks.
    let transport = Arc::new(MockTransport::new(format!("slave@{}:5051", info.hostname)));
    let isolation = Arc::new(MockIsolation::new());

    let (handle, rx) = actors::mailbox::<AgentEvent>("agent", 1024);
    let agent = Agent::new(config, info, transport, isolation, handle.clone());
    let agent_ref = actors::spawn(agent, rx);

    // Ctrl-C translates into a graceful shutdown event.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = handle.send(AgentEvent::Shutdown).await;
        }
    });

    agent_ref.join().await;

    Ok(())
}
