//! takt-worker — one clustered alert-coordination node.
//!
//! Connects to the shared Postgres store, checks in every minute, and runs
//! its share of alert-rule evaluations. Start the same binary on every node;
//! the nodes divide the work among themselves through the store, with no
//! leader and no node-to-node traffic.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info};

use takt_coordinator::{ClusterCoordinator, JobQueue, SystemClock};
use takt_core::config::{load_dotenv, Config};
use takt_store::{init_pg_pool, PgStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Clustered alert coordination worker.
#[derive(Parser, Debug)]
#[command(name = "takt-worker", version, about)]
struct Cli {
    /// Node id override; defaults to TAKT_NODE_ID or a generated id.
    #[arg(long)]
    node_id: Option<String>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(node_id) = cli.node_id {
        config.cluster.node_id = node_id;
    }
    info!(node_id = %config.cluster.node_id, "takt-worker starting");

    if !config.cluster.clustering_enabled {
        info!("clustering is disabled, nothing to coordinate");
        return Ok(());
    }

    let pool = init_pg_pool(&config.postgres).await?;
    let store = Arc::new(PgStore::new(pool));
    let engine = Arc::new(JobQueue::new());

    let shutdown = Arc::new(Notify::new());
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        shutdown_on_signal.notify_waiters();
    });

    let coordinator = ClusterCoordinator::new(
        config.cluster,
        store.clone(),
        store,
        engine,
        Arc::new(SystemClock),
    );
    coordinator.run(shutdown).await?;

    info!("takt-worker exited cleanly");
    Ok(())
}
