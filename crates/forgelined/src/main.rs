//! forgelined — the Forgeline daemon.
//!
//! Single binary that assembles the blueprint distribution engine:
//! - State store (redb)
//! - Version store + comparator
//! - Binding registry
//! - Rollout orchestrator + rollback manager
//! - Auto-upgrade worker (publish event consumer)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! forgelined serve --port 8620 --data-dir /var/lib/forgeline
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use forgeline_binding::BindingRegistry;
use forgeline_rollout::{AutoUpgradeWorker, BindingLocks, RollbackManager, RolloutOrchestrator};
use forgeline_state::StateStore;
use forgeline_version::{VersionComparator, VersionStore, publish_channel};

#[derive(Parser)]
#[command(name = "forgelined", about = "Forgeline daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (state store, rollout engine, REST API).
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8620")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/forgeline")]
        data_dir: PathBuf,

        /// Disable the auto-upgrade worker (publishes stop propagating
        /// automatically; operators roll out manually).
        #[arg(long)]
        no_auto_upgrade: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,forgelined=debug,forgeline=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            no_auto_upgrade,
        } => serve(port, data_dir, no_auto_upgrade).await,
    }
}

async fn serve(port: u16, data_dir: PathBuf, no_auto_upgrade: bool) -> anyhow::Result<()> {
    info!("Forgeline daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("forgeline.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let (publish_tx, publish_rx) = publish_channel();
    let versions = VersionStore::new(store.clone()).with_events(publish_tx);
    let comparator = VersionComparator::new(store.clone());
    let registry = BindingRegistry::new(store.clone());
    let locks = BindingLocks::new();
    let orchestrator = RolloutOrchestrator::new(store.clone(), registry.clone(), locks.clone());
    let rollback = RollbackManager::new(store.clone(), registry.clone(), locks);
    info!("rollout engine initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Auto-upgrade worker.
    let worker_handle = if no_auto_upgrade {
        info!("auto-upgrade worker disabled");
        None
    } else {
        let worker = AutoUpgradeWorker::new(registry.clone(), orchestrator.clone());
        Some(tokio::spawn(worker.run(publish_rx, shutdown_rx.clone())))
    };

    // REST API.
    let router = forgeline_api::build_router(forgeline_api::ApiState {
        store,
        versions,
        comparator,
        registry,
        orchestrator,
        rollback,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "REST API listening");

    let server = axum_serve(listener, router, shutdown_rx);

    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }
    info!("Forgeline daemon stopped");
    Ok(())
}

async fn axum_serve(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}
