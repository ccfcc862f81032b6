use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use herald_core::HeraldConfig;
use herald_providers::ProviderRegistry;
use herald_scheduler::SchedulerEngine;
use rusqlite::Connection;
use tracing::info;

mod ai;
mod app;
mod http;

#[derive(Debug, Parser)]
#[command(name = "herald-gateway", version, about = "Scheduled publishing gateway")]
struct Args {
    /// Path to herald.toml. Falls back to HERALD_CONFIG, then ~/.herald/herald.toml.
    #[arg(long, short)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald_gateway=info,herald_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var("HERALD_CONFIG").ok());
    let config = HeraldConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        HeraldConfig::default()
    });

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path)?;
    info!(path = %db_path, "opening SQLite database");

    let db = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {db_path}"))?;
    let mode: String = db.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    herald_content::db::init_db(&db)?;
    herald_scheduler::db::init_db(&db)?;
    info!(journal_mode = %mode, "database migrations complete");

    // one connection per subsystem; WAL lets them read concurrently
    let content_db = Connection::open(&db_path)?;
    content_db.busy_timeout(herald_scheduler::db::BUSY_TIMEOUT)?;
    let scheduler_db = Connection::open(&db_path)?;
    scheduler_db.busy_timeout(herald_scheduler::db::BUSY_TIMEOUT)?;

    let providers = ProviderRegistry::from_config(&config.providers)?;
    info!(
        targets = ?providers.targets(),
        default = providers.default_target(),
        "publish providers registered"
    );

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let scheduler_config = config.scheduler.clone();

    let state = Arc::new(app::AppState::new(config, content_db, scheduler_db, providers));
    let router = app::build_router(Arc::clone(&state));

    let engine = SchedulerEngine::new(Arc::clone(&state.executor), &scheduler_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = tokio::spawn(async move { engine.run(shutdown_rx).await });

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Herald gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // let in-flight publishes finish before exiting
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "scheduler task ended abnormally");
    }
    info!("Herald gateway stopped");
    Ok(())
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}
