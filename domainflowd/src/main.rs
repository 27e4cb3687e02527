use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use domainflow_db::DbSettings;
use domainflowd::config::AppConfig;
use domainflowd::services::Services;
use domainflowd::startup;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    info!(
        target = "domainflowd",
        workers = config.worker.num_workers,
        poll = ?config.worker.poll_interval,
        "starting domainflowd"
    );

    let pool = domainflow_db::connect(&DbSettings::from_env()).await?;
    match tokio::time::timeout(Duration::from_secs(2), domainflow_db::ping(&pool)).await {
        Ok(Ok(rtt)) => {
            info!(target = "domainflowd", rtt_ms = rtt.as_millis() as u64, "database reachable");
        }
        Ok(Err(e)) => warn!(target = "domainflowd", "database ping failed: {e}"),
        Err(_) => warn!(target = "domainflowd", "database ping timed out"),
    }

    if let Err(e) = startup::seed_proxies(&pool, &config.proxies).await {
        warn!(target = "domainflowd", "proxy seeding failed: {e}");
    }
    if let Err(e) = startup::bootstrap_resume(&pool, &config.worker).await {
        warn!(target = "domainflowd", "bootstrap resume failed: {e}");
    }

    let services = Arc::new(Services::build(pool, config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = services.worker_pool().spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!(target = "domainflowd", "shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    info!(target = "domainflowd", "stopped");
    Ok(())
}
