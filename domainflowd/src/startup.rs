//! Startup bootstrap: take back what a previous process left behind.
//! Bounded and non-blocking of the main accept path; the caller spawns it.

use anyhow::Result;
use std::time::Instant;

use sqlx::PgPool;
use tracing::{info, warn};

use domainflow_api::campaign::{CampaignFilter, CampaignStatus};

use crate::config::{ProxiesConfig, WorkerConfig};
use crate::queue;
use crate::store;

/// Seed configuration-declared proxies into the store, idempotently.
pub async fn seed_proxies(pool: &PgPool, cfg: &ProxiesConfig) -> Result<()> {
    for entry in &cfg.entries {
        match store::proxies::parse_proxy_url(entry) {
            Ok(p) => {
                if let Err(e) = store::proxies::upsert(pool, &p).await {
                    warn!(
                        target = "domainflow_startup",
                        address = %p.address,
                        "proxy seed failed: {e}"
                    );
                }
            }
            Err(e) => warn!(target = "domainflow_startup", "bad proxy entry: {e}"),
        }
    }
    Ok(())
}

fn env_usize(key: &str, default_val: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(default_val)
}

/// - Reclaim leases stranded by a previous run.
/// - Re-enqueue a job for any queued/running campaign that lost its job
///   entirely (crash between job completion and campaign transition).
/// Bounded via DOMAINFLOW_BOOTSTRAP_LIMIT (default 200); progress logs are
/// sparse (every DOMAINFLOW_BOOTSTRAP_LOG_EVERY, default 50).
pub async fn bootstrap_resume(pool: &PgPool, worker: &WorkerConfig) -> Result<()> {
    let start = Instant::now();
    let limit = env_usize("DOMAINFLOW_BOOTSTRAP_LIMIT", 200);
    let log_every = env_usize("DOMAINFLOW_BOOTSTRAP_LOG_EVERY", 50);

    match queue::reclaim_expired(pool, worker.job_processing_timeout).await {
        Ok(0) => {}
        Ok(n) => info!(target = "domainflow_startup", reclaimed = n, "reclaimed stale leases"),
        Err(e) => warn!(target = "domainflow_startup", "stale lease reclaim failed: {e}"),
    }

    let mut revived = 0usize;
    for status in [CampaignStatus::Queued, CampaignStatus::Running] {
        let filter = CampaignFilter {
            status: Some(status),
            limit: Some(limit as i64),
            ..CampaignFilter::default()
        };
        let campaigns = match store::campaigns::list(pool, &filter).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target = "domainflow_startup", "campaign listing failed: {e}");
                continue;
            }
        };
        for campaign in campaigns {
            match store::jobs::has_live_job(pool, campaign.id).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = queue::enqueue_with_max_attempts(
                        pool,
                        campaign.id,
                        campaign.kind,
                        None,
                        chrono::Utc::now(),
                        worker.max_job_retries,
                    )
                    .await
                    {
                        warn!(
                            target = "domainflow_startup",
                            campaign = %campaign.id,
                            "re-enqueue failed: {e}"
                        );
                        continue;
                    }
                    revived += 1;
                    if log_every > 0 && revived % log_every == 0 {
                        info!(
                            target = "domainflow_startup",
                            revived,
                            elapsed = ?start.elapsed(),
                            "bootstrap progress"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        target = "domainflow_startup",
                        campaign = %campaign.id,
                        "job probe failed: {e}"
                    );
                }
            }
        }
    }

    info!(
        target = "domainflow_startup",
        revived,
        elapsed = ?start.elapsed(),
        "bootstrap finished"
    );
    Ok(())
}
