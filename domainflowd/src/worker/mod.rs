//! The worker pool: N cooperative tasks claiming jobs, dispatching to the
//! campaign processors, and settling job + campaign state afterwards. A
//! janitor task reclaims expired leases so a crashed worker can never
//! strand a job in `processing`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use domainflow_api::campaign::{CampaignKind, CampaignStatus};
use domainflow_api::job::CampaignJob;

use crate::config::AppConfig;
use crate::dnsvalidate::{self, DnsResolver};
use crate::error::{Error, Result};
use crate::generator;
use crate::httpscan::{self, HttpFetcher};
use crate::lifecycle::Lifecycle;
use crate::processor::BatchOutcome;
use crate::queue;
use crate::store;

pub struct WorkerPool {
    pool: PgPool,
    config: Arc<AppConfig>,
    lifecycle: Lifecycle,
    resolver: Arc<dyn DnsResolver>,
    fetcher: Arc<dyn HttpFetcher>,
}

impl WorkerPool {
    pub fn new(
        pool: PgPool,
        config: Arc<AppConfig>,
        lifecycle: Lifecycle,
        resolver: Arc<dyn DnsResolver>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Arc<Self> {
        Arc::new(Self { pool, config, lifecycle, resolver, fetcher })
    }

    /// Spawn the workers plus the lease janitor. All tasks stop at their
    /// next suspension point once `shutdown` flips to true.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.worker.num_workers + 1);
        for idx in 0..self.config.worker.num_workers {
            let pool = Arc::clone(self);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { pool.worker_loop(idx, rx).await }));
        }
        let pool = Arc::clone(self);
        handles.push(tokio::spawn(async move { pool.janitor_loop(shutdown).await }));
        handles
    }

    async fn worker_loop(&self, idx: usize, mut shutdown: watch::Receiver<bool>) {
        let worker_id = format!("{}-w{}", std::process::id(), idx);
        info!(target = "domainflow_worker", worker = %worker_id, "worker started");

        while !*shutdown.borrow() {
            match queue::claim(&self.pool, &worker_id).await {
                Ok(Some(job)) => {
                    self.handle_job(job, &worker_id, &mut shutdown).await;
                }
                Ok(None) => {
                    let jitter = Duration::from_millis(fastrand::u64(0..250));
                    let nap = self.config.worker.poll_interval + jitter;
                    tokio::select! {
                        _ = tokio::time::sleep(nap) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    warn!(target = "domainflow_worker", worker = %worker_id, "claim failed: {e}");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.worker.error_retry_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        info!(target = "domainflow_worker", worker = %worker_id, "worker stopped");
    }

    async fn handle_job(
        &self,
        job: CampaignJob,
        worker_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        if !self.prepare_campaign(&job).await {
            return;
        }

        let deadline = self.config.worker.job_processing_timeout;
        let result = tokio::select! {
            r = tokio::time::timeout(deadline, self.dispatch(&job)) => match r {
                Ok(inner) => inner,
                Err(_) => Err(Error::Transient(format!(
                    "processing exceeded the {deadline:?} deadline"
                ))),
            },
            _ = shutdown.changed() => {
                // Cooperative release; the batch either committed or will be
                // redone from persisted state.
                if let Err(e) = queue::release(&self.pool, job.id).await {
                    warn!(target = "domainflow_worker", job = %job.id, "release failed: {e}");
                }
                return;
            }
        };

        match result {
            Ok(outcome) => self.settle_success(&job, outcome, worker_id).await,
            Err(err) => self.settle_failure(&job, err, worker_id).await,
        }
    }

    /// Move the campaign into `Running` if this is its first batch; skip
    /// work entirely when the campaign can no longer accept it.
    async fn prepare_campaign(&self, job: &CampaignJob) -> bool {
        let campaign = match store::campaigns::get(&self.pool, job.campaign_id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(target = "domainflow_worker", job = %job.id, "campaign lookup failed: {e}");
                let _ = queue::release(&self.pool, job.id).await;
                return false;
            }
        };
        match campaign.status {
            CampaignStatus::Running => true,
            CampaignStatus::Queued => {
                match self
                    .lifecycle
                    .transition_tx(&self.pool, job.campaign_id, CampaignStatus::Running, None)
                    .await
                {
                    Ok(_) => true,
                    Err(e) => {
                        // Raced a control verb; give the job back and let the
                        // next claim see the settled status.
                        debug!(target = "domainflow_worker", job = %job.id, "start race: {e}");
                        let _ = queue::release(&self.pool, job.id).await;
                        false
                    }
                }
            }
            CampaignStatus::Paused | CampaignStatus::Pending => {
                // Give the claim back, then park it with the rest.
                let _ = queue::release(&self.pool, job.id).await;
                let _ = store::jobs::park_for_campaign(&self.pool, job.campaign_id).await;
                false
            }
            status => {
                let _ = store::jobs::fail_terminal(
                    &self.pool,
                    job.id,
                    &format!("campaign is {}", status.as_str()),
                )
                .await;
                false
            }
        }
    }

    async fn dispatch(&self, job: &CampaignJob) -> Result<BatchOutcome> {
        match job.job_kind {
            CampaignKind::DomainGeneration => {
                generator::process_batch(
                    &self.pool,
                    job.campaign_id,
                    self.config.generator.batch_size,
                )
                .await
            }
            CampaignKind::DnsValidation => {
                dnsvalidate::process_batch(&self.pool, self.resolver.as_ref(), job.campaign_id)
                    .await
            }
            CampaignKind::HttpKeywordValidation => {
                httpscan::process_batch(&self.pool, self.fetcher.as_ref(), job.campaign_id).await
            }
        }
    }

    async fn settle_success(&self, job: &CampaignJob, outcome: BatchOutcome, worker_id: &str) {
        if outcome.done {
            if let Err(e) = queue::complete(&self.pool, job.id).await {
                warn!(target = "domainflow_worker", job = %job.id, "complete failed: {e}");
                return;
            }
            match self
                .lifecycle
                .transition_tx(&self.pool, job.campaign_id, CampaignStatus::Completed, None)
                .await
            {
                Ok(c) => {
                    info!(
                        target = "domainflow_worker",
                        worker = worker_id,
                        campaign = %c.id,
                        processed = c.processed_items,
                        successful = c.successful_items,
                        failed = c.failed_items,
                        "campaign completed"
                    );
                }
                Err(e) => {
                    // Another worker or a control verb got there first.
                    debug!(target = "domainflow_worker", campaign = %job.campaign_id, "completion skipped: {e}");
                }
            }
        } else {
            // Idle batches (upstream not producing yet) requeue at the poll
            // cadence instead of spinning.
            let delay =
                if outcome.processed == 0 { Some(self.config.worker.poll_interval) } else { None };
            if let Err(e) = queue::requeue_for_batch(&self.pool, job.id, delay).await {
                warn!(target = "domainflow_worker", job = %job.id, "requeue failed: {e}");
            }
        }
    }

    async fn settle_failure(&self, job: &CampaignJob, err: Error, worker_id: &str) {
        if matches!(err, Error::InvalidState(_)) {
            // The campaign moved under us (paused or cancelled mid-claim).
            debug!(target = "domainflow_worker", job = %job.id, "state race: {err}");
            let _ = queue::release(&self.pool, job.id).await;
            return;
        }

        let retryable = err.retryable();
        let message = err.to_string();
        warn!(
            target = "domainflow_worker",
            worker = worker_id,
            job = %job.id,
            retryable,
            "batch failed: {message}"
        );

        let outcome = match queue::fail(
            &self.pool,
            job,
            &message,
            retryable,
            self.config.worker.error_retry_delay,
        )
        .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!(target = "domainflow_worker", job = %job.id, "fail bookkeeping failed: {e}");
                return;
            }
        };

        if outcome == queue::FailOutcome::Terminal {
            if let Err(e) = self
                .lifecycle
                .transition_tx(
                    &self.pool,
                    job.campaign_id,
                    CampaignStatus::Failed,
                    Some(&message),
                )
                .await
            {
                debug!(target = "domainflow_worker", campaign = %job.campaign_id, "failure transition skipped: {e}");
            }
        }
    }

    /// Lease reclaim every half-lease: any `processing` row whose holder
    /// went quiet past the lease flips back to `retry`.
    async fn janitor_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let lease = self.config.worker.job_processing_timeout;
        let interval = (lease / 2).max(Duration::from_secs(1));
        info!(target = "domainflow_worker", ?interval, "janitor started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            match queue::reclaim_expired(&self.pool, lease).await {
                Ok(0) => {}
                Ok(n) => {
                    info!(target = "domainflow_worker", reclaimed = n, "reclaimed expired leases");
                }
                Err(e) => {
                    warn!(target = "domainflow_worker", "lease reclaim failed: {e}");
                }
            }
        }
        info!(target = "domainflow_worker", "janitor stopped");
    }
}
