//! Job queue policy over `store::jobs`: enqueue defaults, the retry /
//! terminal decision, backoff, and lease reclaim.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use domainflow_api::campaign::CampaignKind;
use domainflow_api::job::{CampaignJob, JobStatus, DEFAULT_MAX_ATTEMPTS};

use crate::error::Result;
use crate::store;

pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

pub async fn enqueue(
    pool: &PgPool,
    campaign_id: Uuid,
    kind: CampaignKind,
    payload: Option<serde_json::Value>,
    scheduled_at: DateTime<Utc>,
) -> Result<Uuid> {
    enqueue_with_max_attempts(pool, campaign_id, kind, payload, scheduled_at, DEFAULT_MAX_ATTEMPTS)
        .await
}

pub async fn enqueue_with_max_attempts(
    pool: &PgPool,
    campaign_id: Uuid,
    kind: CampaignKind,
    payload: Option<serde_json::Value>,
    scheduled_at: DateTime<Utc>,
    max_attempts: i32,
) -> Result<Uuid> {
    let job = store::jobs::insert(
        pool,
        &store::jobs::NewJob {
            id: Uuid::new_v4(),
            campaign_id,
            job_kind: kind,
            status: JobStatus::Queued,
            scheduled_at,
            max_attempts,
            payload,
        },
    )
    .await?;
    Ok(job.id)
}

/// Atomically claim the oldest due job, stamping the caller as lease
/// holder. Returns `None` when nothing is claimable.
pub async fn claim(pool: &PgPool, worker_id: &str) -> Result<Option<CampaignJob>> {
    store::jobs::claim(pool, worker_id).await
}

pub async fn complete(pool: &PgPool, job_id: Uuid) -> Result<()> {
    store::jobs::complete(pool, job_id).await
}

/// What `fail` decided; the caller propagates `Terminal` to the campaign.
#[derive(Debug, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { next_execution_at: DateTime<Utc> },
    Terminal,
}

/// Retryable failures reschedule with backoff until attempts run out, then
/// the job goes terminal like any non-retryable failure.
pub async fn fail(
    pool: &PgPool,
    job: &CampaignJob,
    error: &str,
    retryable: bool,
    backoff_base: Duration,
) -> Result<FailOutcome> {
    if retryable && !job.attempts_exhausted() {
        let delay = backoff(job.attempts + 1, backoff_base);
        let next = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        store::jobs::schedule_retry(pool, job.id, error, next).await?;
        Ok(FailOutcome::Retrying { next_execution_at: next })
    } else {
        store::jobs::fail_terminal(pool, job.id, error).await?;
        Ok(FailOutcome::Terminal)
    }
}

/// Partial batch done, more to do: back to the queue, optionally throttled.
pub async fn requeue_for_batch(
    pool: &PgPool,
    job_id: Uuid,
    throttle: Option<Duration>,
) -> Result<()> {
    let next = Utc::now()
        + chrono::Duration::from_std(throttle.unwrap_or(Duration::ZERO)).unwrap_or_else(|_| chrono::Duration::zero());
    store::jobs::requeue(pool, job_id, next).await
}

/// Cooperative shutdown: give the claim back without burning an attempt.
pub async fn release(pool: &PgPool, job_id: Uuid) -> Result<()> {
    store::jobs::release(pool, job_id).await
}

/// Lease expiry safety net; returns how many jobs were taken back.
pub async fn reclaim_expired(pool: &PgPool, lease: Duration) -> Result<u64> {
    store::jobs::reclaim_expired(pool, lease.as_secs().max(1) as i64).await
}

/// Exponential backoff with jitter: `base * 2^(attempt-1)`, capped at
/// [`MAX_BACKOFF`], plus up to half the base of jitter. Monotonic in the
/// attempt number (modulo jitter) and bounded above.
pub fn backoff(attempt: i32, base: Duration) -> Duration {
    let attempt = attempt.max(1) as u32;
    let base_ms = base.as_millis().max(1) as u64;
    let mut factor = 1u64;
    for _ in 1..attempt {
        factor = factor.saturating_mul(2);
    }
    let capped = base_ms
        .saturating_mul(factor)
        .min(MAX_BACKOFF.as_millis() as u64);
    let jitter = fastrand::u64(0..(base_ms / 2 + 1));
    Duration::from_millis(capped.saturating_add(jitter).min(MAX_BACKOFF.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_monotonic_and_bounded() {
        let base = Duration::from_secs(2);
        let mut last = Duration::ZERO;
        for attempt in 1..=12 {
            // Strip jitter by comparing against the next attempt's floor.
            let floor = Duration::from_millis(
                (base.as_millis() as u64)
                    .saturating_mul(1u64 << (attempt as u32 - 1))
                    .min(MAX_BACKOFF.as_millis() as u64),
            );
            assert!(floor >= last, "floor shrank at attempt {attempt}");
            last = floor;

            let d = backoff(attempt, base);
            assert!(d <= MAX_BACKOFF, "attempt {attempt} exceeded the cap: {d:?}");
        }
    }

    #[test]
    fn backoff_handles_degenerate_attempts() {
        assert!(backoff(0, Duration::from_secs(1)) >= Duration::from_secs(1));
        assert!(backoff(-3, Duration::from_secs(1)) >= Duration::from_secs(1));
    }

    #[test]
    fn backoff_large_attempt_saturates_at_cap() {
        let d = backoff(63, Duration::from_secs(30));
        assert_eq!(d, MAX_BACKOFF);
    }
}
