use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use domainflow_api::campaign::CampaignKind;
use domainflow_api::job::{CampaignJob, JobStatus};

use crate::error::{Error, Result};

pub struct NewJob {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub job_kind: CampaignKind,
    /// `Pending` parks the job until the campaign is started; `Queued`
    /// makes it claimable immediately.
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub max_attempts: i32,
    pub payload: Option<serde_json::Value>,
}

pub async fn insert<'e>(ex: impl PgExecutor<'e>, j: &NewJob) -> Result<CampaignJob> {
    let row = sqlx::query_as::<_, CampaignJob>(
        "INSERT INTO campaign_jobs
            (id, campaign_id, job_kind, status, scheduled_at, max_attempts, payload)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(j.id)
    .bind(j.campaign_id)
    .bind(j.job_kind)
    .bind(j.status)
    .bind(j.scheduled_at)
    .bind(j.max_attempts.max(1))
    .bind(&j.payload)
    .fetch_one(ex)
    .await?;
    Ok(row)
}

pub async fn get<'e>(ex: impl PgExecutor<'e>, id: Uuid) -> Result<CampaignJob> {
    sqlx::query_as::<_, CampaignJob>("SELECT * FROM campaign_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await?
        .ok_or_else(|| Error::not_found(format!("job {id}")))
}

/// Claim the single oldest due `queued`/`retry` job. `FOR UPDATE SKIP
/// LOCKED` keeps concurrent claimers off each other's rows, so a job is
/// leased to at most one worker.
pub async fn claim<'e>(ex: impl PgExecutor<'e>, worker_id: &str) -> Result<Option<CampaignJob>> {
    let row = sqlx::query_as::<_, CampaignJob>(
        "WITH next_job AS (
             SELECT id FROM campaign_jobs
              WHERE status IN ('queued', 'retry')
                AND COALESCE(next_execution_at, scheduled_at) <= NOW()
              ORDER BY COALESCE(next_execution_at, scheduled_at) ASC, created_at ASC
              LIMIT 1
              FOR UPDATE SKIP LOCKED
         )
         UPDATE campaign_jobs j
            SET status = 'processing',
                locked_by = $1,
                locked_at = NOW(),
                updated_at = NOW()
           FROM next_job
          WHERE j.id = next_job.id
         RETURNING j.*",
    )
    .bind(worker_id)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

pub async fn complete<'e>(ex: impl PgExecutor<'e>, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'completed', locked_by = NULL, locked_at = NULL, updated_at = NOW()
          WHERE id = $1",
    )
    .bind(id)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn schedule_retry<'e>(
    ex: impl PgExecutor<'e>,
    id: Uuid,
    error: &str,
    next_execution_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'retry',
                attempts = attempts + 1,
                last_error = $2,
                next_execution_at = $3,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = NOW()
          WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .bind(next_execution_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn fail_terminal<'e>(ex: impl PgExecutor<'e>, id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'failed',
                attempts = attempts + 1,
                last_error = $2,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = NOW()
          WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(ex)
    .await?;
    Ok(())
}

/// Hand the job back after a partial batch; it becomes claimable again at
/// `next_execution_at` (now, or later when a speed cap applies).
pub async fn requeue<'e>(
    ex: impl PgExecutor<'e>,
    id: Uuid,
    next_execution_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'queued',
                next_execution_at = $2,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = NOW()
          WHERE id = $1",
    )
    .bind(id)
    .bind(next_execution_at)
    .execute(ex)
    .await?;
    Ok(())
}

/// Shutdown path: release the claim without touching the attempt counter.
pub async fn release<'e>(ex: impl PgExecutor<'e>, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'queued',
                next_execution_at = NOW(),
                locked_by = NULL,
                locked_at = NULL,
                updated_at = NOW()
          WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .execute(ex)
    .await?;
    Ok(())
}

/// Flip `processing` rows whose lease ran out back to `retry`. This is the
/// crash-recovery path; the bumped attempt counter records the takeover.
pub async fn reclaim_expired<'e>(ex: impl PgExecutor<'e>, lease_secs: i64) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'retry',
                attempts = attempts + 1,
                next_execution_at = NOW(),
                locked_by = NULL,
                locked_at = NULL,
                updated_at = NOW()
          WHERE status = 'processing'
            AND locked_at < NOW() - ($1 || ' seconds')::INTERVAL",
    )
    .bind(lease_secs.to_string())
    .execute(ex)
    .await?;
    Ok(res.rows_affected())
}

/// Park claimable jobs of a paused campaign so workers stop picking up new
/// batches; an in-flight batch is left to finish.
pub async fn park_for_campaign<'e>(ex: impl PgExecutor<'e>, campaign_id: Uuid) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'pending', updated_at = NOW()
          WHERE campaign_id = $1 AND status IN ('queued', 'retry')",
    )
    .bind(campaign_id)
    .execute(ex)
    .await?;
    Ok(res.rows_affected())
}

pub async fn unpark_for_campaign<'e>(ex: impl PgExecutor<'e>, campaign_id: Uuid) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'queued', next_execution_at = NOW(), updated_at = NOW()
          WHERE campaign_id = $1 AND status = 'pending'",
    )
    .bind(campaign_id)
    .execute(ex)
    .await?;
    Ok(res.rows_affected())
}

/// Soft-drop outstanding jobs of a cancelled campaign.
pub async fn drop_for_campaign<'e>(ex: impl PgExecutor<'e>, campaign_id: Uuid) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE campaign_jobs
            SET status = 'failed', last_error = 'campaign cancelled', updated_at = NOW()
          WHERE campaign_id = $1 AND status IN ('pending', 'queued', 'retry')",
    )
    .bind(campaign_id)
    .execute(ex)
    .await?;
    Ok(res.rows_affected())
}

/// Whether the campaign still has a job in a non-final state.
pub async fn has_live_job<'e>(ex: impl PgExecutor<'e>, campaign_id: Uuid) -> Result<bool> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM campaign_jobs
          WHERE campaign_id = $1
            AND status IN ('pending', 'queued', 'processing', 'retry')",
    )
    .bind(campaign_id)
    .fetch_one(ex)
    .await?;
    Ok(n > 0)
}

pub async fn list_for_campaign<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    limit: i64,
) -> Result<Vec<CampaignJob>> {
    let rows = sqlx::query_as::<_, CampaignJob>(
        "SELECT * FROM campaign_jobs
          WHERE campaign_id = $1
          ORDER BY created_at DESC
          LIMIT $2",
    )
    .bind(campaign_id)
    .bind(limit.clamp(1, 1000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

pub async fn count_by_status<'e>(
    ex: impl PgExecutor<'e>,
    status: JobStatus,
) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM campaign_jobs WHERE status = $1")
        .bind(status)
        .fetch_one(ex)
        .await?;
    Ok(n)
}
