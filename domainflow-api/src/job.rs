use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::CampaignKind;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Retry,
}

/// A queue entry representing one pending or in-flight batch for a campaign.
/// While `Processing`, the row carries a lease (`locked_by`, `locked_at`);
/// an expired lease makes the row reclaimable.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignJob {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub job_kind: CampaignKind,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts + 1 >= self.max_attempts.max(1)
    }
}
