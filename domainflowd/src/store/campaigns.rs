use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use domainflow_api::campaign::{Campaign, CampaignFilter, CampaignKind, CampaignStatus};

use crate::error::{Error, Result};

pub struct NewCampaign {
    pub id: Uuid,
    pub name: String,
    pub kind: CampaignKind,
    pub user_id: Option<Uuid>,
    pub total_items: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

pub async fn insert<'e>(ex: impl PgExecutor<'e>, c: &NewCampaign) -> Result<Campaign> {
    let row = sqlx::query_as::<_, Campaign>(
        "INSERT INTO campaigns (id, name, kind, status, user_id, total_items, metadata)
         VALUES ($1, $2, $3, 'pending', $4, $5, $6)
         RETURNING *",
    )
    .bind(c.id)
    .bind(&c.name)
    .bind(c.kind)
    .bind(c.user_id)
    .bind(c.total_items)
    .bind(&c.metadata)
    .fetch_one(ex)
    .await?;
    Ok(row)
}

pub async fn get<'e>(ex: impl PgExecutor<'e>, id: Uuid) -> Result<Campaign> {
    sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await?
        .ok_or_else(|| Error::not_found(format!("campaign {id}")))
}

/// Row-locked read. This is the serialization point for status transitions
/// and counter updates on the same campaign.
pub async fn get_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Campaign> {
    sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::not_found(format!("campaign {id}")))
}

/// Status write; stamps `started_at` on the first move to Running and
/// `completed_at` on reaching an end-of-work status.
pub async fn set_status<'e>(
    ex: impl PgExecutor<'e>,
    id: Uuid,
    status: CampaignStatus,
    error_message: Option<&str>,
) -> Result<Campaign> {
    let row = sqlx::query_as::<_, Campaign>(
        "UPDATE campaigns
            SET status = $2,
                error_message = COALESCE($3, error_message),
                started_at = CASE
                    WHEN $2 = 'running'::campaign_status AND started_at IS NULL THEN NOW()
                    ELSE started_at END,
                completed_at = CASE
                    WHEN $2 IN ('completed'::campaign_status,
                                'failed'::campaign_status,
                                'cancelled'::campaign_status) THEN NOW()
                    ELSE completed_at END,
                updated_at = NOW()
          WHERE id = $1
      RETURNING *",
    )
    .bind(id)
    .bind(status)
    .bind(error_message)
    .fetch_optional(ex)
    .await?;
    row.ok_or_else(|| Error::not_found(format!("campaign {id}")))
}

/// Apply counter deltas and recompute progress in one guarded statement.
/// A delta that would break a counter invariant matches no row and is
/// rejected with `InvalidState`.
pub async fn apply_progress<'e>(
    ex: impl PgExecutor<'e>,
    id: Uuid,
    processed_delta: i64,
    successful_delta: i64,
    failed_delta: i64,
) -> Result<Campaign> {
    if processed_delta == 0 && successful_delta == 0 && failed_delta == 0 {
        // Nothing to apply; avoid the write entirely.
        return get(ex, id).await;
    }
    let row = sqlx::query_as::<_, Campaign>(
        "UPDATE campaigns
            SET processed_items = processed_items + $2,
                successful_items = successful_items + $3,
                failed_items = failed_items + $4,
                progress_percentage = CASE
                    WHEN COALESCE(total_items, 0) > 0
                    THEN LEAST(100.0, (processed_items + $2) * 100.0 / total_items)
                    ELSE progress_percentage END,
                updated_at = NOW()
          WHERE id = $1
            AND processed_items + $2 >= 0
            AND successful_items + $3 >= 0
            AND failed_items + $4 >= 0
            AND (total_items IS NULL OR processed_items + $2 <= total_items)
            AND successful_items + $3 + failed_items + $4 <= processed_items + $2
      RETURNING *",
    )
    .bind(id)
    .bind(processed_delta)
    .bind(successful_delta)
    .bind(failed_delta)
    .fetch_optional(ex)
    .await?;
    row.ok_or_else(|| {
        Error::InvalidState(format!(
            "counter update ({processed_delta},{successful_delta},{failed_delta}) \
             rejected for campaign {id}"
        ))
    })
}

/// Refresh the known total. Progress is recomputed against the new total.
pub async fn set_total<'e>(ex: impl PgExecutor<'e>, id: Uuid, total: i64) -> Result<()> {
    sqlx::query(
        "UPDATE campaigns
            SET total_items = $2,
                progress_percentage = CASE
                    WHEN $2 > 0 THEN LEAST(100.0, processed_items * 100.0 / $2)
                    ELSE 0 END,
                updated_at = NOW()
          WHERE id = $1 AND processed_items <= $2",
    )
    .bind(id)
    .bind(total)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn list<'e>(ex: impl PgExecutor<'e>, filter: &CampaignFilter) -> Result<Vec<Campaign>> {
    let limit = filter.limit.unwrap_or(50).clamp(1, 500);
    let rows = sqlx::query_as::<_, Campaign>(
        "SELECT * FROM campaigns
          WHERE ($1::uuid IS NULL OR user_id = $1)
            AND ($2::campaign_status IS NULL OR status = $2)
            AND ($3::campaign_kind IS NULL OR kind = $3)
            AND ($4::timestamptz IS NULL OR created_at < $4)
          ORDER BY created_at DESC, id DESC
          LIMIT $5",
    )
    .bind(filter.user_id)
    .bind(filter.status)
    .bind(filter.kind)
    .bind(filter.created_before)
    .bind(limit)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Aggregated per-status read model. Derived on demand instead of a
/// trigger-refreshed materialized view.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignStats {
    pub status: CampaignStatus,
    pub campaigns: i64,
    pub processed_items: i64,
}

pub async fn stats<'e>(
    ex: impl PgExecutor<'e>,
    user_id: Option<Uuid>,
) -> Result<Vec<CampaignStats>> {
    let rows = sqlx::query_as::<_, CampaignStats>(
        "SELECT status,
                COUNT(*) AS campaigns,
                COALESCE(SUM(processed_items), 0)::BIGINT AS processed_items
           FROM campaigns
          WHERE ($1::uuid IS NULL OR user_id = $1)
          GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
