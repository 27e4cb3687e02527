use sqlx::PgExecutor;

use crate::error::Result;

/// Shared generation cursor, keyed by the config hash. Campaigns with
/// identical generator parameters share this row; the offset only moves
/// forward regardless of which campaign commits first.
pub async fn upsert<'e>(ex: impl PgExecutor<'e>, config_hash: &str, offset: i64) -> Result<i64> {
    let last: i64 = sqlx::query_scalar(
        "INSERT INTO generation_cursor_state (config_hash, last_offset)
         VALUES ($1, $2)
         ON CONFLICT (config_hash) DO UPDATE SET
             last_offset = GREATEST(generation_cursor_state.last_offset, EXCLUDED.last_offset),
             updated_at = NOW()
         RETURNING last_offset",
    )
    .bind(config_hash)
    .bind(offset)
    .fetch_one(ex)
    .await?;
    Ok(last)
}

pub async fn get<'e>(ex: impl PgExecutor<'e>, config_hash: &str) -> Result<Option<i64>> {
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT last_offset FROM generation_cursor_state WHERE config_hash = $1",
    )
    .bind(config_hash)
    .fetch_optional(ex)
    .await?;
    Ok(last)
}
