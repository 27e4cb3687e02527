use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::Result;

pub struct AuditEntry<'a> {
    pub user_id: Option<Uuid>,
    pub session_id: Option<&'a str>,
    pub action: &'a str,
    pub resource: Option<&'a str>,
    pub detail: Option<serde_json::Value>,
    pub risk_score: i32,
}

/// Best-effort append; callers on hot paths ignore the returned error after
/// logging it.
pub async fn append<'e>(ex: impl PgExecutor<'e>, entry: &AuditEntry<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_logs
            (id, user_id, session_id, action, resource, detail, risk_score)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.session_id)
    .bind(entry.action)
    .bind(entry.resource)
    .bind(&entry.detail)
    .bind(entry.risk_score.clamp(0, 100))
    .execute(ex)
    .await?;
    Ok(())
}
