use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub fingerprint: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn user_by_username<'e>(ex: impl PgExecutor<'e>, username: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM auth.users WHERE username = $1")
        .bind(username)
        .fetch_optional(ex)
        .await?
        .ok_or_else(|| Error::Auth("unknown user".into()))
}

pub async fn user_by_id<'e>(ex: impl PgExecutor<'e>, id: Uuid) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM auth.users WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await?
        .ok_or_else(|| Error::not_found(format!("user {id}")))
}

pub async fn insert_session<'e>(ex: impl PgExecutor<'e>, s: &Session) -> Result<()> {
    sqlx::query(
        "INSERT INTO auth.sessions
            (id, user_id, ip_address, user_agent, fingerprint, is_active,
             created_at, last_activity_at, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(&s.id)
    .bind(s.user_id)
    .bind(&s.ip_address)
    .bind(&s.user_agent)
    .bind(&s.fingerprint)
    .bind(s.is_active)
    .bind(s.created_at)
    .bind(s.last_activity_at)
    .bind(s.expires_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn session_by_id<'e>(ex: impl PgExecutor<'e>, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query_as::<_, Session>("SELECT * FROM auth.sessions WHERE id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

pub async fn touch_session<'e>(ex: impl PgExecutor<'e>, id: &str) -> Result<()> {
    sqlx::query("UPDATE auth.sessions SET last_activity_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn deactivate_session<'e>(ex: impl PgExecutor<'e>, id: &str) -> Result<()> {
    sqlx::query("UPDATE auth.sessions SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

/// The union of permission names granted through the user's active,
/// non-expired role assignments.
pub async fn permissions_for_user<'e>(
    ex: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT p.name
           FROM auth.permissions p
           JOIN auth.role_permissions rp ON rp.permission_id = p.id
           JOIN auth.user_roles ur ON ur.role_id = rp.role_id
          WHERE ur.user_id = $1
            AND (ur.expires_at IS NULL OR ur.expires_at > NOW())",
    )
    .bind(user_id)
    .fetch_all(ex)
    .await?;
    Ok(names)
}
