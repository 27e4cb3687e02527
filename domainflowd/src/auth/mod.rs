//! Session-based authentication and RBAC, to the extent the orchestrator
//! leans on it: login with rate limiting and bcrypt verification, session
//! validation with idle/hard expiry and an optional fingerprint policy,
//! `"{resource}:{action}"` permission checks, and audit entries for
//! denials.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::store::audit::{self, AuditEntry};

mod password;
mod ratelimit;
mod session;
pub mod store;

pub use password::{hash_password, verify_password};
pub use ratelimit::{check_and_increment, RateDecision};
pub use session::{evaluate_session, fingerprint, generate_session_id, SessionRejection};
pub use store::{Session, User};

pub const LOGIN_ACTION: &str = "login";
pub const PASSWORD_RESET_ACTION: &str = "password_reset";

/// Proof of an authenticated request; the orchestrator threads this through
/// ownership and permission checks.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub session_id: String,
}

pub struct AuthService {
    pool: PgPool,
    cfg: AuthConfig,
}

impl AuthService {
    pub fn new(pool: PgPool, cfg: AuthConfig) -> Self {
        Self { pool, cfg }
    }

    /// Verify credentials and mint a session. Attempts are rate limited per
    /// identifier before any credential work happens.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session> {
        match check_and_increment(
            &self.pool,
            username,
            LOGIN_ACTION,
            self.cfg.login_rate_limit,
            self.cfg.rate_limit_window,
            self.cfg.rate_limit_block,
        )
        .await?
        {
            RateDecision::Blocked { until } => {
                self.audit(None, None, "auth.login.rate_limited", username, 50).await;
                return Err(Error::Auth(format!("too many attempts; blocked until {until}")));
            }
            RateDecision::Allowed => {}
        }

        let user = match store::user_by_username(&self.pool, username).await {
            Ok(u) => u,
            Err(e) => {
                self.audit(None, None, "auth.login.unknown_user", username, 30).await;
                return Err(e);
            }
        };
        if !verify_password(password, &self.cfg.pepper, &user.password_hash)? {
            self.audit(Some(user.id), None, "auth.login.bad_password", username, 40).await;
            return Err(Error::Auth("invalid credentials".into()));
        }
        if !user.is_active || user.is_locked {
            self.audit(Some(user.id), None, "auth.login.disabled_user", username, 60).await;
            return Err(Error::Auth("account unavailable".into()));
        }

        let s = session::new_session(&self.cfg, user.id, ip, user_agent, chrono::Utc::now());
        store::insert_session(&self.pool, &s).await?;
        self.audit(Some(user.id), Some(&s.id), "auth.login.ok", username, 0).await;
        Ok(s)
    }

    /// Validate a presented session id, refresh its activity stamp, and
    /// return the request's auth context.
    pub async fn validate(
        &self,
        session_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthContext> {
        let Some(s) = store::session_by_id(&self.pool, session_id).await? else {
            self.audit(None, None, "auth.session.unknown", "session", 30).await;
            return Err(Error::Auth("unknown session".into()));
        };
        let user = store::user_by_id(&self.pool, s.user_id).await?;
        let presented = session::fingerprint(ip, user_agent);

        if let Err(rejection) =
            evaluate_session(&self.cfg, &s, &user, &presented, chrono::Utc::now())
        {
            self.audit(
                Some(user.id),
                Some(&s.id),
                "auth.session.rejected",
                rejection.reason(),
                rejection.risk_score(),
            )
            .await;
            return Err(Error::Auth(rejection.reason().into()));
        }

        store::touch_session(&self.pool, &s.id).await?;
        Ok(AuthContext { user_id: s.user_id, session_id: s.id })
    }

    pub async fn logout(&self, ctx: &AuthContext) -> Result<()> {
        store::deactivate_session(&self.pool, &ctx.session_id).await
    }

    /// Gate for password-reset initiation; stricter window than login.
    pub async fn check_password_reset_allowed(&self, identifier: &str) -> Result<()> {
        match check_and_increment(
            &self.pool,
            identifier,
            PASSWORD_RESET_ACTION,
            self.cfg.password_reset_rate_limit,
            self.cfg.rate_limit_window,
            self.cfg.rate_limit_block,
        )
        .await?
        {
            RateDecision::Blocked { until } => {
                self.audit(None, None, "auth.password_reset.rate_limited", identifier, 50).await;
                Err(Error::Auth(format!("too many attempts; blocked until {until}")))
            }
            RateDecision::Allowed => Ok(()),
        }
    }

    /// `"{resource}:{action}"` membership over the user's active role
    /// grants.
    pub async fn has_permission(&self, ctx: &AuthContext, permission: &str) -> Result<bool> {
        let granted = store::permissions_for_user(&self.pool, ctx.user_id).await?;
        Ok(granted.iter().any(|p| p == permission))
    }

    pub async fn require_permission(&self, ctx: &AuthContext, permission: &str) -> Result<()> {
        if self.has_permission(ctx, permission).await? {
            return Ok(());
        }
        self.audit(
            Some(ctx.user_id),
            Some(&ctx.session_id),
            "auth.permission.denied",
            permission,
            40,
        )
        .await;
        Err(Error::Auth(format!("missing permission {permission}")))
    }

    async fn audit(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
        action: &str,
        resource: &str,
        risk_score: i32,
    ) {
        let entry = AuditEntry {
            user_id,
            session_id,
            action,
            resource: Some(resource),
            detail: None,
            risk_score,
        };
        if let Err(e) = audit::append(&self.pool, &entry).await {
            warn!(target = "domainflow_auth", "audit append failed: {e}");
        }
    }
}
