//! PostgreSQL infrastructure shared by the DomainFlow crates: connection
//! settings, the startup connect path with a bounded retry budget, embedded
//! migrations, and a latency probe.
//!
//! The daemon connects eagerly at boot. There is deliberately no lazy
//! handle here: every consumer of this crate needs a working pool before it
//! can do anything useful, so an unreachable database is a startup failure,
//! not a condition to limp along under.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

pub use sqlx::PgPool;

pub mod tables {
    // auth schema
    pub const USERS: &str = "auth.users";
    pub const SESSIONS: &str = "auth.sessions";
    pub const ROLES: &str = "auth.roles";
    pub const PERMISSIONS: &str = "auth.permissions";
    pub const ROLE_PERMISSIONS: &str = "auth.role_permissions";
    pub const USER_ROLES: &str = "auth.user_roles";
    pub const RATE_LIMITS: &str = "auth.rate_limits";

    // application schema
    pub const CAMPAIGNS: &str = "campaigns";
    pub const GENERATION_PARAMS: &str = "domain_generation_params";
    pub const DNS_PARAMS: &str = "dns_validation_params";
    pub const HTTP_PARAMS: &str = "http_keyword_params";
    pub const GENERATION_CURSOR_STATE: &str = "generation_cursor_state";
    pub const GENERATED_DOMAINS: &str = "generated_domains";
    pub const DNS_RESULTS: &str = "dns_validation_results";
    pub const HTTP_RESULTS: &str = "http_keyword_results";
    pub const CAMPAIGN_JOBS: &str = "campaign_jobs";
    pub const PERSONAS: &str = "personas";
    pub const PROXIES: &str = "proxies";
    pub const KEYWORD_SETS: &str = "keyword_sets";
    pub const KEYWORD_RULES: &str = "keyword_rules";
    pub const AUDIT_LOGS: &str = "audit_logs";
}

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Hard ceiling on a single between-attempts wait during startup connect.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(15);

/// Connection settings, read once at process start.
///
/// Environment:
/// - DOMAINFLOW_DATABASE_URL (falls back to DATABASE_URL)
/// - DOMAINFLOW_DB_MIN_CONNS (default 0)
/// - DOMAINFLOW_DB_MAX_CONNS (default 16)
/// - DOMAINFLOW_DB_ACQUIRE_TIMEOUT_SECS (default 10)
/// - DOMAINFLOW_DB_CONNECT_ATTEMPTS (default 6)
/// - DOMAINFLOW_DB_CONNECT_RETRY_MS (default 250, the first-retry wait)
/// - DOMAINFLOW_DB_RUN_MIGRATIONS (default off)
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub url: Option<String>,
    pub min_conns: u32,
    pub max_conns: u32,
    pub acquire_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_retry_base: Duration,
    pub run_migrations: bool,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            url: None,
            min_conns: 0,
            max_conns: 16,
            acquire_timeout: Duration::from_secs(10),
            connect_attempts: 6,
            connect_retry_base: Duration::from_millis(250),
            run_migrations: false,
        }
    }
}

impl DbSettings {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            url: std::env::var("DOMAINFLOW_DATABASE_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .ok(),
            min_conns: env_parse("DOMAINFLOW_DB_MIN_CONNS", d.min_conns),
            max_conns: env_parse("DOMAINFLOW_DB_MAX_CONNS", d.max_conns).max(1),
            acquire_timeout: Duration::from_secs(
                env_parse("DOMAINFLOW_DB_ACQUIRE_TIMEOUT_SECS", 10u64).clamp(1, 120),
            ),
            connect_attempts: env_parse("DOMAINFLOW_DB_CONNECT_ATTEMPTS", d.connect_attempts)
                .max(1),
            connect_retry_base: Duration::from_millis(
                env_parse("DOMAINFLOW_DB_CONNECT_RETRY_MS", 250u64).clamp(50, 5_000),
            ),
            run_migrations: env_flag("DOMAINFLOW_DB_RUN_MIGRATIONS"),
        }
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_conns)
            .max_connections(self.max_conns)
            .acquire_timeout(self.acquire_timeout)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("no database url configured (set DOMAINFLOW_DATABASE_URL)")]
    NoUrl,

    #[error("database unreachable after {attempts} attempt(s)")]
    Unreachable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration run failed")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// Open the pool, waiting out a cold database with growing delays until the
/// attempt budget runs out. Applies embedded migrations afterwards when
/// `run_migrations` is set.
pub async fn connect(settings: &DbSettings) -> Result<PgPool, DbError> {
    let url = settings.url.as_deref().ok_or(DbError::NoUrl)?;

    let budget = settings.connect_attempts.max(1);
    let mut attempt = 0u32;
    let pool = loop {
        attempt += 1;
        // acquire_timeout bounds each try; a dead host fails within it.
        match settings.pool_options().connect(url).await {
            Ok(pool) => break pool,
            Err(source) if attempt >= budget => {
                return Err(DbError::Unreachable { attempts: attempt, source })
            }
            Err(e) => {
                let wait = retry_wait(settings.connect_retry_base, attempt);
                warn!(
                    target = "domainflow_db",
                    attempt,
                    budget,
                    wait_ms = wait.as_millis() as u64,
                    "database not ready: {e}"
                );
                tokio::time::sleep(wait).await;
            }
        }
    };
    info!(target = "domainflow_db", attempt, "database pool ready");

    if settings.run_migrations {
        info!(target = "domainflow_db", "applying embedded migrations");
        MIGRATOR.run(&pool).await?;
    }
    Ok(pool)
}

/// Round-trip a trivial statement; the latency doubles as a health signal.
/// Callers that need a bound put their own timeout around it.
pub async fn ping(pool: &PgPool) -> Result<Duration, DbError> {
    let started = Instant::now();
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(started.elapsed())
}

/// Wait before retry `attempt` (1-based): the base doubles per attempt up
/// to a shift clamp, plus up to a third of jitter, never past
/// [`MAX_RETRY_WAIT`].
fn retry_wait(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis().max(1) as u64;
    let scaled = base_ms.saturating_mul(1u64 << attempt.min(6));
    let jitter = fastrand::u64(0..=scaled / 3);
    Duration::from_millis(scaled.saturating_add(jitter)).min(MAX_RETRY_WAIT)
}

fn env_parse<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_wait_doubles_then_hits_the_ceiling() {
        let base = Duration::from_millis(250);
        let mut floor = Duration::ZERO;
        for attempt in 1u32..=10 {
            let this_floor = Duration::from_millis(250u64 << attempt.min(6)).min(MAX_RETRY_WAIT);
            assert!(this_floor >= floor, "floor shrank at attempt {attempt}");
            floor = this_floor;
            assert!(retry_wait(base, attempt) <= MAX_RETRY_WAIT);
        }
        assert_eq!(retry_wait(Duration::from_secs(60), 10), MAX_RETRY_WAIT);
    }

    #[test]
    fn settings_defaults_are_sane() {
        let d = DbSettings::default();
        assert!(d.max_conns >= 1);
        assert!(d.connect_attempts >= 1);
        assert!(d.connect_retry_base <= MAX_RETRY_WAIT);
        assert!(!d.run_migrations);
    }
}
