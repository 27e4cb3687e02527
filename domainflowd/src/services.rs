//! Process-wide wiring: one place that builds the shared handles (pool,
//! lifecycle with its default hooks, auth, orchestrator, resolver, fetcher)
//! so the daemon and tests assemble the same graph with different leaves.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::dnsvalidate::{DnsResolver, HickoryResolver};
use crate::httpscan::{HttpFetcher, ReqwestFetcher};
use crate::lifecycle::{AuditTransitions, Lifecycle, LogTransitions};
use crate::orchestrator::Orchestrator;
use crate::worker::WorkerPool;

pub struct Services {
    pub config: Arc<AppConfig>,
    pub pool: PgPool,
    pub lifecycle: Lifecycle,
    pub auth: Arc<AuthService>,
    pub orchestrator: Arc<Orchestrator>,
    pub resolver: Arc<dyn DnsResolver>,
    pub fetcher: Arc<dyn HttpFetcher>,
}

impl Services {
    pub fn build(pool: PgPool, config: AppConfig) -> Self {
        let config = Arc::new(config);

        let mut lifecycle = Lifecycle::new();
        lifecycle.register(Arc::new(LogTransitions));
        lifecycle.register(Arc::new(AuditTransitions::new(pool.clone())));

        let auth = Arc::new(AuthService::new(pool.clone(), config.auth.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            pool.clone(),
            lifecycle.clone(),
            Arc::clone(&auth),
            Arc::clone(&config),
        ));

        let resolver: Arc<dyn DnsResolver> =
            Arc::new(HickoryResolver::new(config.dns_validator.query_timeout));
        let fetcher: Arc<dyn HttpFetcher> =
            Arc::new(ReqwestFetcher::new(config.http_validator.request_timeout));

        Self { config, pool, lifecycle, auth, orchestrator, resolver, fetcher }
    }

    pub fn worker_pool(&self) -> Arc<WorkerPool> {
        WorkerPool::new(
            self.pool.clone(),
            Arc::clone(&self.config),
            self.lifecycle.clone(),
            Arc::clone(&self.resolver),
            Arc::clone(&self.fetcher),
        )
    }
}
