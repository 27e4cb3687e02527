use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use serde_json::json;

use domainflow_api::persona::DnsPersonaConfig;
use domainflow_api::results::DnsResultStatus;

/// Verdict for one lookup. `retryable` marks transport-level failures that
/// a later batch may revisit; a clean NXDOMAIN is a final `Unresolved`.
#[derive(Debug, Clone)]
pub struct DnsLookupOutcome {
    pub status: DnsResultStatus,
    pub records: Option<serde_json::Value>,
    pub retryable: bool,
    pub error: Option<String>,
}

impl DnsLookupOutcome {
    pub fn resolved(records: serde_json::Value) -> Self {
        Self { status: DnsResultStatus::Resolved, records: Some(records), retryable: false, error: None }
    }

    pub fn unresolved() -> Self {
        Self { status: DnsResultStatus::Unresolved, records: None, retryable: false, error: None }
    }

    pub fn error(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status: DnsResultStatus::Error,
            records: None,
            retryable,
            error: Some(message.into()),
        }
    }
}

/// Pluggable resolution capability. The engine only sees this contract;
/// tests script it, production uses [`HickoryResolver`].
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, domain: &str, cfg: &DnsPersonaConfig) -> DnsLookupOutcome;
}

/// hickory-dns backed resolver. One inner resolver is built per distinct
/// persona config and reused across items and batches.
pub struct HickoryResolver {
    default_timeout: Duration,
    cache: Mutex<HashMap<String, TokioAsyncResolver>>,
}

impl HickoryResolver {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout, cache: Mutex::new(HashMap::new()) }
    }

    fn cache_key(cfg: &DnsPersonaConfig) -> String {
        format!(
            "{}|{}|{}",
            cfg.use_system_resolvers,
            cfg.query_timeout_seconds,
            cfg.resolvers.join(",")
        )
    }

    fn build(&self, cfg: &DnsPersonaConfig) -> Result<TokioAsyncResolver, String> {
        let mut opts = ResolverOpts::default();
        let timeout = if cfg.query_timeout_seconds > 0 {
            Duration::from_secs(cfg.query_timeout_seconds)
        } else {
            self.default_timeout
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        if cfg.use_system_resolvers {
            return TokioAsyncResolver::tokio_from_system_conf().map_err(|e| e.to_string());
        }

        let mut ips = Vec::new();
        let mut port = 53u16;
        for entry in &cfg.resolvers {
            if let Ok(addr) = entry.parse::<SocketAddr>() {
                ips.push(addr.ip());
                port = addr.port();
            } else if let Ok(ip) = entry.parse::<IpAddr>() {
                ips.push(ip);
            } else {
                return Err(format!("resolver entry {entry:?} is not an ip or socket address"));
            }
        }
        if ips.is_empty() {
            return Err("persona lists no usable resolvers".to_string());
        }
        let group = NameServerConfigGroup::from_ips_clear(&ips, port, true);
        Ok(TokioAsyncResolver::tokio(
            ResolverConfig::from_parts(None, Vec::new(), group),
            opts,
        ))
    }

    fn resolver_for(&self, cfg: &DnsPersonaConfig) -> Result<TokioAsyncResolver, String> {
        let key = Self::cache_key(cfg);
        if let Some(r) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(r.clone());
        }
        let resolver = self.build(cfg)?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, resolver.clone());
        Ok(resolver)
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn resolve(&self, domain: &str, cfg: &DnsPersonaConfig) -> DnsLookupOutcome {
        let resolver = match self.resolver_for(cfg) {
            Ok(r) => r,
            Err(e) => return DnsLookupOutcome::error(e, false),
        };

        match resolver.lookup_ip(domain).await {
            Ok(lookup) => {
                let records: Vec<serde_json::Value> = lookup
                    .iter()
                    .map(|ip| {
                        let rtype = if ip.is_ipv4() { "A" } else { "AAAA" };
                        json!({ "type": rtype, "value": ip.to_string() })
                    })
                    .collect();
                if records.is_empty() {
                    DnsLookupOutcome::unresolved()
                } else {
                    DnsLookupOutcome::resolved(json!({ "records": records }))
                }
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => DnsLookupOutcome::unresolved(),
                ResolveErrorKind::Timeout => DnsLookupOutcome::error("lookup timed out", true),
                ResolveErrorKind::Io(_) | ResolveErrorKind::Proto(_) => {
                    DnsLookupOutcome::error(e.to_string(), true)
                }
                _ => DnsLookupOutcome::error(e.to_string(), false),
            },
        }
    }
}
