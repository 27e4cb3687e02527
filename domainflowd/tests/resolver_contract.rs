//! The resolver seam: a scripted double standing in for hickory, driven
//! through the same trait object the worker hands to the DNS stage.

use async_trait::async_trait;
use serde_json::json;

use domainflow_api::persona::DnsPersonaConfig;
use domainflow_api::results::DnsResultStatus;
use domainflowd::dnsvalidate::{DnsLookupOutcome, DnsResolver};

struct ScriptedResolver;

#[async_trait]
impl DnsResolver for ScriptedResolver {
    async fn resolve(&self, domain: &str, cfg: &DnsPersonaConfig) -> DnsLookupOutcome {
        assert!(cfg.use_system_resolvers || !cfg.resolvers.is_empty());
        match domain {
            d if d.starts_with("dead") => DnsLookupOutcome::unresolved(),
            d if d.starts_with("flaky") => DnsLookupOutcome::error("timed out", true),
            _ => DnsLookupOutcome::resolved(json!({
                "records": [{"type": "A", "value": "192.0.2.10"}]
            })),
        }
    }
}

fn persona_cfg() -> DnsPersonaConfig {
    DnsPersonaConfig {
        resolvers: vec!["192.0.2.53:53".into()],
        use_system_resolvers: false,
        query_timeout_seconds: 2,
        max_domains_per_request: 100,
    }
}

#[tokio::test]
async fn ten_resolving_domains_yield_ten_resolved_verdicts() {
    let resolver: Box<dyn DnsResolver> = Box::new(ScriptedResolver);
    let cfg = persona_cfg();

    let mut resolved = 0;
    for i in 0..10 {
        let outcome = resolver.resolve(&format!("host{i}.example.com"), &cfg).await;
        assert_eq!(outcome.status, DnsResultStatus::Resolved);
        assert!(outcome.records.is_some());
        assert!(!outcome.retryable);
        resolved += 1;
    }
    assert_eq!(resolved, 10);
}

#[tokio::test]
async fn verdict_taxonomy_round_trips_through_the_trait() {
    let resolver: Box<dyn DnsResolver> = Box::new(ScriptedResolver);
    let cfg = persona_cfg();

    let gone = resolver.resolve("dead.example.com", &cfg).await;
    assert_eq!(gone.status, DnsResultStatus::Unresolved);
    assert!(!gone.retryable);

    let flaky = resolver.resolve("flaky.example.com", &cfg).await;
    assert_eq!(flaky.status, DnsResultStatus::Error);
    assert!(flaky.retryable, "transport errors drive the per-item retry path");
    assert!(flaky.error.is_some());
}
