//! Port fallthrough and persona plumbing over a scripted fetcher double.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use domainflow_api::persona::HttpPersonaConfig;
use domainflow_api::proxy::Proxy;
use domainflowd::httpscan::{
    classify, fetch_with_port_fallthrough, FetchError, FetchResponse, HttpFetcher,
};

/// Scripted fetcher: maps (domain, port) to an outcome, recording every
/// attempt.
struct ScriptedFetcher {
    script: HashMap<(String, u16), u16>,
    attempts: Mutex<Vec<(String, u16)>>,
}

impl ScriptedFetcher {
    fn new(script: &[((&str, u16), u16)]) -> Self {
        Self {
            script: script
                .iter()
                .map(|((d, p), code)| ((d.to_string(), *p), *code))
                .collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> Vec<(String, u16)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        domain: &str,
        port: u16,
        _cfg: &HttpPersonaConfig,
        _proxy: Option<&Proxy>,
    ) -> Result<FetchResponse, FetchError> {
        self.attempts.lock().unwrap().push((domain.to_string(), port));
        match self.script.get(&(domain.to_string(), port)) {
            Some(&code) => Ok(FetchResponse {
                status: code,
                headers: vec![],
                body: "welcome".into(),
            }),
            None => Err(FetchError::ConnectionRefused),
        }
    }
}

fn persona() -> HttpPersonaConfig {
    HttpPersonaConfig {
        user_agent: "domainflow/0.1".into(),
        headers: HashMap::new(),
        request_timeout_seconds: 5,
    }
}

#[tokio::test]
async fn ports_are_tried_in_order_until_one_answers() {
    let fetcher = ScriptedFetcher::new(&[(("shop.example", 8080), 200)]);
    let outcome = fetch_with_port_fallthrough(
        &fetcher,
        "shop.example",
        &[80, 443, 8080],
        &persona(),
        None,
    )
    .await;

    assert_eq!(outcome.as_ref().unwrap().status, 200);
    assert_eq!(
        fetcher.attempts(),
        vec![
            ("shop.example".to_string(), 80),
            ("shop.example".to_string(), 443),
            ("shop.example".to_string(), 8080),
        ]
    );
}

#[tokio::test]
async fn first_non_refused_outcome_stops_the_walk() {
    let fetcher =
        ScriptedFetcher::new(&[(("a.example", 80), 404), (("a.example", 443), 200)]);
    let outcome =
        fetch_with_port_fallthrough(&fetcher, "a.example", &[80, 443], &persona(), None).await;

    // 404 on the first port is an answer; 443 must not be attempted.
    assert_eq!(outcome.as_ref().unwrap().status, 404);
    assert_eq!(fetcher.attempts().len(), 1);
}

#[tokio::test]
async fn all_ports_refused_is_unreachable() {
    let fetcher = ScriptedFetcher::new(&[]);
    let outcome =
        fetch_with_port_fallthrough(&fetcher, "dead.example", &[80, 443], &persona(), None).await;

    assert!(matches!(outcome, Err(FetchError::ConnectionRefused)));
    assert_eq!(
        classify(&outcome, false),
        domainflow_api::results::HttpResultStatus::Unreachable
    );
    assert_eq!(fetcher.attempts().len(), 2);
}
