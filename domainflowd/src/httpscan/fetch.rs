use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use domainflow_api::persona::HttpPersonaConfig;
use domainflow_api::proxy::Proxy;
use domainflow_api::results::HttpResultStatus;

/// Responses are capped; a scan target serving unbounded bytes must not
/// hold a worker hostage.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("request timed out")]
    Timeout,

    #[error("dns resolution failed: {0}")]
    Dns(String),

    #[error("proxy failure: {0}")]
    Proxy(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Pluggable fetch capability: given a domain, port, persona config, and an
/// optional proxy, produce status + headers + body or a classified failure.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(
        &self,
        domain: &str,
        port: u16,
        cfg: &HttpPersonaConfig,
        proxy: Option<&Proxy>,
    ) -> Result<FetchResponse, FetchError>;
}

/// Item status from a fetch outcome and the keyword verdict. The policy for
/// reachable responses: 2xx with at least one hit is success, 2xx without a
/// hit is `KeywordsNotFound`, 401/403 is `AccessDenied`, any other code is
/// `ContentMismatch`.
pub fn classify(outcome: &Result<FetchResponse, FetchError>, any_hit: bool) -> HttpResultStatus {
    match outcome {
        Ok(r) if (200..300).contains(&r.status) => {
            if any_hit {
                HttpResultStatus::Success
            } else {
                HttpResultStatus::KeywordsNotFound
            }
        }
        Ok(r) if r.status == 401 || r.status == 403 => HttpResultStatus::AccessDenied,
        Ok(_) => HttpResultStatus::ContentMismatch,
        Err(FetchError::ConnectionRefused) => HttpResultStatus::Unreachable,
        Err(FetchError::Timeout) => HttpResultStatus::Timeout,
        Err(FetchError::Dns(_)) => HttpResultStatus::DnsError,
        Err(FetchError::Proxy(_)) => HttpResultStatus::ProxyError,
        Err(FetchError::Other(_)) => HttpResultStatus::Error,
    }
}

/// reqwest-backed fetcher. One client is built per distinct persona/proxy
/// pair and reused. Certificate validation stays on; a target with a broken
/// certificate surfaces as an `Error` verdict like any other transport
/// failure. The `insecure-tls` feature exists for lab runs against
/// self-signed targets and must stay out of production builds.
pub struct ReqwestFetcher {
    default_timeout: Duration,
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestFetcher {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout, clients: Mutex::new(HashMap::new()) }
    }

    fn client_key(cfg: &HttpPersonaConfig, proxy: Option<&Proxy>) -> String {
        let mut headers: Vec<_> =
            cfg.headers.iter().map(|(k, v)| format!("{k}={v}")).collect();
        headers.sort();
        format!(
            "{}|{}|{}|{}",
            cfg.user_agent,
            cfg.request_timeout_seconds,
            headers.join(";"),
            proxy.map(|p| p.id.to_string()).unwrap_or_default()
        )
    }

    fn build_client(
        &self,
        cfg: &HttpPersonaConfig,
        proxy: Option<&Proxy>,
    ) -> Result<reqwest::Client, FetchError> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &cfg.headers {
            let name: reqwest::header::HeaderName = name
                .parse()
                .map_err(|_| FetchError::Other(format!("invalid header name {name:?}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| FetchError::Other(format!("invalid header value for {name:?}")))?;
            headers.insert(name, value);
        }

        let timeout = if cfg.request_timeout_seconds > 0 {
            Duration::from_secs(cfg.request_timeout_seconds)
        } else {
            self.default_timeout
        };

        let mut builder = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(timeout);

        // Development-only: accept any certificate. Off in normal builds.
        #[cfg(feature = "insecure-tls")]
        {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(p) = proxy {
            let url = p.url();
            builder = builder.proxy(
                reqwest::Proxy::all(&url).map_err(|e| FetchError::Proxy(e.to_string()))?,
            );
        }

        builder.build().map_err(|e| FetchError::Other(e.to_string()))
    }

    fn client_for(
        &self,
        cfg: &HttpPersonaConfig,
        proxy: Option<&Proxy>,
    ) -> Result<reqwest::Client, FetchError> {
        let key = Self::client_key(cfg, proxy);
        if let Some(c) = self.clients.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(c.clone());
        }
        let client = self.build_client(cfg, proxy)?;
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        domain: &str,
        port: u16,
        cfg: &HttpPersonaConfig,
        proxy: Option<&Proxy>,
    ) -> Result<FetchResponse, FetchError> {
        let client = self.client_for(cfg, proxy)?;
        let scheme = if port == 443 { "https" } else { "http" };
        let url = format!("{scheme}://{domain}:{port}/");

        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, proxy.is_some()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string())
            })
            .collect();
        let mut body = resp
            .text()
            .await
            .map_err(|e| map_reqwest_error(&e, proxy.is_some()))?;
        if body.len() > MAX_BODY_BYTES {
            let mut cut = MAX_BODY_BYTES;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Ok(FetchResponse { status, headers, body })
    }
}

fn map_reqwest_error(e: &reqwest::Error, via_proxy: bool) -> FetchError {
    if e.is_timeout() {
        return FetchError::Timeout;
    }
    let text = full_error_text(e);
    if e.is_connect() {
        if via_proxy {
            return FetchError::Proxy(text);
        }
        if io_refused_in_chain(e) {
            return FetchError::ConnectionRefused;
        }
        if text.contains("dns") || text.contains("lookup") {
            return FetchError::Dns(text);
        }
        return FetchError::ConnectionRefused;
    }
    FetchError::Other(text)
}

fn full_error_text(e: &reqwest::Error) -> String {
    let mut parts = vec![e.to_string()];
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ").to_ascii_lowercase()
}

fn io_refused_in_chain(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        if let Some(io) = s.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = s.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(status: u16) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse { status, headers: vec![], body: String::new() })
    }

    #[test]
    fn two_xx_with_hit_is_success() {
        assert_eq!(classify(&ok(200), true), HttpResultStatus::Success);
        assert_eq!(classify(&ok(204), true), HttpResultStatus::Success);
    }

    #[test]
    fn two_xx_without_hit_is_keywords_not_found() {
        assert_eq!(classify(&ok(200), false), HttpResultStatus::KeywordsNotFound);
    }

    #[test]
    fn non_two_xx_is_content_mismatch() {
        assert_eq!(classify(&ok(404), false), HttpResultStatus::ContentMismatch);
        assert_eq!(classify(&ok(500), true), HttpResultStatus::ContentMismatch);
        assert_eq!(classify(&ok(301), false), HttpResultStatus::ContentMismatch);
    }

    #[test]
    fn auth_walls_are_access_denied() {
        assert_eq!(classify(&ok(401), false), HttpResultStatus::AccessDenied);
        assert_eq!(classify(&ok(403), true), HttpResultStatus::AccessDenied);
    }

    #[test]
    fn transport_failures_map_to_their_statuses() {
        assert_eq!(
            classify(&Err(FetchError::ConnectionRefused), false),
            HttpResultStatus::Unreachable
        );
        assert_eq!(classify(&Err(FetchError::Timeout), false), HttpResultStatus::Timeout);
        assert_eq!(
            classify(&Err(FetchError::Dns("nx".into())), false),
            HttpResultStatus::DnsError
        );
        assert_eq!(
            classify(&Err(FetchError::Proxy("down".into())), false),
            HttpResultStatus::ProxyError
        );
        assert_eq!(
            classify(&Err(FetchError::Other("tls".into())), false),
            HttpResultStatus::Error
        );
    }
}
