//! HTTP keyword validation stage: consumes generated domains or resolved
//! DNS results, fetches each over the persona/proxy rotation, scans bodies
//! against the campaign's keyword rules, and writes verdicts under the
//! `(campaign_id, domain_name)` key.

use std::time::Instant;

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use domainflow_api::campaign::{CampaignKind, CampaignStatus};
use domainflow_api::persona::{HttpPersonaConfig, Persona, PersonaKind};
use domainflow_api::proxy::Proxy;
use domainflow_api::results::HttpResultStatus;

use crate::error::{Error, Result};
use crate::processor::{throttle_delay, BatchOutcome};
use crate::rotation::{PersonaRotation, ProxySelector};
use crate::store;

mod fetch;
mod scan;

pub use fetch::{classify, FetchError, FetchResponse, HttpFetcher, ReqwestFetcher};
pub use scan::{compile, extract_title, snippet, CompiledKeywords, ScanOutcome};

const DEFAULT_PORTS: [i32; 2] = [80, 443];
const SNIPPET_CHARS: usize = 256;

/// Counter deltas `(processed, successful, failed)` for one item, mirroring
/// the DNS accounting: fresh items fill `processed` plus a bucket; a
/// retried transport failure that now succeeds moves its unit across.
pub(crate) fn progress_delta(
    prior: Option<HttpResultStatus>,
    new: HttpResultStatus,
) -> (i64, i64, i64) {
    let retryable_prior = matches!(
        prior,
        Some(HttpResultStatus::Error)
            | Some(HttpResultStatus::Timeout)
            | Some(HttpResultStatus::ProxyError)
    );
    match prior {
        None => {
            if new.is_success() {
                (1, 1, 0)
            } else {
                (1, 0, 1)
            }
        }
        Some(_) if retryable_prior && new.is_success() => (0, 1, -1),
        Some(_) => (0, 0, 0),
    }
}

/// One unit of scan work, from either source stream or the retry pass.
struct ScanItem {
    domain_name: String,
    dns_result_id: Option<Uuid>,
    prior_status: Option<HttpResultStatus>,
    prior_attempts: i32,
    /// Retry items sit behind the name cursor and must not advance it.
    advances_cursor: bool,
}

fn persona_configs(personas: &[Persona]) -> Result<Vec<(Uuid, HttpPersonaConfig)>> {
    personas
        .iter()
        .map(|p| {
            p.http_config()
                .map(|cfg| (p.id, cfg))
                .map_err(|e| Error::Terminal(format!("persona {} config invalid: {e}", p.id)))
        })
        .collect()
}

/// Try the target ports in order until something other than a refused
/// connection comes back.
pub async fn fetch_with_port_fallthrough(
    fetcher: &dyn HttpFetcher,
    domain: &str,
    ports: &[i32],
    cfg: &HttpPersonaConfig,
    proxy: Option<&Proxy>,
) -> std::result::Result<FetchResponse, FetchError> {
    let mut last = Err(FetchError::ConnectionRefused);
    for &port in ports {
        last = fetcher.fetch(domain, port as u16, cfg, proxy).await;
        if !matches!(last, Err(FetchError::ConnectionRefused)) {
            return last;
        }
    }
    last
}

pub async fn process_batch(
    pool: &PgPool,
    fetcher: &dyn HttpFetcher,
    campaign_id: Uuid,
) -> Result<BatchOutcome> {
    let campaign = store::campaigns::get(pool, campaign_id).await?;
    if campaign.status != CampaignStatus::Running {
        return Err(Error::InvalidState(format!(
            "http campaign {campaign_id} is {} and cannot process batches",
            campaign.status.as_str()
        )));
    }
    let params = store::params::get_http(pool, campaign_id).await?;

    let personas =
        store::personas::resolve_for_processing(pool, &params.persona_ids, PersonaKind::Http)
            .await?;
    let configs = persona_configs(&personas)?;

    let sets = store::keywords::load_sets(pool, &params.keyword_set_ids).await?;
    let keywords = scan::compile(&sets, &params.ad_hoc_keywords)?;
    if keywords.is_empty() {
        return Err(Error::Terminal(
            "campaign has no keyword rules left to scan with".into(),
        ));
    }

    // An explicit id list wins; a pool reference means every enabled proxy.
    let proxy_pool: Vec<Proxy> = if !params.proxy_ids.is_empty() {
        store::proxies::get_many(pool, &params.proxy_ids).await?
    } else if params.proxy_pool_id.is_some() {
        store::proxies::list_enabled(pool).await?
    } else {
        Vec::new()
    };
    let use_proxies = !proxy_pool.is_empty()
        || !params.proxy_ids.is_empty()
        || params.proxy_pool_id.is_some();
    let mut selector = ProxySelector::new(proxy_pool, params.proxy_selection_strategy);

    let total = match params.source_kind {
        CampaignKind::DomainGeneration => {
            store::generated::count(pool, params.source_campaign_id).await?
        }
        _ => store::dns_results::resolved_count(pool, params.source_campaign_id).await?,
    };
    store::campaigns::set_total(pool, campaign_id, total).await?;

    let items = collect_items(pool, &params, campaign_id).await?;
    if items.is_empty() {
        let source = store::campaigns::get(pool, params.source_campaign_id).await?;
        let source_finished = matches!(
            source.status,
            CampaignStatus::Completed
                | CampaignStatus::Failed
                | CampaignStatus::Cancelled
                | CampaignStatus::Archived
        );
        return Ok(BatchOutcome { done: source_finished, processed: 0 });
    }

    let ports: Vec<i32> = if params.target_http_ports.is_empty() {
        DEFAULT_PORTS.to_vec()
    } else {
        params.target_http_ports.clone()
    };

    let started = Instant::now();
    let rotation = PersonaRotation::new(configs.len(), params.rotation_interval_seconds);

    let mut rows = Vec::with_capacity(items.len());
    let mut deltas = (0i64, 0i64, 0i64);
    let mut cursor: Option<String> = None;
    let mut failed_proxies: Vec<(Uuid, String)> = Vec::new();

    for item in &items {
        let (persona_id, cfg) = &configs[rotation.index_at(started.elapsed())];

        let proxy = if use_proxies { selector.next(*persona_id).cloned() } else { None };
        let outcome = if use_proxies && proxy.is_none() {
            // Pool configured but nothing healthy remains for this item.
            Err(FetchError::Proxy("no healthy proxy available".into()))
        } else {
            fetch_with_port_fallthrough(
                fetcher,
                &item.domain_name,
                &ports,
                cfg,
                proxy.as_ref(),
            )
            .await
        };

        if let (Err(FetchError::Proxy(msg)), Some(p)) = (&outcome, &proxy) {
            selector.mark_unhealthy(p.id);
            failed_proxies.push((p.id, msg.clone()));
        }

        let scanned = match &outcome {
            Ok(resp) => keywords.scan(&resp.body),
            Err(_) => ScanOutcome::default(),
        };
        let status = classify(&outcome, scanned.any_hit());

        let d = progress_delta(item.prior_status, status);
        deltas = (deltas.0 + d.0, deltas.1 + d.1, deltas.2 + d.2);

        rows.push(build_row(item, status, &outcome, &scanned, *persona_id, proxy.as_ref()));

        if item.advances_cursor {
            cursor = Some(item.domain_name.clone());
        }
    }

    let mut tx = pool.begin().await?;
    for row in &rows {
        store::http_results::upsert(&mut *tx, campaign_id, row).await?;
    }
    if let Some(last) = &cursor {
        store::params::advance_http_cursor(&mut *tx, campaign_id, last).await?;
    }
    store::campaigns::apply_progress(&mut *tx, campaign_id, deltas.0, deltas.1, deltas.2).await?;
    tx.commit().await?;

    for (proxy_id, msg) in failed_proxies {
        if let Err(e) = store::proxies::mark_health(pool, proxy_id, false, Some(&msg)).await {
            tracing::warn!(
                target = "domainflow_httpscan",
                proxy = %proxy_id,
                "failed to record proxy health: {e}"
            );
        }
    }

    if let Some(delay) =
        throttle_delay(rows.len() as u64, params.processing_speed_per_minute, started.elapsed())
    {
        tokio::time::sleep(delay).await;
    }

    Ok(BatchOutcome { done: false, processed: rows.len() as u64 })
}

/// Forward stream first (past the name cursor), then the retry pass over
/// transport failures once the stream drains.
async fn collect_items(
    pool: &PgPool,
    params: &domainflow_api::params::HttpKeywordParams,
    campaign_id: Uuid,
) -> Result<Vec<ScanItem>> {
    let limit = params.batch_size as i64;
    let after = params.last_processed_domain_name.as_deref();

    let forward: Vec<ScanItem> = match params.source_kind {
        CampaignKind::DomainGeneration => {
            store::generated::http_candidates(pool, params.source_campaign_id, campaign_id, after, limit)
                .await?
                .into_iter()
                .map(|d| ScanItem {
                    domain_name: d.domain_name,
                    dns_result_id: None,
                    prior_status: None,
                    prior_attempts: 0,
                    advances_cursor: true,
                })
                .collect()
        }
        _ => store::dns_results::http_candidates(
            pool,
            params.source_campaign_id,
            campaign_id,
            after,
            limit,
        )
        .await?
        .into_iter()
        .map(|r| ScanItem {
            domain_name: r.domain_name,
            dns_result_id: Some(r.id),
            prior_status: None,
            prior_attempts: 0,
            advances_cursor: true,
        })
        .collect(),
    };
    if !forward.is_empty() {
        return Ok(forward);
    }

    let retries = store::http_results::retry_candidates(
        pool,
        campaign_id,
        params.retry_attempts,
        limit,
    )
    .await?;
    Ok(retries
        .into_iter()
        .map(|r| ScanItem {
            domain_name: r.domain_name,
            dns_result_id: r.dns_result_id,
            prior_status: Some(r.status),
            prior_attempts: r.attempts,
            advances_cursor: false,
        })
        .collect())
}

fn build_row(
    item: &ScanItem,
    status: HttpResultStatus,
    outcome: &std::result::Result<FetchResponse, FetchError>,
    scanned: &ScanOutcome,
    persona_id: Uuid,
    proxy: Option<&Proxy>,
) -> store::http_results::NewHttpResult {
    let (http_status_code, response_headers, page_title, content_snippet, content_hash) =
        match outcome {
            Ok(resp) => {
                let headers = serde_json::Map::from_iter(
                    resp.headers
                        .iter()
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))),
                );
                let hash = hex::encode(Sha256::digest(resp.body.as_bytes()));
                (
                    Some(resp.status as i32),
                    Some(serde_json::Value::Object(headers)),
                    extract_title(&resp.body),
                    snippet(&resp.body, SNIPPET_CHARS),
                    Some(hash),
                )
            }
            Err(_) => (None, None, None, None, None),
        };

    let found_keywords_from_sets = if scanned.set_hits.is_empty() {
        None
    } else {
        serde_json::to_value(&scanned.set_hits).ok()
    };

    store::http_results::NewHttpResult {
        id: Uuid::new_v4(),
        dns_result_id: item.dns_result_id,
        domain_name: item.domain_name.clone(),
        status,
        http_status_code,
        response_headers,
        page_title,
        content_snippet,
        found_keywords_from_sets,
        found_ad_hoc_keywords: if scanned.ad_hoc_hits.is_empty() {
            None
        } else {
            Some(scanned.ad_hoc_hits.clone())
        },
        content_hash,
        persona_id: Some(persona_id),
        proxy_id: proxy.map(|p| p.id),
        attempts: item.prior_attempts + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domainflow_api::keyword::KeywordHit;

    #[test]
    fn fresh_items_fill_processed_and_a_bucket() {
        assert_eq!(progress_delta(None, HttpResultStatus::Success), (1, 1, 0));
        assert_eq!(progress_delta(None, HttpResultStatus::KeywordsNotFound), (1, 0, 1));
        assert_eq!(progress_delta(None, HttpResultStatus::ContentMismatch), (1, 0, 1));
        assert_eq!(progress_delta(None, HttpResultStatus::Unreachable), (1, 0, 1));
    }

    #[test]
    fn retried_transport_failure_turning_success_moves_the_unit() {
        for prior in
            [HttpResultStatus::Error, HttpResultStatus::Timeout, HttpResultStatus::ProxyError]
        {
            assert_eq!(progress_delta(Some(prior), HttpResultStatus::Success), (0, 1, -1));
        }
    }

    #[test]
    fn other_retry_outcomes_leave_counters_alone() {
        assert_eq!(
            progress_delta(Some(HttpResultStatus::Timeout), HttpResultStatus::Timeout),
            (0, 0, 0)
        );
        assert_eq!(
            progress_delta(
                Some(HttpResultStatus::ProxyError),
                HttpResultStatus::KeywordsNotFound
            ),
            (0, 0, 0)
        );
    }

    #[test]
    fn keyword_hit_serialization_is_stable() {
        let hit = KeywordHit {
            keyword_set_id: Uuid::nil(),
            rule_id: Uuid::nil(),
            pattern: "welcome".into(),
            category: None,
            contexts: vec!["a welcome b".into()],
        };
        let v = serde_json::to_value(vec![hit]).unwrap();
        assert!(v.as_array().unwrap()[0]["pattern"] == "welcome");
    }
}
