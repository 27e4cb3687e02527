use sqlx::PgExecutor;
use uuid::Uuid;

use domainflow_api::results::{HttpKeywordResult, HttpResultStatus};

use crate::error::Result;

pub struct NewHttpResult {
    pub id: Uuid,
    pub dns_result_id: Option<Uuid>,
    pub domain_name: String,
    pub status: HttpResultStatus,
    pub http_status_code: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub page_title: Option<String>,
    pub content_snippet: Option<String>,
    pub found_keywords_from_sets: Option<serde_json::Value>,
    pub found_ad_hoc_keywords: Option<Vec<String>>,
    pub content_hash: Option<String>,
    pub persona_id: Option<Uuid>,
    pub proxy_id: Option<Uuid>,
    pub attempts: i32,
}

pub async fn upsert<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    r: &NewHttpResult,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO http_keyword_results
            (id, campaign_id, dns_result_id, domain_name, status, http_status_code,
             response_headers, page_title, content_snippet, found_keywords_from_sets,
             found_ad_hoc_keywords, content_hash, used_http_persona_id, used_proxy_id,
             attempts, validated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
         ON CONFLICT (campaign_id, domain_name) DO UPDATE SET
             status = EXCLUDED.status,
             http_status_code = EXCLUDED.http_status_code,
             response_headers = EXCLUDED.response_headers,
             page_title = EXCLUDED.page_title,
             content_snippet = EXCLUDED.content_snippet,
             found_keywords_from_sets = EXCLUDED.found_keywords_from_sets,
             found_ad_hoc_keywords = EXCLUDED.found_ad_hoc_keywords,
             content_hash = EXCLUDED.content_hash,
             used_http_persona_id = EXCLUDED.used_http_persona_id,
             used_proxy_id = EXCLUDED.used_proxy_id,
             attempts = EXCLUDED.attempts,
             validated_at = NOW()",
    )
    .bind(r.id)
    .bind(campaign_id)
    .bind(r.dns_result_id)
    .bind(&r.domain_name)
    .bind(r.status)
    .bind(r.http_status_code)
    .bind(&r.response_headers)
    .bind(&r.page_title)
    .bind(&r.content_snippet)
    .bind(&r.found_keywords_from_sets)
    .bind(&r.found_ad_hoc_keywords)
    .bind(&r.content_hash)
    .bind(r.persona_id)
    .bind(r.proxy_id)
    .bind(r.attempts)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn page<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    after_domain: Option<&str>,
    limit: i64,
) -> Result<Vec<HttpKeywordResult>> {
    let rows = sqlx::query_as::<_, HttpKeywordResult>(
        "SELECT * FROM http_keyword_results
          WHERE campaign_id = $1
            AND ($2::text IS NULL OR domain_name > $2)
          ORDER BY domain_name ASC
          LIMIT $3",
    )
    .bind(campaign_id)
    .bind(after_domain)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Transport-level failures eligible for another pass. These sit behind the
/// main name cursor, so they are revisited once the forward stream drains.
pub async fn retry_candidates<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    retry_attempts: i32,
    limit: i64,
) -> Result<Vec<HttpKeywordResult>> {
    let rows = sqlx::query_as::<_, HttpKeywordResult>(
        "SELECT * FROM http_keyword_results
          WHERE campaign_id = $1
            AND status IN ('error', 'timeout', 'proxy_error')
            AND attempts < $2 + 1
          ORDER BY domain_name ASC
          LIMIT $3",
    )
    .bind(campaign_id)
    .bind(retry_attempts)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
