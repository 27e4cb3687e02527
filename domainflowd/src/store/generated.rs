use sqlx::PgExecutor;
use uuid::Uuid;

use domainflow_api::results::{DnsResultStatus, GeneratedDomain};

use crate::error::Result;

pub struct NewGeneratedDomain {
    pub id: Uuid,
    pub domain_name: String,
    pub offset_index: i64,
}

/// Bulk insert with conflict-skip on `(campaign_id, domain_name)`. Returns
/// the number of rows actually written; re-inserting offsets persisted by a
/// crashed earlier attempt is a no-op.
pub async fn bulk_insert<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    source_pattern: &str,
    tld: &str,
    domains: &[NewGeneratedDomain],
) -> Result<u64> {
    if domains.is_empty() {
        return Ok(0);
    }
    let ids: Vec<Uuid> = domains.iter().map(|d| d.id).collect();
    let names: Vec<String> = domains.iter().map(|d| d.domain_name.clone()).collect();
    let offsets: Vec<i64> = domains.iter().map(|d| d.offset_index).collect();

    let res = sqlx::query(
        "INSERT INTO generated_domains
            (id, campaign_id, domain_name, offset_index, source_pattern, tld)
         SELECT t.id, $1, t.domain_name, t.offset_index, $5, $6
           FROM UNNEST($2::uuid[], $3::text[], $4::bigint[])
                AS t(id, domain_name, offset_index)
         ON CONFLICT (campaign_id, domain_name) DO NOTHING",
    )
    .bind(campaign_id)
    .bind(&ids)
    .bind(&names)
    .bind(&offsets)
    .bind(source_pattern)
    .bind(tld)
    .execute(ex)
    .await?;
    Ok(res.rows_affected())
}

pub async fn count<'e>(ex: impl PgExecutor<'e>, campaign_id: Uuid) -> Result<i64> {
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generated_domains WHERE campaign_id = $1")
            .bind(campaign_id)
            .fetch_one(ex)
            .await?;
    Ok(n)
}

/// Keyset page ordered by `(offset_index, id)`; `after_offset` is the cursor.
pub async fn page<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    after_offset: Option<i64>,
    limit: i64,
) -> Result<Vec<GeneratedDomain>> {
    let rows = sqlx::query_as::<_, GeneratedDomain>(
        "SELECT * FROM generated_domains
          WHERE campaign_id = $1
            AND ($2::bigint IS NULL OR offset_index > $2)
          ORDER BY offset_index ASC, id ASC
          LIMIT $3",
    )
    .bind(campaign_id)
    .bind(after_offset)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// A generated domain joined with its DNS result for the validating
/// campaign, if one exists. `prior_attempts` drives per-item retries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DnsCandidate {
    #[sqlx(flatten)]
    pub domain: GeneratedDomain,
    pub prior_status: Option<DnsResultStatus>,
    pub prior_attempts: Option<i32>,
}

/// Domains from the source campaign still owed a verdict by the DNS
/// campaign: no result row yet, or an error row with attempts to spare.
pub async fn dns_candidates<'e>(
    ex: impl PgExecutor<'e>,
    source_campaign_id: Uuid,
    dns_campaign_id: Uuid,
    retry_attempts: i32,
    limit: i64,
) -> Result<Vec<DnsCandidate>> {
    let rows = sqlx::query_as::<_, DnsCandidate>(
        "SELECT gd.*, r.status AS prior_status, r.attempts AS prior_attempts
           FROM generated_domains gd
           LEFT JOIN dns_validation_results r
             ON r.dns_campaign_id = $2 AND r.domain_name = gd.domain_name
          WHERE gd.campaign_id = $1
            AND (r.id IS NULL OR (r.status = 'error' AND r.attempts < $3 + 1))
          ORDER BY gd.offset_index ASC, gd.id ASC
          LIMIT $4",
    )
    .bind(source_campaign_id)
    .bind(dns_campaign_id)
    .bind(retry_attempts)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Name-ordered stream for HTTP campaigns sourced directly from a
/// generation campaign. `after_name` is the HTTP campaign's domain cursor.
pub async fn http_candidates<'e>(
    ex: impl PgExecutor<'e>,
    source_campaign_id: Uuid,
    http_campaign_id: Uuid,
    after_name: Option<&str>,
    limit: i64,
) -> Result<Vec<GeneratedDomain>> {
    let rows = sqlx::query_as::<_, GeneratedDomain>(
        "SELECT gd.* FROM generated_domains gd
          WHERE gd.campaign_id = $1
            AND ($3::text IS NULL OR gd.domain_name > $3)
            AND NOT EXISTS (
                SELECT 1 FROM http_keyword_results h
                 WHERE h.campaign_id = $2 AND h.domain_name = gd.domain_name)
          ORDER BY gd.domain_name ASC
          LIMIT $4",
    )
    .bind(source_campaign_id)
    .bind(http_campaign_id)
    .bind(after_name)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}
