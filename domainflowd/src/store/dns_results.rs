use sqlx::PgExecutor;
use uuid::Uuid;

use domainflow_api::results::{DnsResultStatus, DnsValidationResult};

use crate::error::Result;

pub struct NewDnsResult {
    pub id: Uuid,
    pub generated_domain_id: Option<Uuid>,
    pub domain_name: String,
    pub status: DnsResultStatus,
    pub dns_records: Option<serde_json::Value>,
    pub persona_id: Option<Uuid>,
    pub attempts: i32,
}

/// Upsert one verdict under the `(dns_campaign_id, domain_name)` key.
/// Retries overwrite the previous error row and carry the attempt count.
pub async fn upsert<'e>(
    ex: impl PgExecutor<'e>,
    dns_campaign_id: Uuid,
    r: &NewDnsResult,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO dns_validation_results
            (id, dns_campaign_id, generated_domain_id, domain_name, status,
             dns_records, validated_by_persona_id, attempts, last_checked_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
         ON CONFLICT (dns_campaign_id, domain_name) DO UPDATE SET
             status = EXCLUDED.status,
             dns_records = EXCLUDED.dns_records,
             validated_by_persona_id = EXCLUDED.validated_by_persona_id,
             attempts = EXCLUDED.attempts,
             last_checked_at = NOW()",
    )
    .bind(r.id)
    .bind(dns_campaign_id)
    .bind(r.generated_domain_id)
    .bind(&r.domain_name)
    .bind(r.status)
    .bind(&r.dns_records)
    .bind(r.persona_id)
    .bind(r.attempts)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn page<'e>(
    ex: impl PgExecutor<'e>,
    dns_campaign_id: Uuid,
    after_domain: Option<&str>,
    limit: i64,
) -> Result<Vec<DnsValidationResult>> {
    let rows = sqlx::query_as::<_, DnsValidationResult>(
        "SELECT * FROM dns_validation_results
          WHERE dns_campaign_id = $1
            AND ($2::text IS NULL OR domain_name > $2)
          ORDER BY domain_name ASC
          LIMIT $3",
    )
    .bind(dns_campaign_id)
    .bind(after_domain)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Resolved rows of the source DNS campaign not yet scanned by the HTTP
/// campaign, past the name cursor.
pub async fn http_candidates<'e>(
    ex: impl PgExecutor<'e>,
    dns_campaign_id: Uuid,
    http_campaign_id: Uuid,
    after_name: Option<&str>,
    limit: i64,
) -> Result<Vec<DnsValidationResult>> {
    let rows = sqlx::query_as::<_, DnsValidationResult>(
        "SELECT d.* FROM dns_validation_results d
          WHERE d.dns_campaign_id = $1
            AND d.status = 'resolved'
            AND ($3::text IS NULL OR d.domain_name > $3)
            AND NOT EXISTS (
                SELECT 1 FROM http_keyword_results h
                 WHERE h.campaign_id = $2 AND h.domain_name = d.domain_name)
          ORDER BY d.domain_name ASC
          LIMIT $4",
    )
    .bind(dns_campaign_id)
    .bind(http_campaign_id)
    .bind(after_name)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// How many resolved rows a DNS campaign has produced; the total an HTTP
/// campaign sourced from it is responsible for.
pub async fn resolved_count<'e>(ex: impl PgExecutor<'e>, dns_campaign_id: Uuid) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM dns_validation_results
          WHERE dns_campaign_id = $1 AND status = 'resolved'",
    )
    .bind(dns_campaign_id)
    .fetch_one(ex)
    .await?;
    Ok(n)
}

/// How many items this DNS campaign is ultimately responsible for.
pub async fn source_total<'e>(ex: impl PgExecutor<'e>, source_campaign_id: Uuid) -> Result<i64> {
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generated_domains WHERE campaign_id = $1")
            .bind(source_campaign_id)
            .fetch_one(ex)
            .await?;
    Ok(n)
}
