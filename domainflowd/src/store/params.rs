use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use domainflow_api::params::{DnsValidationParams, DomainGenerationParams, HttpKeywordParams};

use crate::error::{Error, Result};

pub async fn insert_generation<'e>(
    ex: impl PgExecutor<'e>,
    p: &DomainGenerationParams,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO domain_generation_params
            (campaign_id, pattern_kind, variable_length, character_set, constant_string,
             tld, num_domains_to_generate, total_possible_combinations, current_offset)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(p.campaign_id)
    .bind(p.pattern_kind)
    .bind(p.variable_length)
    .bind(&p.character_set)
    .bind(&p.constant_string)
    .bind(&p.tld)
    .bind(p.num_domains_to_generate)
    .bind(p.total_possible_combinations)
    .bind(p.current_offset)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn get_generation<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
) -> Result<DomainGenerationParams> {
    sqlx::query_as::<_, DomainGenerationParams>(
        "SELECT * FROM domain_generation_params WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_optional(ex)
    .await?
    .ok_or_else(|| Error::not_found(format!("generation params for campaign {campaign_id}")))
}

pub async fn get_generation_for_update(
    conn: &mut PgConnection,
    campaign_id: Uuid,
) -> Result<DomainGenerationParams> {
    sqlx::query_as::<_, DomainGenerationParams>(
        "SELECT * FROM domain_generation_params WHERE campaign_id = $1 FOR UPDATE",
    )
    .bind(campaign_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::not_found(format!("generation params for campaign {campaign_id}")))
}

/// The offset cursor only moves forward; a backwards write matches no row.
pub async fn advance_generation_offset<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    new_offset: i64,
) -> Result<()> {
    let res = sqlx::query(
        "UPDATE domain_generation_params
            SET current_offset = $2
          WHERE campaign_id = $1 AND current_offset <= $2",
    )
    .bind(campaign_id)
    .bind(new_offset)
    .execute(ex)
    .await?;
    if res.rows_affected() == 0 {
        return Err(Error::InvalidState(format!(
            "offset for campaign {campaign_id} would move backwards (to {new_offset})"
        )));
    }
    Ok(())
}

pub async fn insert_dns<'e>(ex: impl PgExecutor<'e>, p: &DnsValidationParams) -> Result<()> {
    sqlx::query(
        "INSERT INTO dns_validation_params
            (campaign_id, source_generation_campaign_id, persona_ids,
             rotation_interval_seconds, processing_speed_per_minute, batch_size, retry_attempts)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(p.campaign_id)
    .bind(p.source_generation_campaign_id)
    .bind(&p.persona_ids)
    .bind(p.rotation_interval_seconds)
    .bind(p.processing_speed_per_minute)
    .bind(p.batch_size)
    .bind(p.retry_attempts)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn get_dns<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
) -> Result<DnsValidationParams> {
    sqlx::query_as::<_, DnsValidationParams>(
        "SELECT * FROM dns_validation_params WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_optional(ex)
    .await?
    .ok_or_else(|| Error::not_found(format!("dns params for campaign {campaign_id}")))
}

pub async fn insert_http<'e>(ex: impl PgExecutor<'e>, p: &HttpKeywordParams) -> Result<()> {
    sqlx::query(
        "INSERT INTO http_keyword_params
            (campaign_id, source_campaign_id, source_kind, persona_ids, keyword_set_ids,
             ad_hoc_keywords, proxy_pool_id, proxy_ids, proxy_selection_strategy,
             rotation_interval_seconds, processing_speed_per_minute, batch_size,
             retry_attempts, target_http_ports, last_processed_domain_name)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(p.campaign_id)
    .bind(p.source_campaign_id)
    .bind(p.source_kind)
    .bind(&p.persona_ids)
    .bind(&p.keyword_set_ids)
    .bind(&p.ad_hoc_keywords)
    .bind(p.proxy_pool_id)
    .bind(&p.proxy_ids)
    .bind(p.proxy_selection_strategy)
    .bind(p.rotation_interval_seconds)
    .bind(p.processing_speed_per_minute)
    .bind(p.batch_size)
    .bind(p.retry_attempts)
    .bind(&p.target_http_ports)
    .bind(&p.last_processed_domain_name)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn get_http<'e>(ex: impl PgExecutor<'e>, campaign_id: Uuid) -> Result<HttpKeywordParams> {
    sqlx::query_as::<_, HttpKeywordParams>(
        "SELECT * FROM http_keyword_params WHERE campaign_id = $1",
    )
    .bind(campaign_id)
    .fetch_optional(ex)
    .await?
    .ok_or_else(|| Error::not_found(format!("http params for campaign {campaign_id}")))
}

/// Advance the resumption cursor to the last domain of a committed batch.
pub async fn advance_http_cursor<'e>(
    ex: impl PgExecutor<'e>,
    campaign_id: Uuid,
    last_domain_name: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE http_keyword_params
            SET last_processed_domain_name = $2
          WHERE campaign_id = $1
            AND (last_processed_domain_name IS NULL OR last_processed_domain_name < $2)",
    )
    .bind(campaign_id)
    .bind(last_domain_name)
    .execute(ex)
    .await?;
    Ok(())
}
