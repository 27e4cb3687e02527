//! DNS validation stage: consumes generated domains, resolves each through
//! the campaign's persona set with wall-clock rotation, and writes verdicts
//! back under the `(dns_campaign_id, domain_name)` key.

use std::time::Instant;

use sqlx::PgPool;
use uuid::Uuid;

use domainflow_api::campaign::CampaignStatus;
use domainflow_api::persona::{DnsPersonaConfig, Persona, PersonaKind};
use domainflow_api::results::DnsResultStatus;

use crate::error::{Error, Result};
use crate::processor::{throttle_delay, BatchOutcome};
use crate::rotation::PersonaRotation;
use crate::store;

mod resolver;

pub use resolver::{DnsLookupOutcome, DnsResolver, HickoryResolver};

/// Counter deltas for one item: `(processed, successful, failed)`.
///
/// Fresh items count into `processed` and one outcome bucket. A retried
/// error that resolves moves its unit from `failed` to `successful`; any
/// other retry outcome leaves the counters where the first attempt put
/// them.
pub(crate) fn progress_delta(
    prior: Option<DnsResultStatus>,
    new: DnsResultStatus,
) -> (i64, i64, i64) {
    match prior {
        None => {
            if new == DnsResultStatus::Resolved {
                (1, 1, 0)
            } else {
                (1, 0, 1)
            }
        }
        Some(DnsResultStatus::Error) if new == DnsResultStatus::Resolved => (0, 1, -1),
        Some(_) => (0, 0, 0),
    }
}

fn persona_configs(personas: &[Persona]) -> Result<Vec<(Uuid, DnsPersonaConfig)>> {
    personas
        .iter()
        .map(|p| {
            p.dns_config()
                .map(|cfg| (p.id, cfg))
                .map_err(|e| Error::Terminal(format!("persona {} config invalid: {e}", p.id)))
        })
        .collect()
}

/// One DNS batch. Candidate selection, resolution, and the single
/// transaction that persists verdicts + counters follow the batch contract:
/// readers of the next batch see all of this one or none of it.
pub async fn process_batch(
    pool: &PgPool,
    resolver: &dyn DnsResolver,
    campaign_id: Uuid,
) -> Result<BatchOutcome> {
    let campaign = store::campaigns::get(pool, campaign_id).await?;
    if campaign.status != CampaignStatus::Running {
        return Err(Error::InvalidState(format!(
            "dns campaign {campaign_id} is {} and cannot process batches",
            campaign.status.as_str()
        )));
    }
    let params = store::params::get_dns(pool, campaign_id).await?;

    let personas =
        store::personas::resolve_for_processing(pool, &params.persona_ids, PersonaKind::Dns)
            .await?;
    let configs = persona_configs(&personas)?;

    // The source may still be producing; keep the known total fresh so
    // progress stays meaningful while the upstream grows.
    let total =
        store::dns_results::source_total(pool, params.source_generation_campaign_id).await?;
    store::campaigns::set_total(pool, campaign_id, total).await?;

    let candidates = store::generated::dns_candidates(
        pool,
        params.source_generation_campaign_id,
        campaign_id,
        params.retry_attempts,
        params.batch_size as i64,
    )
    .await?;

    if candidates.is_empty() {
        let source =
            store::campaigns::get(pool, params.source_generation_campaign_id).await?;
        let source_finished = matches!(
            source.status,
            CampaignStatus::Completed
                | CampaignStatus::Failed
                | CampaignStatus::Cancelled
                | CampaignStatus::Archived
        );
        return Ok(BatchOutcome { done: source_finished, processed: 0 });
    }

    let started = Instant::now();
    let rotation = PersonaRotation::new(configs.len(), params.rotation_interval_seconds);

    let mut rows = Vec::with_capacity(candidates.len());
    let mut deltas = (0i64, 0i64, 0i64);
    for candidate in &candidates {
        let (persona_id, cfg) = &configs[rotation.index_at(started.elapsed())];
        let outcome = resolver.resolve(&candidate.domain.domain_name, cfg).await;

        let d = progress_delta(candidate.prior_status, outcome.status);
        deltas = (deltas.0 + d.0, deltas.1 + d.1, deltas.2 + d.2);

        // Only retryable errors stay eligible for another pass; a
        // non-retryable error burns the remaining attempts outright.
        let attempts = if outcome.status == DnsResultStatus::Error && !outcome.retryable {
            params.retry_attempts + 1
        } else {
            candidate.prior_attempts.unwrap_or(0) + 1
        };

        rows.push(store::dns_results::NewDnsResult {
            id: Uuid::new_v4(),
            generated_domain_id: Some(candidate.domain.id),
            domain_name: candidate.domain.domain_name.clone(),
            status: outcome.status,
            dns_records: outcome.records,
            persona_id: Some(*persona_id),
            attempts,
        });
    }

    let mut tx = pool.begin().await?;
    for row in &rows {
        store::dns_results::upsert(&mut *tx, campaign_id, row).await?;
    }
    store::campaigns::apply_progress(&mut *tx, campaign_id, deltas.0, deltas.1, deltas.2).await?;
    tx.commit().await?;

    if let Some(delay) =
        throttle_delay(rows.len() as u64, params.processing_speed_per_minute, started.elapsed())
    {
        tokio::time::sleep(delay).await;
    }

    Ok(BatchOutcome { done: false, processed: rows.len() as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_items_count_into_processed_and_one_bucket() {
        assert_eq!(progress_delta(None, DnsResultStatus::Resolved), (1, 1, 0));
        assert_eq!(progress_delta(None, DnsResultStatus::Unresolved), (1, 0, 1));
        assert_eq!(progress_delta(None, DnsResultStatus::Error), (1, 0, 1));
    }

    #[test]
    fn retried_error_flipping_to_resolved_moves_the_unit() {
        assert_eq!(
            progress_delta(Some(DnsResultStatus::Error), DnsResultStatus::Resolved),
            (0, 1, -1)
        );
    }

    #[test]
    fn retried_error_staying_failed_changes_nothing() {
        assert_eq!(
            progress_delta(Some(DnsResultStatus::Error), DnsResultStatus::Error),
            (0, 0, 0)
        );
        assert_eq!(
            progress_delta(Some(DnsResultStatus::Error), DnsResultStatus::Unresolved),
            (0, 0, 0)
        );
    }
}
