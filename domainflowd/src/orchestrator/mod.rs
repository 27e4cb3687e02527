//! Campaign orchestration: the public operations that create the three
//! campaign kinds, wire source→target chains, and expose the control verbs.
//! Creation writes campaign + params + the initial job in one transaction;
//! control verbs go through the state machine under the campaign row lock.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use domainflow_api::campaign::{Campaign, CampaignFilter, CampaignKind, CampaignStatus};
use domainflow_api::job::JobStatus;
use domainflow_api::params::{DnsValidationParams, DomainGenerationParams, HttpKeywordParams};
use domainflow_api::persona::PersonaKind;
use domainflow_api::requests::{
    CreateDnsValidationRequest, CreateDomainGenerationRequest, CreateHttpKeywordRequest,
};
use domainflow_api::results::{DnsValidationResult, GeneratedDomain, HttpKeywordResult};

use crate::auth::{AuthContext, AuthService};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::generator::GeneratorModel;
use crate::lifecycle::Lifecycle;
use crate::store;

pub const PERM_CREATE: &str = "campaigns:create";
pub const PERM_READ: &str = "campaigns:read";
pub const PERM_CONTROL: &str = "campaigns:control";
pub const PERM_ADMIN: &str = "campaigns:admin";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum CampaignParams {
    #[serde(rename = "DomainGeneration")]
    Generation(DomainGenerationParams),
    #[serde(rename = "DNSValidation")]
    Dns(DnsValidationParams),
    #[serde(rename = "HTTPKeywordValidation")]
    Http(HttpKeywordParams),
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignDetails {
    pub campaign: Campaign,
    pub params: CampaignParams,
}

/// Keyset page; `next_cursor` feeds the following request verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next_cursor: Option<C>,
}

pub struct Orchestrator {
    pool: PgPool,
    lifecycle: Lifecycle,
    auth: Arc<AuthService>,
    config: Arc<AppConfig>,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        lifecycle: Lifecycle,
        auth: Arc<AuthService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { pool, lifecycle, auth, config }
    }

    // ─── creation ──────────────────────────────────────────

    pub async fn create_domain_generation_campaign(
        &self,
        req: CreateDomainGenerationRequest,
        ctx: Option<&AuthContext>,
    ) -> Result<Campaign> {
        if let Some(ctx) = ctx {
            self.auth.require_permission(ctx, PERM_CREATE).await?;
        }

        let campaign_id = Uuid::new_v4();
        let mut params = DomainGenerationParams {
            campaign_id,
            pattern_kind: req.pattern_kind,
            variable_length: req.variable_length,
            character_set: req.character_set,
            constant_string: req.constant_string,
            tld: req.tld,
            num_domains_to_generate: req.num_domains_to_generate,
            total_possible_combinations: 0,
            current_offset: 0,
        };
        let model = GeneratorModel::from_params(&params)?;
        params.total_possible_combinations = model.total_combinations();

        // An identical configuration resumes from the shared cursor instead
        // of regenerating domains another campaign already produced.
        let shared_offset = store::cursor::get(&self.pool, &model.config_hash())
            .await?
            .unwrap_or(0)
            .min(params.total_possible_combinations);
        params.current_offset = shared_offset;

        let total = (params.total_possible_combinations - shared_offset)
            .min(params.num_domains_to_generate);

        let mut tx = self.pool.begin().await?;
        let campaign = store::campaigns::insert(
            &mut *tx,
            &store::campaigns::NewCampaign {
                id: campaign_id,
                name: req.name,
                kind: CampaignKind::DomainGeneration,
                user_id: ctx.map(|c| c.user_id),
                total_items: Some(total),
                metadata: req.metadata,
            },
        )
        .await?;
        store::params::insert_generation(&mut *tx, &params).await?;
        store::jobs::insert(
            &mut *tx,
            &store::jobs::NewJob {
                id: Uuid::new_v4(),
                campaign_id,
                job_kind: CampaignKind::DomainGeneration,
                status: JobStatus::Pending,
                scheduled_at: Utc::now(),
                max_attempts: self.config.worker.max_job_retries,
                payload: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(campaign)
    }

    pub async fn create_dns_validation_campaign(
        &self,
        req: CreateDnsValidationRequest,
        ctx: Option<&AuthContext>,
    ) -> Result<Campaign> {
        if let Some(ctx) = ctx {
            self.auth.require_permission(ctx, PERM_CREATE).await?;
        }

        let campaign_id = Uuid::new_v4();
        let params = DnsValidationParams {
            campaign_id,
            source_generation_campaign_id: req.source_generation_campaign_id,
            persona_ids: req.persona_ids,
            rotation_interval_seconds: req.rotation_interval_seconds,
            processing_speed_per_minute: req.processing_speed_per_minute,
            batch_size: req.batch_size,
            retry_attempts: req.retry_attempts,
        };
        params.validate()?;

        // The upstream only needs to exist and be a generation campaign;
        // chaining streams through the store, not through completion order.
        let source = store::campaigns::get(&self.pool, params.source_generation_campaign_id)
            .await
            .map_err(|_| {
                Error::InvalidRequest(format!(
                    "source campaign {} does not exist",
                    params.source_generation_campaign_id
                ))
            })?;
        if source.kind != CampaignKind::DomainGeneration {
            return Err(Error::InvalidRequest(
                "a DNS validation campaign must source a domain generation campaign".into(),
            ));
        }
        store::personas::resolve(&self.pool, &params.persona_ids, PersonaKind::Dns).await?;

        let total = store::generated::count(&self.pool, source.id).await?;

        let mut tx = self.pool.begin().await?;
        let campaign = store::campaigns::insert(
            &mut *tx,
            &store::campaigns::NewCampaign {
                id: campaign_id,
                name: req.name,
                kind: CampaignKind::DnsValidation,
                user_id: ctx.map(|c| c.user_id),
                total_items: Some(total),
                metadata: req.metadata,
            },
        )
        .await?;
        store::params::insert_dns(&mut *tx, &params).await?;
        store::jobs::insert(
            &mut *tx,
            &store::jobs::NewJob {
                id: Uuid::new_v4(),
                campaign_id,
                job_kind: CampaignKind::DnsValidation,
                status: JobStatus::Pending,
                scheduled_at: Utc::now(),
                max_attempts: self.config.worker.max_job_retries,
                payload: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(campaign)
    }

    pub async fn create_http_keyword_campaign(
        &self,
        req: CreateHttpKeywordRequest,
        ctx: Option<&AuthContext>,
    ) -> Result<Campaign> {
        if let Some(ctx) = ctx {
            self.auth.require_permission(ctx, PERM_CREATE).await?;
        }

        let campaign_id = Uuid::new_v4();
        let params = HttpKeywordParams {
            campaign_id,
            source_campaign_id: req.source.id,
            source_kind: req.source.kind,
            persona_ids: req.persona_ids,
            keyword_set_ids: req.keyword_set_ids,
            ad_hoc_keywords: req.ad_hoc_keywords,
            proxy_pool_id: req.proxy_pool_id,
            proxy_ids: req.proxy_ids,
            proxy_selection_strategy: req.proxy_selection_strategy,
            rotation_interval_seconds: req.rotation_interval_seconds,
            processing_speed_per_minute: req.processing_speed_per_minute,
            batch_size: req.batch_size,
            retry_attempts: req.retry_attempts,
            target_http_ports: req.target_http_ports,
            last_processed_domain_name: None,
        };
        params.validate()?;

        let source = store::campaigns::get(&self.pool, params.source_campaign_id)
            .await
            .map_err(|_| {
                Error::InvalidRequest(format!(
                    "source campaign {} does not exist",
                    params.source_campaign_id
                ))
            })?;
        if source.kind != params.source_kind {
            return Err(Error::InvalidRequest(format!(
                "declared source kind does not match campaign {} ({})",
                source.id,
                source.kind.as_str()
            )));
        }
        let total = match params.source_kind {
            CampaignKind::DomainGeneration => {
                store::generated::count(&self.pool, source.id).await?
            }
            CampaignKind::DnsValidation => {
                // A DNS upstream must have finished; its resolved set is the
                // input universe and must not shift underneath the scan.
                if source.status != CampaignStatus::Completed {
                    return Err(Error::InvalidRequest(format!(
                        "source DNS campaign {} is {}, expected completed",
                        source.id,
                        source.status.as_str()
                    )));
                }
                store::dns_results::resolved_count(&self.pool, source.id).await?
            }
            CampaignKind::HttpKeywordValidation => unreachable!("rejected by params.validate"),
        };

        store::personas::resolve(&self.pool, &params.persona_ids, PersonaKind::Http).await?;
        store::keywords::verify_exist(&self.pool, &params.keyword_set_ids).await?;
        if !params.proxy_ids.is_empty() {
            let found = store::proxies::get_many(&self.pool, &params.proxy_ids).await?;
            if found.len() != params.proxy_ids.len() {
                return Err(Error::InvalidRequest(
                    "one or more proxies do not exist or are disabled".into(),
                ));
            }
        }

        let mut tx = self.pool.begin().await?;
        let campaign = store::campaigns::insert(
            &mut *tx,
            &store::campaigns::NewCampaign {
                id: campaign_id,
                name: req.name,
                kind: CampaignKind::HttpKeywordValidation,
                user_id: ctx.map(|c| c.user_id),
                total_items: Some(total),
                metadata: req.metadata,
            },
        )
        .await?;
        store::params::insert_http(&mut *tx, &params).await?;
        store::jobs::insert(
            &mut *tx,
            &store::jobs::NewJob {
                id: Uuid::new_v4(),
                campaign_id,
                job_kind: CampaignKind::HttpKeywordValidation,
                status: JobStatus::Pending,
                scheduled_at: Utc::now(),
                max_attempts: self.config.worker.max_job_retries,
                payload: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(campaign)
    }

    // ─── control verbs ─────────────────────────────────────

    /// The initial job is parked at creation; starting the campaign makes
    /// it claimable.
    pub async fn start(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        self.authorize_control(id, ctx).await?;
        let mut tx = self.pool.begin().await?;
        let updated =
            self.lifecycle.transition(&mut tx, id, CampaignStatus::Queued, None).await?;
        store::jobs::unpark_for_campaign(&mut *tx, id).await?;
        tx.commit().await?;
        self.lifecycle.after_commit(&updated, CampaignStatus::Queued);
        Ok(updated)
    }

    /// Future claims stop; the in-flight batch, if any, runs to its commit.
    pub async fn pause(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        self.authorize_control(id, ctx).await?;
        let mut tx = self.pool.begin().await?;
        let updated =
            self.lifecycle.transition(&mut tx, id, CampaignStatus::Paused, None).await?;
        store::jobs::park_for_campaign(&mut *tx, id).await?;
        tx.commit().await?;
        self.lifecycle.after_commit(&updated, CampaignStatus::Paused);
        Ok(updated)
    }

    pub async fn resume(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        self.authorize_control(id, ctx).await?;
        let mut tx = self.pool.begin().await?;
        let updated =
            self.lifecycle.transition(&mut tx, id, CampaignStatus::Running, None).await?;
        store::jobs::unpark_for_campaign(&mut *tx, id).await?;
        tx.commit().await?;
        self.lifecycle.after_commit(&updated, CampaignStatus::Running);
        Ok(updated)
    }

    pub async fn cancel(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        self.authorize_control(id, ctx).await?;
        let mut tx = self.pool.begin().await?;
        let updated =
            self.lifecycle.transition(&mut tx, id, CampaignStatus::Cancelled, None).await?;
        store::jobs::drop_for_campaign(&mut *tx, id).await?;
        tx.commit().await?;
        self.lifecycle.after_commit(&updated, CampaignStatus::Cancelled);
        Ok(updated)
    }

    /// Put a failed campaign back on the queue with a fresh job.
    pub async fn retry(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        self.authorize_control(id, ctx).await?;
        let mut tx = self.pool.begin().await?;
        let updated =
            self.lifecycle.transition(&mut tx, id, CampaignStatus::Queued, None).await?;
        store::jobs::insert(
            &mut *tx,
            &store::jobs::NewJob {
                id: Uuid::new_v4(),
                campaign_id: id,
                job_kind: updated.kind,
                status: JobStatus::Queued,
                scheduled_at: Utc::now(),
                max_attempts: self.config.worker.max_job_retries,
                payload: None,
            },
        )
        .await?;
        tx.commit().await?;
        self.lifecycle.after_commit(&updated, CampaignStatus::Queued);
        Ok(updated)
    }

    pub async fn archive(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        self.authorize_control(id, ctx).await?;
        self.lifecycle.transition_tx(&self.pool, id, CampaignStatus::Archived, None).await
    }

    // ─── reads ─────────────────────────────────────────────

    pub async fn list_campaigns(
        &self,
        mut filter: CampaignFilter,
        ctx: Option<&AuthContext>,
    ) -> Result<Vec<Campaign>> {
        if let Some(ctx) = ctx {
            self.auth.require_permission(ctx, PERM_READ).await?;
            if !self.auth.has_permission(ctx, PERM_ADMIN).await? {
                filter.user_id = Some(ctx.user_id);
            }
        }
        store::campaigns::list(&self.pool, &filter).await
    }

    /// Per-status aggregate, derived on demand. Admins see the fleet;
    /// everyone else sees their own campaigns.
    pub async fn campaign_stats(
        &self,
        ctx: Option<&AuthContext>,
    ) -> Result<Vec<store::campaigns::CampaignStats>> {
        let scope = match ctx {
            Some(ctx) => {
                self.auth.require_permission(ctx, PERM_READ).await?;
                if self.auth.has_permission(ctx, PERM_ADMIN).await? {
                    None
                } else {
                    Some(ctx.user_id)
                }
            }
            None => None,
        };
        store::campaigns::stats(&self.pool, scope).await
    }

    pub async fn campaign_details(
        &self,
        id: Uuid,
        ctx: Option<&AuthContext>,
    ) -> Result<CampaignDetails> {
        let campaign = self.authorize_read(id, ctx).await?;
        let params = match campaign.kind {
            CampaignKind::DomainGeneration => {
                CampaignParams::Generation(store::params::get_generation(&self.pool, id).await?)
            }
            CampaignKind::DnsValidation => {
                CampaignParams::Dns(store::params::get_dns(&self.pool, id).await?)
            }
            CampaignKind::HttpKeywordValidation => {
                CampaignParams::Http(store::params::get_http(&self.pool, id).await?)
            }
        };
        Ok(CampaignDetails { campaign, params })
    }

    pub async fn campaign_status(
        &self,
        id: Uuid,
        ctx: Option<&AuthContext>,
    ) -> Result<Campaign> {
        self.authorize_read(id, ctx).await
    }

    pub async fn generated_domain_page(
        &self,
        campaign_id: Uuid,
        after_offset: Option<i64>,
        limit: i64,
        ctx: Option<&AuthContext>,
    ) -> Result<Page<GeneratedDomain, i64>> {
        self.authorize_read(campaign_id, ctx).await?;
        let items = store::generated::page(&self.pool, campaign_id, after_offset, limit).await?;
        let next_cursor = items.last().map(|d| d.offset_index);
        Ok(Page { items, next_cursor })
    }

    pub async fn dns_result_page(
        &self,
        campaign_id: Uuid,
        after_domain: Option<String>,
        limit: i64,
        ctx: Option<&AuthContext>,
    ) -> Result<Page<DnsValidationResult, String>> {
        self.authorize_read(campaign_id, ctx).await?;
        let items =
            store::dns_results::page(&self.pool, campaign_id, after_domain.as_deref(), limit)
                .await?;
        let next_cursor = items.last().map(|r| r.domain_name.clone());
        Ok(Page { items, next_cursor })
    }

    pub async fn http_result_page(
        &self,
        campaign_id: Uuid,
        after_domain: Option<String>,
        limit: i64,
        ctx: Option<&AuthContext>,
    ) -> Result<Page<HttpKeywordResult, String>> {
        self.authorize_read(campaign_id, ctx).await?;
        let items =
            store::http_results::page(&self.pool, campaign_id, after_domain.as_deref(), limit)
                .await?;
        let next_cursor = items.last().map(|r| r.domain_name.clone());
        Ok(Page { items, next_cursor })
    }

    // ─── authorization ─────────────────────────────────────

    /// Owner or admin; internal callers (no context) pass through.
    async fn authorize_control(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        let campaign = store::campaigns::get(&self.pool, id).await?;
        if let Some(ctx) = ctx {
            self.auth.require_permission(ctx, PERM_CONTROL).await?;
            self.require_ownership(&campaign, ctx).await?;
        }
        Ok(campaign)
    }

    async fn authorize_read(&self, id: Uuid, ctx: Option<&AuthContext>) -> Result<Campaign> {
        let campaign = store::campaigns::get(&self.pool, id).await?;
        if let Some(ctx) = ctx {
            self.auth.require_permission(ctx, PERM_READ).await?;
            self.require_ownership(&campaign, ctx).await?;
        }
        Ok(campaign)
    }

    async fn require_ownership(&self, campaign: &Campaign, ctx: &AuthContext) -> Result<()> {
        if campaign.user_id == Some(ctx.user_id) || self.auth.has_permission(ctx, PERM_ADMIN).await?
        {
            return Ok(());
        }
        Err(Error::Auth(format!("campaign {} belongs to another user", campaign.id)))
    }
}
