use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::CampaignKind;
use crate::limits::{
    enforce_batch_size, enforce_port, enforce_retry_attempts, ValidationError, ValidationResult,
};
use crate::proxy::ProxySelectionStrategy;
use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pattern_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Prefix,
    Suffix,
    Both,
}

/// Parameters of a generation campaign. `current_offset` is the
/// authoritative resume cursor and only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DomainGenerationParams {
    pub campaign_id: Uuid,
    pub pattern_kind: PatternKind,
    pub variable_length: i32,
    pub character_set: String,
    pub constant_string: String,
    pub tld: String,
    #[serde(with = "wire::i64_string")]
    pub num_domains_to_generate: i64,
    #[serde(with = "wire::i64_string")]
    pub total_possible_combinations: i64,
    #[serde(with = "wire::i64_string")]
    pub current_offset: i64,
}

impl DomainGenerationParams {
    pub fn validate(&self) -> ValidationResult {
        if self.variable_length < 1 {
            return Err(ValidationError::OutOfRange {
                field: "variable_length",
                min: 1,
                max: 64,
                actual: self.variable_length as i64,
            });
        }
        if self.character_set.is_empty() {
            return Err(ValidationError::Empty { field: "character_set" });
        }
        if self.tld.trim_matches('.').is_empty() {
            return Err(ValidationError::Empty { field: "tld" });
        }
        if self.num_domains_to_generate < 0 {
            return Err(ValidationError::OutOfRange {
                field: "num_domains_to_generate",
                min: 0,
                max: i64::MAX,
                actual: self.num_domains_to_generate,
            });
        }
        if self.current_offset < 0 {
            return Err(ValidationError::OutOfRange {
                field: "current_offset",
                min: 0,
                max: i64::MAX,
                actual: self.current_offset,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DnsValidationParams {
    pub campaign_id: Uuid,
    pub source_generation_campaign_id: Uuid,
    pub persona_ids: Vec<Uuid>,
    pub rotation_interval_seconds: i32,
    pub processing_speed_per_minute: Option<i32>,
    pub batch_size: i32,
    pub retry_attempts: i32,
}

impl DnsValidationParams {
    pub fn validate(&self) -> ValidationResult {
        if self.persona_ids.is_empty() {
            return Err(ValidationError::Empty { field: "persona_ids" });
        }
        enforce_batch_size(self.batch_size)?;
        enforce_retry_attempts(self.retry_attempts)?;
        if self.rotation_interval_seconds < 0 {
            return Err(ValidationError::OutOfRange {
                field: "rotation_interval_seconds",
                min: 0,
                max: i32::MAX as i64,
                actual: self.rotation_interval_seconds as i64,
            });
        }
        Ok(())
    }
}

/// Tagged reference to the upstream campaign an HTTP keyword campaign reads
/// from. The kind is validated at write time; only generation and DNS
/// campaigns are legal sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "sourceType")]
    pub kind: CampaignKind,
    #[serde(rename = "sourceCampaignId")]
    pub id: Uuid,
}

impl SourceRef {
    pub fn validate(&self) -> ValidationResult {
        match self.kind {
            CampaignKind::DomainGeneration | CampaignKind::DnsValidation => Ok(()),
            CampaignKind::HttpKeywordValidation => Err(ValidationError::Invalid {
                field: "sourceType",
                reason: "an HTTP keyword campaign cannot source another HTTP keyword campaign"
                    .into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HttpKeywordParams {
    pub campaign_id: Uuid,
    pub source_campaign_id: Uuid,
    pub source_kind: CampaignKind,
    pub persona_ids: Vec<Uuid>,
    pub keyword_set_ids: Vec<Uuid>,
    pub ad_hoc_keywords: Vec<String>,
    pub proxy_pool_id: Option<Uuid>,
    pub proxy_ids: Vec<Uuid>,
    pub proxy_selection_strategy: ProxySelectionStrategy,
    pub rotation_interval_seconds: i32,
    pub processing_speed_per_minute: Option<i32>,
    pub batch_size: i32,
    pub retry_attempts: i32,
    pub target_http_ports: Vec<i32>,
    pub last_processed_domain_name: Option<String>,
}

impl HttpKeywordParams {
    pub fn source(&self) -> SourceRef {
        SourceRef { kind: self.source_kind, id: self.source_campaign_id }
    }

    pub fn validate(&self) -> ValidationResult {
        self.source().validate()?;
        if self.persona_ids.is_empty() {
            return Err(ValidationError::Empty { field: "persona_ids" });
        }
        if self.keyword_set_ids.is_empty() && self.ad_hoc_keywords.is_empty() {
            return Err(ValidationError::Invalid {
                field: "keywords",
                reason: "at least one of keyword_set_ids or ad_hoc_keywords is required".into(),
            });
        }
        enforce_batch_size(self.batch_size)?;
        enforce_retry_attempts(self.retry_attempts)?;
        for &port in &self.target_http_ports {
            enforce_port(port)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_params() -> HttpKeywordParams {
        HttpKeywordParams {
            campaign_id: Uuid::new_v4(),
            source_campaign_id: Uuid::new_v4(),
            source_kind: CampaignKind::DnsValidation,
            persona_ids: vec![Uuid::new_v4()],
            keyword_set_ids: vec![Uuid::new_v4()],
            ad_hoc_keywords: vec![],
            proxy_pool_id: None,
            proxy_ids: vec![],
            proxy_selection_strategy: ProxySelectionStrategy::RoundRobin,
            rotation_interval_seconds: 60,
            processing_speed_per_minute: None,
            batch_size: 50,
            retry_attempts: 2,
            target_http_ports: vec![80, 443],
            last_processed_domain_name: None,
        }
    }

    #[test]
    fn http_params_need_keywords_from_somewhere() {
        let mut p = http_params();
        p.keyword_set_ids.clear();
        assert!(p.validate().is_err());
        p.ad_hoc_keywords.push("welcome".into());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn http_params_reject_http_source() {
        let mut p = http_params();
        p.source_kind = CampaignKind::HttpKeywordValidation;
        assert!(p.validate().is_err());
    }

    #[test]
    fn http_params_reject_out_of_range_ports() {
        let mut p = http_params();
        p.target_http_ports = vec![80, 0];
        assert!(p.validate().is_err());
        p.target_http_ports = vec![80, 70_000];
        assert!(p.validate().is_err());
    }

    #[test]
    fn batch_size_boundaries_match_creation_rules() {
        let mut p = http_params();
        p.batch_size = 10_000;
        assert!(p.validate().is_ok());
        p.batch_size = 10_001;
        assert!(p.validate().is_err());
        p.batch_size = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn dns_params_need_personas() {
        let p = DnsValidationParams {
            campaign_id: Uuid::new_v4(),
            source_generation_campaign_id: Uuid::new_v4(),
            persona_ids: vec![],
            rotation_interval_seconds: 30,
            processing_speed_per_minute: None,
            batch_size: 100,
            retry_attempts: 3,
        };
        assert!(p.validate().is_err());
    }
}
