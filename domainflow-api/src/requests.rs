//! Campaign creation requests, transport-independent. The orchestrator is
//! the single validation point; these types only carry shape and defaults.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::{PatternKind, SourceRef};
use crate::proxy::ProxySelectionStrategy;
use crate::wire;

fn default_batch_size() -> i32 {
    100
}

fn default_retry_attempts() -> i32 {
    3
}

fn default_rotation_interval() -> i32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDomainGenerationRequest {
    pub name: String,
    pub pattern_kind: PatternKind,
    pub variable_length: i32,
    pub character_set: String,
    pub constant_string: String,
    pub tld: String,
    #[serde(with = "wire::i64_string")]
    pub num_domains_to_generate: i64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDnsValidationRequest {
    pub name: String,
    pub source_generation_campaign_id: Uuid,
    pub persona_ids: Vec<Uuid>,
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_seconds: i32,
    #[serde(default)]
    pub processing_speed_per_minute: Option<i32>,
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: i32,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHttpKeywordRequest {
    pub name: String,
    #[serde(flatten)]
    pub source: SourceRef,
    pub persona_ids: Vec<Uuid>,
    #[serde(default)]
    pub keyword_set_ids: Vec<Uuid>,
    #[serde(default)]
    pub ad_hoc_keywords: Vec<String>,
    #[serde(default)]
    pub proxy_pool_id: Option<Uuid>,
    #[serde(default)]
    pub proxy_ids: Vec<Uuid>,
    #[serde(default)]
    pub proxy_selection_strategy: ProxySelectionStrategy,
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_seconds: i32,
    #[serde(default)]
    pub processing_speed_per_minute: Option<i32>,
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: i32,
    #[serde(default)]
    pub target_http_ports: Vec<i32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignKind;

    #[test]
    fn http_request_source_type_is_the_flattened_literal() {
        let json = format!(
            r#"{{
                "name": "scan",
                "sourceType": "DNSValidation",
                "sourceCampaignId": "{}",
                "personaIds": ["{}"],
                "adHocKeywords": ["welcome"]
            }}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let req: CreateHttpKeywordRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.source.kind, CampaignKind::DnsValidation);
        assert_eq!(req.batch_size, 100);
        assert_eq!(req.proxy_selection_strategy, ProxySelectionStrategy::RoundRobin);
    }
}
