use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wire;

/// A domain produced by the deterministic generator. `offset_index` is the
/// position in the generator's total order; `(campaign_id, domain_name)` is
/// unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeneratedDomain {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub domain_name: String,
    #[serde(with = "wire::i64_string")]
    pub offset_index: i64,
    pub source_pattern: String,
    pub tld: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dns_result_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DnsResultStatus {
    Resolved,
    Unresolved,
    Error,
    Pending,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DnsValidationResult {
    pub id: Uuid,
    pub dns_campaign_id: Uuid,
    pub generated_domain_id: Option<Uuid>,
    pub domain_name: String,
    pub status: DnsResultStatus,
    pub dns_records: Option<serde_json::Value>,
    pub validated_by_persona_id: Option<Uuid>,
    pub attempts: i32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "http_result_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HttpResultStatus {
    Success,
    ContentMismatch,
    KeywordsNotFound,
    Unreachable,
    AccessDenied,
    ProxyError,
    DnsError,
    Timeout,
    Error,
    Pending,
    Skipped,
}

impl HttpResultStatus {
    /// Whether the item counts toward `successful_items`.
    pub fn is_success(self) -> bool {
        matches!(self, HttpResultStatus::Success)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HttpKeywordResult {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub dns_result_id: Option<Uuid>,
    pub domain_name: String,
    pub status: HttpResultStatus,
    pub http_status_code: Option<i32>,
    pub response_headers: Option<serde_json::Value>,
    pub page_title: Option<String>,
    pub content_snippet: Option<String>,
    /// Set-attributed hits, serialized [`crate::keyword::KeywordHit`] values.
    pub found_keywords_from_sets: Option<serde_json::Value>,
    pub found_ad_hoc_keywords: Option<Vec<String>>,
    pub content_hash: Option<String>,
    pub used_http_persona_id: Option<Uuid>,
    pub used_proxy_id: Option<Uuid>,
    pub attempts: i32,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
