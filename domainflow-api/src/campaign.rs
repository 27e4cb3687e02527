use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wire;

/// The three stages of the reconnaissance pipeline. Wire names are the
/// literal, case-sensitive identifiers clients send; storage names are
/// snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_kind", rename_all = "snake_case")]
pub enum CampaignKind {
    DomainGeneration,
    #[serde(rename = "DNSValidation")]
    DnsValidation,
    #[serde(rename = "HTTPKeywordValidation")]
    HttpKeywordValidation,
}

impl CampaignKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignKind::DomainGeneration => "domain_generation",
            CampaignKind::DnsValidation => "dns_validation",
            CampaignKind::HttpKeywordValidation => "http_keyword_validation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Archived,
    Cancelled,
}

impl CampaignStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Archived | CampaignStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Queued => "queued",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
            CampaignStatus::Archived => "archived",
            CampaignStatus::Cancelled => "cancelled",
        }
    }
}

/// Root entity of the pipeline. Counters are 64-bit and serialized as JSON
/// strings so values above 2^53 survive JavaScript clients.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub kind: CampaignKind,
    pub status: CampaignStatus,
    pub user_id: Option<Uuid>,
    #[serde(with = "wire::opt_i64_string")]
    pub total_items: Option<i64>,
    #[serde(with = "wire::i64_string")]
    pub processed_items: i64,
    #[serde(with = "wire::i64_string")]
    pub successful_items: i64,
    #[serde(with = "wire::i64_string")]
    pub failed_items: i64,
    pub progress_percentage: f64,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Counter invariant check: non-negative, processed bounded by total
    /// when a total is known, and outcomes bounded by processed.
    pub fn counters_consistent(&self) -> bool {
        if self.processed_items < 0 || self.successful_items < 0 || self.failed_items < 0 {
            return false;
        }
        if let Some(total) = self.total_items {
            if total < 0 || self.processed_items > total {
                return false;
            }
        }
        self.successful_items + self.failed_items <= self.processed_items
    }
}

/// Filter for campaign listings. All fields are conjunctive; `created_before`
/// is the keyset cursor for `created_at DESC` pagination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<CampaignStatus>,
    pub kind: Option<CampaignKind>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names_are_case_sensitive_literals() {
        let k: CampaignKind = serde_json::from_str("\"DNSValidation\"").unwrap();
        assert_eq!(k, CampaignKind::DnsValidation);
        assert!(serde_json::from_str::<CampaignKind>("\"DnsValidation\"").is_err());
        assert_eq!(
            serde_json::to_string(&CampaignKind::HttpKeywordValidation).unwrap(),
            "\"HTTPKeywordValidation\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(CampaignStatus::Archived.is_terminal());
        assert!(CampaignStatus::Cancelled.is_terminal());
        assert!(!CampaignStatus::Completed.is_terminal());
        assert!(!CampaignStatus::Failed.is_terminal());
    }
}
