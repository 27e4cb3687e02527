use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "keyword_rule_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KeywordRuleKind {
    String,
    Regex,
}

/// One matching rule inside a keyword set. `context_chars` is the number of
/// surrounding characters captured with each hit.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordRule {
    pub id: Uuid,
    pub keyword_set_id: Uuid,
    pub kind: KeywordRuleKind,
    pub pattern: String,
    pub case_sensitive: bool,
    pub category: Option<String>,
    pub context_chars: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeywordSet {
    pub id: Uuid,
    pub name: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single keyword hit attributed to the set and rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub keyword_set_id: Uuid,
    pub rule_id: Uuid,
    pub pattern: String,
    pub category: Option<String>,
    pub contexts: Vec<String>,
}
