use sqlx::PgExecutor;
use uuid::Uuid;

use domainflow_api::keyword::{KeywordRule, KeywordSet};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LoadedKeywordSet {
    pub set: KeywordSet,
    pub rules: Vec<KeywordRule>,
}

/// Load the enabled keyword sets referenced by a campaign together with
/// their rules. A missing or disabled set mid-processing is terminal.
pub async fn load_sets<'e, E>(ex: E, ids: &[Uuid]) -> Result<Vec<LoadedKeywordSet>>
where
    E: PgExecutor<'e> + Copy,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sets = sqlx::query_as::<_, KeywordSet>(
        "SELECT * FROM keyword_sets WHERE id = ANY($1) AND is_enabled",
    )
    .bind(ids)
    .fetch_all(ex)
    .await?;
    if sets.len() != ids.len() {
        return Err(Error::Terminal(
            "one or more configured keyword sets are missing or disabled".into(),
        ));
    }

    let rules = sqlx::query_as::<_, KeywordRule>(
        "SELECT * FROM keyword_rules WHERE keyword_set_id = ANY($1) ORDER BY id",
    )
    .bind(ids)
    .fetch_all(ex)
    .await?;

    let mut out: Vec<LoadedKeywordSet> = sets
        .into_iter()
        .map(|set| LoadedKeywordSet { set, rules: Vec::new() })
        .collect();
    for rule in rules {
        if let Some(entry) = out.iter_mut().find(|s| s.set.id == rule.keyword_set_id) {
            entry.rules.push(rule);
        }
    }
    Ok(out)
}

/// Existence/enabled check at campaign-creation time.
pub async fn verify_exist<'e>(ex: impl PgExecutor<'e>, ids: &[Uuid]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM keyword_sets WHERE id = ANY($1) AND is_enabled")
            .bind(ids)
            .fetch_one(ex)
            .await?;
    if found != ids.len() as i64 {
        return Err(Error::InvalidRequest(
            "one or more keyword sets do not exist or are disabled".into(),
        ));
    }
    Ok(())
}
