//! Deterministic domain generation.
//!
//! The parameter tuple (pattern, variable length, charset, constant, tld)
//! defines a total order over every producible domain. Offset `i` maps to
//! exactly one domain by base-`|charset|` decoding of `i` into the variable
//! slot, so any process can resume from a persisted offset and produce the
//! identical remainder.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use domainflow_api::campaign::CampaignStatus;
use domainflow_api::params::{DomainGenerationParams, PatternKind};

use crate::error::{Error, Result};
use crate::processor::BatchOutcome;
use crate::store;

#[derive(Debug, Clone)]
pub struct GeneratorModel {
    pattern: PatternKind,
    variable_length: u32,
    charset: Vec<char>,
    constant: String,
    tld: String,
}

impl GeneratorModel {
    pub fn from_params(p: &DomainGenerationParams) -> Result<Self> {
        p.validate()?;
        // Preserve first-occurrence order; duplicate characters would break
        // the bijection between offsets and domains.
        let mut deduped: Vec<char> = p.character_set.chars().collect();
        let mut seen = std::collections::HashSet::new();
        deduped.retain(|c| seen.insert(*c));
        if deduped.is_empty() {
            return Err(Error::InvalidRequest("character set is empty".into()));
        }
        Ok(Self {
            pattern: p.pattern_kind,
            variable_length: p.variable_length as u32,
            charset: deduped,
            constant: p.constant_string.clone(),
            tld: p.tld.trim_start_matches('.').to_string(),
        })
    }

    /// `|charset|^len`, doubled for the `both` pattern. Saturates at
    /// `i64::MAX` instead of overflowing; the generator simply never
    /// finishes such a space within a real campaign.
    pub fn total_combinations(&self) -> i64 {
        let n = self.charset.len() as i64;
        let mut total: i64 = 1;
        for _ in 0..self.variable_length {
            total = match total.checked_mul(n) {
                Some(v) => v,
                None => return i64::MAX,
            };
        }
        if self.pattern == PatternKind::Both {
            total.checked_mul(2).unwrap_or(i64::MAX)
        } else {
            total
        }
    }

    /// The unique domain at `offset`, or `None` past the end of the space.
    pub fn domain_at(&self, offset: i64) -> Option<String> {
        let total = self.total_combinations();
        if offset < 0 || offset >= total {
            return None;
        }
        let half = if self.pattern == PatternKind::Both { total / 2 } else { total };
        let (prefix_form, index) = match self.pattern {
            PatternKind::Prefix => (true, offset),
            PatternKind::Suffix => (false, offset),
            PatternKind::Both => {
                if offset < half {
                    (true, offset)
                } else {
                    (false, offset - half)
                }
            }
        };

        let label = {
            let variable = self.decode_variable(index);
            if prefix_form {
                format!("{}{}", variable, self.constant)
            } else {
                format!("{}{}", self.constant, variable)
            }
        };
        Some(format!("{}.{}", label, self.tld))
    }

    /// Base-N decode of `index` into a fixed-width string over the charset,
    /// most significant digit first.
    fn decode_variable(&self, index: i64) -> String {
        let n = self.charset.len() as i64;
        let mut digits = vec![self.charset[0]; self.variable_length as usize];
        let mut rest = index;
        for slot in digits.iter_mut().rev() {
            *slot = self.charset[(rest % n) as usize];
            rest /= n;
        }
        digits.into_iter().collect()
    }

    pub fn pattern_label(&self) -> &'static str {
        match self.pattern {
            PatternKind::Prefix => "prefix",
            PatternKind::Suffix => "suffix",
            PatternKind::Both => "both",
        }
    }

    pub fn tld(&self) -> &str {
        &self.tld
    }

    /// Stable hash of the parameter tuple; campaigns with an identical
    /// tuple share one resume cursor through `generation_cursor_state`.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.pattern_label().as_bytes());
        hasher.update([0]);
        hasher.update(self.variable_length.to_be_bytes());
        hasher.update([0]);
        hasher.update(self.charset.iter().collect::<String>().as_bytes());
        hasher.update([0]);
        hasher.update(self.constant.as_bytes());
        hasher.update([0]);
        hasher.update(self.tld.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// One generation batch. Reads the campaign and params under a row lock,
/// produces up to `batch_size` domains from the persisted offset, and
/// commits rows + offset + shared cursor + counters atomically: after a
/// crash either everything in the batch is visible or none of it is.
pub async fn process_batch(
    pool: &PgPool,
    campaign_id: Uuid,
    batch_size: i64,
) -> Result<BatchOutcome> {
    let mut tx = pool.begin().await?;

    let campaign = store::campaigns::get_for_update(&mut tx, campaign_id).await?;
    if campaign.status != CampaignStatus::Running {
        return Err(Error::InvalidState(format!(
            "generation campaign {campaign_id} is {} and cannot process batches",
            campaign.status.as_str()
        )));
    }
    let params = store::params::get_generation_for_update(&mut tx, campaign_id).await?;
    let model = GeneratorModel::from_params(&params)
        .map_err(|e| Error::Terminal(format!("generator configuration rotted: {e}")))?;

    let total = model.total_combinations();
    let start = params.current_offset;
    let remaining = (params.num_domains_to_generate - campaign.processed_items)
        .min(total - start)
        .max(0);
    let batch = remaining.min(batch_size.max(1));
    if batch <= 0 {
        tx.commit().await?;
        return Ok(BatchOutcome { done: true, processed: 0 });
    }

    let mut rows = Vec::with_capacity(batch as usize);
    for offset in start..start + batch {
        let domain_name = model.domain_at(offset).ok_or_else(|| {
            Error::Terminal(format!("offset {offset} left the generation space"))
        })?;
        rows.push(store::generated::NewGeneratedDomain {
            id: Uuid::new_v4(),
            domain_name,
            offset_index: offset,
        });
    }

    let source_pattern = format!("{}:{}", model.pattern_label(), params.constant_string);
    store::generated::bulk_insert(&mut *tx, campaign_id, &source_pattern, model.tld(), &rows)
        .await?;
    store::params::advance_generation_offset(&mut *tx, campaign_id, start + batch).await?;
    store::cursor::upsert(&mut *tx, &model.config_hash(), start + batch).await?;
    store::campaigns::apply_progress(&mut *tx, campaign_id, batch, batch, 0).await?;

    tx.commit().await?;

    Ok(BatchOutcome { done: batch == remaining, processed: batch as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params(
        pattern: PatternKind,
        len: i32,
        charset: &str,
        constant: &str,
        tld: &str,
        target: i64,
    ) -> DomainGenerationParams {
        DomainGenerationParams {
            campaign_id: Uuid::new_v4(),
            pattern_kind: pattern,
            variable_length: len,
            character_set: charset.into(),
            constant_string: constant.into(),
            tld: tld.into(),
            num_domains_to_generate: target,
            total_possible_combinations: 0,
            current_offset: 0,
        }
    }

    #[test]
    fn trivial_prefix_space_maps_in_order() {
        let model =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 1, "ab", "x", ".com", 4))
                .unwrap();
        assert_eq!(model.total_combinations(), 2);
        assert_eq!(model.domain_at(0).as_deref(), Some("ax.com"));
        assert_eq!(model.domain_at(1).as_deref(), Some("bx.com"));
        assert_eq!(model.domain_at(2), None);
    }

    #[test]
    fn suffix_pattern_places_constant_first() {
        let model =
            GeneratorModel::from_params(&params(PatternKind::Suffix, 1, "ab", "x", "com", 2))
                .unwrap();
        assert_eq!(model.domain_at(0).as_deref(), Some("xa.com"));
        assert_eq!(model.domain_at(1).as_deref(), Some("xb.com"));
    }

    #[test]
    fn both_pattern_doubles_the_space() {
        let model =
            GeneratorModel::from_params(&params(PatternKind::Both, 1, "ab", "x", "com", 10))
                .unwrap();
        assert_eq!(model.total_combinations(), 4);
        assert_eq!(model.domain_at(0).as_deref(), Some("ax.com"));
        assert_eq!(model.domain_at(1).as_deref(), Some("bx.com"));
        assert_eq!(model.domain_at(2).as_deref(), Some("xa.com"));
        assert_eq!(model.domain_at(3).as_deref(), Some("xb.com"));
    }

    #[test]
    fn mapping_is_a_bijection_over_the_space() {
        let model =
            GeneratorModel::from_params(&params(PatternKind::Both, 3, "abc", "k", "net", 100))
                .unwrap();
        let total = model.total_combinations();
        assert_eq!(total, 27 * 2);
        let mut seen = HashSet::new();
        for offset in 0..total {
            let d = model.domain_at(offset).expect("offset inside the space");
            assert!(seen.insert(d), "offset {offset} produced a duplicate");
        }
        // Regenerating any offset yields the same domain.
        assert_eq!(model.domain_at(17), model.domain_at(17));
    }

    #[test]
    fn base_n_decoding_is_most_significant_first() {
        let model =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 2, "ab", "", "io", 4))
                .unwrap();
        assert_eq!(model.domain_at(0).as_deref(), Some("aa.io"));
        assert_eq!(model.domain_at(1).as_deref(), Some("ab.io"));
        assert_eq!(model.domain_at(2).as_deref(), Some("ba.io"));
        assert_eq!(model.domain_at(3).as_deref(), Some("bb.io"));
    }

    #[test]
    fn duplicate_charset_entries_collapse() {
        let model =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 1, "aab", "x", "com", 4))
                .unwrap();
        assert_eq!(model.total_combinations(), 2);
    }

    #[test]
    fn huge_spaces_saturate_instead_of_overflowing() {
        let model = GeneratorModel::from_params(&params(
            PatternKind::Prefix,
            40,
            "abcdefghijklmnopqrstuvwxyz",
            "",
            "com",
            10,
        ))
        .unwrap();
        assert_eq!(model.total_combinations(), i64::MAX);
        assert!(model.domain_at(1_000_000).is_some());
    }

    #[test]
    fn config_hash_is_stable_and_parameter_sensitive() {
        let a =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 2, "ab", "x", "com", 4))
                .unwrap();
        let b =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 2, "ab", "x", "com", 900))
                .unwrap();
        // Target count is not part of the tuple; identical configs share it.
        assert_eq!(a.config_hash(), b.config_hash());

        let c =
            GeneratorModel::from_params(&params(PatternKind::Suffix, 2, "ab", "x", "com", 4))
                .unwrap();
        assert_ne!(a.config_hash(), c.config_hash());

        let d =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 2, "ab", "x", "net", 4))
                .unwrap();
        assert_ne!(a.config_hash(), d.config_hash());
    }

    #[test]
    fn tld_dot_prefix_is_normalized() {
        let with_dot =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 1, "a", "x", ".com", 1))
                .unwrap();
        let without =
            GeneratorModel::from_params(&params(PatternKind::Prefix, 1, "a", "x", "com", 1))
                .unwrap();
        assert_eq!(with_dot.domain_at(0), without.domain_at(0));
        assert_eq!(with_dot.config_hash(), without.config_hash());
    }
}
