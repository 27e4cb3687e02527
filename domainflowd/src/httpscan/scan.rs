//! Keyword scanning over fetched bodies. Rules compile once per batch;
//! string rules become escaped regexes so case folding and context capture
//! work identically for both kinds.

use regex::{Regex, RegexBuilder};

use domainflow_api::keyword::{KeywordHit, KeywordRule, KeywordRuleKind};

use crate::error::{Error, Result};
use crate::store::keywords::LoadedKeywordSet;

const MAX_CONTEXTS_PER_RULE: usize = 5;

struct CompiledRule {
    rule: KeywordRule,
    regex: Regex,
}

pub struct CompiledKeywords {
    rules: Vec<CompiledRule>,
    ad_hoc: Vec<(String, Regex)>,
}

#[derive(Debug, Default, Clone)]
pub struct ScanOutcome {
    pub set_hits: Vec<KeywordHit>,
    pub ad_hoc_hits: Vec<String>,
}

impl ScanOutcome {
    pub fn any_hit(&self) -> bool {
        !self.set_hits.is_empty() || !self.ad_hoc_hits.is_empty()
    }
}

/// Compile the campaign's keyword rules. A rule that stopped compiling is a
/// terminal condition: the campaign cannot produce honest verdicts with a
/// broken rule set.
pub fn compile(sets: &[LoadedKeywordSet], ad_hoc: &[String]) -> Result<CompiledKeywords> {
    let mut rules = Vec::new();
    for set in sets {
        for rule in &set.rules {
            let pattern = match rule.kind {
                KeywordRuleKind::String => regex::escape(&rule.pattern),
                KeywordRuleKind::Regex => rule.pattern.clone(),
            };
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
                .map_err(|e| {
                    Error::Terminal(format!("keyword rule {} failed to compile: {e}", rule.id))
                })?;
            rules.push(CompiledRule { rule: rule.clone(), regex });
        }
    }

    let mut compiled_ad_hoc = Vec::with_capacity(ad_hoc.len());
    for keyword in ad_hoc {
        let regex = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Terminal(format!("ad-hoc keyword {keyword:?}: {e}")))?;
        compiled_ad_hoc.push((keyword.clone(), regex));
    }

    Ok(CompiledKeywords { rules, ad_hoc: compiled_ad_hoc })
}

impl CompiledKeywords {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.ad_hoc.is_empty()
    }

    pub fn scan(&self, body: &str) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for compiled in &self.rules {
            let mut contexts = Vec::new();
            for m in compiled.regex.find_iter(body).take(MAX_CONTEXTS_PER_RULE) {
                contexts.push(context_window(
                    body,
                    m.start(),
                    m.end(),
                    compiled.rule.context_chars.max(0) as usize,
                ));
            }
            if !contexts.is_empty() {
                outcome.set_hits.push(KeywordHit {
                    keyword_set_id: compiled.rule.keyword_set_id,
                    rule_id: compiled.rule.id,
                    pattern: compiled.rule.pattern.clone(),
                    category: compiled.rule.category.clone(),
                    contexts,
                });
            }
        }

        for (keyword, regex) in &self.ad_hoc {
            if regex.is_match(body) {
                outcome.ad_hoc_hits.push(keyword.clone());
            }
        }

        outcome
    }
}

/// Slice `budget` characters of context around a match, clamped to char
/// boundaries.
fn context_window(body: &str, start: usize, end: usize, budget: usize) -> String {
    let mut lo = start.saturating_sub(budget);
    while lo > 0 && !body.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + budget).min(body.len());
    while hi < body.len() && !body.is_char_boundary(hi) {
        hi += 1;
    }
    body[lo..hi].to_string()
}

/// Adapted page-title extraction; tolerant of attribute-bearing tags and
/// case.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let after_tag = &lower[start..];
    let gt = after_tag.find('>')?;
    let content_start = start + gt + 1;
    let after_start = &lower[content_start..];
    let end_rel = after_start.find("</title>")?;
    let content_end = content_start + end_rel;
    let slice = html.get(content_start..content_end)?;
    let collapsed = slice.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Leading slice of the body for the result row, on a char boundary.
pub fn snippet(body: &str, max_chars: usize) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rule(kind: KeywordRuleKind, pattern: &str, case_sensitive: bool, ctx: i32) -> KeywordRule {
        KeywordRule {
            id: Uuid::new_v4(),
            keyword_set_id: Uuid::new_v4(),
            kind,
            pattern: pattern.into(),
            case_sensitive,
            category: Some("test".into()),
            context_chars: ctx,
        }
    }

    fn set_of(rules: Vec<KeywordRule>) -> LoadedKeywordSet {
        LoadedKeywordSet {
            set: domainflow_api::keyword::KeywordSet {
                id: rules.first().map(|r| r.keyword_set_id).unwrap_or_else(Uuid::new_v4),
                name: "s".into(),
                is_enabled: true,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            rules,
        }
    }

    #[test]
    fn string_rule_matches_case_insensitively_by_default() {
        let sets = vec![set_of(vec![rule(KeywordRuleKind::String, "welcome", false, 0)])];
        let compiled = compile(&sets, &[]).unwrap();
        assert!(compiled.scan("<h1>WELCOME home</h1>").any_hit());
        assert!(!compiled.scan("<h1>goodbye</h1>").any_hit());
    }

    #[test]
    fn case_sensitive_rule_respects_case() {
        let sets = vec![set_of(vec![rule(KeywordRuleKind::String, "Login", true, 0)])];
        let compiled = compile(&sets, &[]).unwrap();
        assert!(compiled.scan("Login page").any_hit());
        assert!(!compiled.scan("login page").any_hit());
    }

    #[test]
    fn regex_rule_matches_and_bad_regex_is_terminal() {
        let sets = vec![set_of(vec![rule(KeywordRuleKind::Regex, r"admin\s+panel", false, 0)])];
        let compiled = compile(&sets, &[]).unwrap();
        assert!(compiled.scan("ADMIN    panel").any_hit());

        let bad = vec![set_of(vec![rule(KeywordRuleKind::Regex, r"(unclosed", false, 0)])];
        assert!(matches!(compile(&bad, &[]), Err(Error::Terminal(_))));
    }

    #[test]
    fn context_windows_surround_each_hit() {
        let sets = vec![set_of(vec![rule(KeywordRuleKind::String, "pin", false, 4)])];
        let compiled = compile(&sets, &[]).unwrap();
        let outcome = compiled.scan("xxxx pin yyyy");
        assert_eq!(outcome.set_hits.len(), 1);
        assert_eq!(outcome.set_hits[0].contexts, vec!["xxx pin yyy".to_string()]);
    }

    #[test]
    fn context_clamps_to_char_boundaries() {
        let sets = vec![set_of(vec![rule(KeywordRuleKind::String, "pin", false, 1)])];
        let compiled = compile(&sets, &[]).unwrap();
        // Multi-byte neighbors must not split.
        let outcome = compiled.scan("é pin é");
        assert_eq!(outcome.set_hits.len(), 1);
    }

    #[test]
    fn ad_hoc_keywords_are_string_matched() {
        let compiled = compile(&[], &["Welcome".to_string()]).unwrap();
        let outcome = compiled.scan("welcome aboard");
        assert_eq!(outcome.ad_hoc_hits, vec!["Welcome".to_string()]);
        assert!(outcome.any_hit());
    }

    #[test]
    fn title_extraction_tolerates_attributes_and_whitespace() {
        assert_eq!(
            extract_title("<html><TITLE class=\"x\">  My   Site </TITLE></html>").as_deref(),
            Some("My Site")
        );
        assert_eq!(extract_title("<html><body>no title</body></html>"), None);
    }
}
