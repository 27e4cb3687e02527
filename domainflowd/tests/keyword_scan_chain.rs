//! The HTTP stage's verdict pipeline over scripted fetch outcomes: 10
//! domains, 7 serving a 200 with the keyword, 2 serving 404, 1 refusing
//! connections.

use chrono::Utc;
use uuid::Uuid;

use domainflow_api::keyword::{KeywordRule, KeywordRuleKind, KeywordSet};
use domainflow_api::results::HttpResultStatus;
use domainflowd::httpscan::{classify, compile, FetchError, FetchResponse};
use domainflowd::store::keywords::LoadedKeywordSet;

fn welcome_set() -> LoadedKeywordSet {
    let set_id = Uuid::new_v4();
    LoadedKeywordSet {
        set: KeywordSet {
            id: set_id,
            name: "landing-pages".into(),
            is_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        rules: vec![KeywordRule {
            id: Uuid::new_v4(),
            keyword_set_id: set_id,
            kind: KeywordRuleKind::String,
            pattern: "welcome".into(),
            case_sensitive: false,
            category: Some("greeting".into()),
            context_chars: 16,
        }],
    }
}

fn ok(status: u16, body: &str) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse { status, headers: vec![("content-type".into(), "text/html".into())], body: body.into() })
}

#[test]
fn mixed_fleet_classifies_seven_two_one() {
    let keywords = compile(&[welcome_set()], &[]).unwrap();

    let outcomes: Vec<Result<FetchResponse, FetchError>> = (0..10)
        .map(|i| match i {
            0..=6 => ok(200, "<html><body>Welcome to our store</body></html>"),
            7 | 8 => ok(404, "<html>not found</html>"),
            _ => Err(FetchError::ConnectionRefused),
        })
        .collect();

    let mut tally = std::collections::HashMap::new();
    for outcome in &outcomes {
        let any_hit = match outcome {
            Ok(resp) => keywords.scan(&resp.body).any_hit(),
            Err(_) => false,
        };
        *tally.entry(classify(outcome, any_hit)).or_insert(0u32) += 1;
    }

    assert_eq!(tally.get(&HttpResultStatus::Success), Some(&7));
    assert_eq!(tally.get(&HttpResultStatus::ContentMismatch), Some(&2));
    assert_eq!(tally.get(&HttpResultStatus::Unreachable), Some(&1));
    // Counters follow: processed=10, successful=7, failed=3.
    let successful: u32 = tally
        .iter()
        .filter(|(s, _)| s.is_success())
        .map(|(_, n)| *n)
        .sum();
    assert_eq!(successful, 7);
}

#[test]
fn two_xx_without_keyword_is_keywords_not_found_not_mismatch() {
    let keywords = compile(&[welcome_set()], &[]).unwrap();
    let outcome = ok(200, "<html>nothing of interest</html>");
    let any_hit = keywords.scan(&outcome.as_ref().unwrap().body).any_hit();
    assert_eq!(classify(&outcome, any_hit), HttpResultStatus::KeywordsNotFound);
}

#[test]
fn set_hits_carry_attribution_and_context() {
    let set = welcome_set();
    let set_id = set.set.id;
    let keywords = compile(&[set], &["Store".to_string()]).unwrap();

    let scanned = keywords.scan("<h1>WELCOME</h1> to the store front");
    assert_eq!(scanned.set_hits.len(), 1);
    assert_eq!(scanned.set_hits[0].keyword_set_id, set_id);
    assert_eq!(scanned.set_hits[0].category.as_deref(), Some("greeting"));
    assert!(!scanned.set_hits[0].contexts.is_empty());
    assert_eq!(scanned.ad_hoc_hits, vec!["Store".to_string()]);
}
