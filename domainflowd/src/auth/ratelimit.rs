//! Windowed rate limiting backed by one row per (identifier, action). The
//! whole operation reads the clock exactly once, so the window-reset branch
//! cannot race itself across the boundary.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Blocked { until: DateTime<Utc> },
}

#[derive(Debug, sqlx::FromRow)]
struct LimitRow {
    count: i32,
    blocked_until: Option<DateTime<Utc>>,
}

/// Pure admission decision over the post-increment row state.
pub(crate) fn decide(
    count: i32,
    blocked_until: Option<DateTime<Utc>>,
    limit: u32,
    block: ChronoDuration,
    now: DateTime<Utc>,
) -> RateDecision {
    if let Some(until) = blocked_until {
        if until > now {
            return RateDecision::Blocked { until };
        }
    }
    if count > limit as i32 {
        return RateDecision::Blocked { until: now + block };
    }
    RateDecision::Allowed
}

/// Record one attempt and decide. The counter resets when the stored window
/// opened a full window before `now`; exceeding the limit installs a block.
pub async fn check_and_increment(
    pool: &PgPool,
    identifier: &str,
    action: &str,
    limit: u32,
    window: std::time::Duration,
    block: std::time::Duration,
) -> Result<RateDecision> {
    let now = Utc::now();
    let window_secs = window.as_secs().max(1) as i64;
    let block = ChronoDuration::from_std(block).unwrap_or_else(|_| ChronoDuration::minutes(15));

    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, LimitRow>(
        "INSERT INTO auth.rate_limits (identifier, action, window_started_at, count)
         VALUES ($1, $2, $3, 1)
         ON CONFLICT (identifier, action) DO UPDATE SET
             count = CASE
                 WHEN auth.rate_limits.window_started_at <= $3 - ($4 || ' seconds')::INTERVAL
                 THEN 1 ELSE auth.rate_limits.count + 1 END,
             window_started_at = CASE
                 WHEN auth.rate_limits.window_started_at <= $3 - ($4 || ' seconds')::INTERVAL
                 THEN $3 ELSE auth.rate_limits.window_started_at END
         RETURNING count, blocked_until",
    )
    .bind(identifier)
    .bind(action)
    .bind(now)
    .bind(window_secs.to_string())
    .fetch_one(&mut *tx)
    .await?;

    let decision = decide(row.count, row.blocked_until, limit, block, now);
    if let RateDecision::Blocked { until } = decision {
        sqlx::query(
            "UPDATE auth.rate_limits SET blocked_until = $3
              WHERE identifier = $1 AND action = $2",
        )
        .bind(identifier)
        .bind(action)
        .bind(until)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_the_limit_is_allowed() {
        let now = Utc::now();
        assert_eq!(
            decide(10, None, 10, ChronoDuration::minutes(15), now),
            RateDecision::Allowed
        );
    }

    #[test]
    fn exceeding_the_limit_installs_a_block() {
        let now = Utc::now();
        match decide(11, None, 10, ChronoDuration::minutes(15), now) {
            RateDecision::Blocked { until } => {
                assert_eq!(until, now + ChronoDuration::minutes(15));
            }
            other => panic!("expected a block, got {other:?}"),
        }
    }

    #[test]
    fn standing_block_wins_until_it_lapses() {
        let now = Utc::now();
        let until = now + ChronoDuration::minutes(5);
        assert_eq!(
            decide(1, Some(until), 10, ChronoDuration::minutes(15), now),
            RateDecision::Blocked { until }
        );
        // A lapsed block no longer binds.
        let lapsed = now - ChronoDuration::minutes(1);
        assert_eq!(
            decide(1, Some(lapsed), 10, ChronoDuration::minutes(15), now),
            RateDecision::Allowed
        );
    }
}
