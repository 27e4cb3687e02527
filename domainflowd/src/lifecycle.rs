//! Campaign status state machine: a pure transition predicate plus a hook
//! bus. Transitions are serialized per campaign by the row lock taken in
//! [`Lifecycle::transition`]; post-hooks run only after the surrounding
//! transaction has committed.

use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use domainflow_api::campaign::{Campaign, CampaignStatus};

use crate::error::{Error, Result};
use crate::store;

use CampaignStatus::*;

/// The full legal edge set. Everything else is `InvalidState`.
pub fn allowed(from: CampaignStatus, to: CampaignStatus) -> bool {
    matches!(
        (from, to),
        (Pending, Queued)
            | (Pending, Cancelled)
            | (Queued, Running)
            | (Queued, Paused)
            | (Queued, Cancelled)
            | (Running, Paused)
            | (Running, Completed)
            | (Running, Failed)
            | (Paused, Running)
            | (Paused, Cancelled)
            | (Completed, Archived)
            | (Failed, Queued)
            | (Failed, Archived)
    )
}

pub fn validate(from: CampaignStatus, to: CampaignStatus) -> Result<()> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "illegal campaign transition {} -> {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

/// Pre-hooks may veto by returning an error; post-hooks are best-effort and
/// run after the transition has committed.
pub trait TransitionHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn before(&self, _campaign: &Campaign, _to: CampaignStatus) -> Result<()> {
        Ok(())
    }

    fn after(&self, _campaign: &Campaign, _to: CampaignStatus) {}
}

#[derive(Default, Clone)]
pub struct Lifecycle {
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn TransitionHook>) {
        self.hooks.push(hook);
    }

    /// Row-locked transition step for use inside a caller-owned
    /// transaction. Validates the edge against the locked row, runs
    /// pre-hooks, writes the new status. The caller commits and then fires
    /// [`Lifecycle::after_commit`].
    pub async fn transition(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        to: CampaignStatus,
        error_message: Option<&str>,
    ) -> Result<Campaign> {
        let current = store::campaigns::get_for_update(conn, id).await?;
        validate(current.status, to)?;
        for hook in &self.hooks {
            hook.before(&current, to)?;
        }
        store::campaigns::set_status(&mut *conn, id, to, error_message).await
    }

    /// Convenience wrapper owning the whole commit cycle.
    pub async fn transition_tx(
        &self,
        pool: &PgPool,
        id: Uuid,
        to: CampaignStatus,
        error_message: Option<&str>,
    ) -> Result<Campaign> {
        let mut tx = pool.begin().await?;
        let updated = self.transition(&mut tx, id, to, error_message).await?;
        tx.commit().await?;
        self.after_commit(&updated, to);
        Ok(updated)
    }

    pub fn after_commit(&self, campaign: &Campaign, to: CampaignStatus) {
        for hook in &self.hooks {
            hook.after(campaign, to);
        }
    }
}

/// Logs every committed transition. Registered by default in the daemon.
pub struct LogTransitions;

impl TransitionHook for LogTransitions {
    fn name(&self) -> &'static str {
        "log-transitions"
    }

    fn after(&self, campaign: &Campaign, to: CampaignStatus) {
        tracing::info!(
            target = "domainflow_lifecycle",
            campaign = %campaign.id,
            status = to.as_str(),
            "campaign transitioned"
        );
    }
}

/// Appends an audit row per committed transition. Post-hooks run off the
/// transaction, so the write is fire-and-forget with a logged failure.
pub struct AuditTransitions {
    pool: PgPool,
}

impl AuditTransitions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TransitionHook for AuditTransitions {
    fn name(&self) -> &'static str {
        "audit-transitions"
    }

    fn after(&self, campaign: &Campaign, to: CampaignStatus) {
        let pool = self.pool.clone();
        let user_id = campaign.user_id;
        let campaign_id = campaign.id;
        let status = to.as_str();
        tokio::spawn(async move {
            let resource = campaign_id.to_string();
            let entry = store::audit::AuditEntry {
                user_id,
                session_id: None,
                action: "campaign.transition",
                resource: Some(&resource),
                detail: Some(serde_json::json!({ "status": status })),
                risk_score: 0,
            };
            if let Err(e) = store::audit::append(&pool, &entry).await {
                tracing::warn!(
                    target = "domainflow_lifecycle",
                    campaign = %campaign_id,
                    "transition audit append failed: {e}"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CampaignStatus; 8] =
        [Pending, Queued, Running, Paused, Completed, Failed, Archived, Cancelled];

    #[test]
    fn transition_table_is_exact() {
        let legal = [
            (Pending, Queued),
            (Pending, Cancelled),
            (Queued, Running),
            (Queued, Paused),
            (Queued, Cancelled),
            (Running, Paused),
            (Running, Completed),
            (Running, Failed),
            (Paused, Running),
            (Paused, Cancelled),
            (Completed, Archived),
            (Failed, Queued),
            (Failed, Archived),
        ];
        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    allowed(from, to),
                    expected,
                    "edge {from:?} -> {to:?} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn pending_cannot_jump_to_running() {
        let err = validate(Pending, Running).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!allowed(Archived, to));
            assert!(!allowed(Cancelled, to));
        }
    }

    #[test]
    fn archived_is_only_reachable_from_completed_or_failed() {
        for from in ALL {
            let expected = matches!(from, Completed | Failed);
            assert_eq!(allowed(from, Archived), expected);
        }
    }
}
