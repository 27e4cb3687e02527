use std::collections::HashMap;

use sqlx::PgExecutor;
use uuid::Uuid;

use domainflow_api::persona::{Persona, PersonaKind};

use crate::error::{Error, Result};

pub async fn get_many<'e>(ex: impl PgExecutor<'e>, ids: &[Uuid]) -> Result<Vec<Persona>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, Persona>("SELECT * FROM personas WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(ex)
        .await?;
    Ok(rows)
}

/// Resolve persona ids for campaign use: every referenced persona must
/// exist, be enabled, and carry the expected kind. Order of `ids` is
/// preserved in the returned list (it drives rotation order).
pub async fn resolve<'e>(
    ex: impl PgExecutor<'e>,
    ids: &[Uuid],
    kind: PersonaKind,
) -> Result<Vec<Persona>> {
    let fetched = get_many(ex, ids).await?;
    let mut by_id: HashMap<Uuid, Persona> =
        fetched.into_iter().map(|p| (p.id, p)).collect();

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let p = by_id
            .remove(id)
            .ok_or_else(|| Error::InvalidRequest(format!("persona {id} does not exist")))?;
        if p.kind != kind {
            return Err(Error::InvalidRequest(format!(
                "persona {id} has kind {:?}, expected {:?}",
                p.kind, kind
            )));
        }
        if !p.is_enabled {
            return Err(Error::InvalidRequest(format!("persona {id} is disabled")));
        }
        out.push(p);
    }
    Ok(out)
}

/// Same checks, but mid-processing: configuration that was valid at
/// creation and rotted since is a terminal condition, not a bad request.
pub async fn resolve_for_processing<'e>(
    ex: impl PgExecutor<'e>,
    ids: &[Uuid],
    kind: PersonaKind,
) -> Result<Vec<Persona>> {
    let fetched = get_many(ex, ids).await?;
    let usable: Vec<Persona> = fetched
        .into_iter()
        .filter(|p| p.kind == kind && p.is_enabled)
        .collect();
    if usable.is_empty() {
        return Err(Error::Terminal(format!(
            "no enabled {kind:?} personas remain among the configured set"
        )));
    }
    // Preserve configured order for rotation stability.
    let mut by_id: HashMap<Uuid, Persona> = usable.into_iter().map(|p| (p.id, p)).collect();
    let mut out = Vec::new();
    for id in ids {
        if let Some(p) = by_id.remove(id) {
            out.push(p);
        }
    }
    Ok(out)
}
