use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::limits::ValidationError;

/// Persona kind. Lowercase at the storage boundary and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "persona_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PersonaKind {
    Dns,
    Http,
}

/// A named, reusable resolver or HTTP-client configuration bundle. The
/// config blob is opaque at this level; [`Persona::dns_config`] and
/// [`Persona::http_config`] give the typed views and validate shape.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    pub kind: PersonaKind,
    pub is_enabled: bool,
    pub config_details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsPersonaConfig {
    pub resolvers: Vec<String>,
    pub use_system_resolvers: bool,
    pub query_timeout_seconds: u64,
    pub max_domains_per_request: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpPersonaConfig {
    pub user_agent: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub request_timeout_seconds: u64,
}

impl Persona {
    pub fn dns_config(&self) -> Result<DnsPersonaConfig, ValidationError> {
        if self.kind != PersonaKind::Dns {
            return Err(ValidationError::Invalid {
                field: "persona",
                reason: format!("persona {} is not a dns persona", self.id),
            });
        }
        let cfg: DnsPersonaConfig =
            serde_json::from_value(self.config_details.clone()).map_err(|e| {
                ValidationError::Invalid { field: "config_details", reason: e.to_string() }
            })?;
        if !cfg.use_system_resolvers && cfg.resolvers.is_empty() {
            return Err(ValidationError::Empty { field: "resolvers" });
        }
        Ok(cfg)
    }

    pub fn http_config(&self) -> Result<HttpPersonaConfig, ValidationError> {
        if self.kind != PersonaKind::Http {
            return Err(ValidationError::Invalid {
                field: "persona",
                reason: format!("persona {} is not an http persona", self.id),
            });
        }
        let cfg: HttpPersonaConfig =
            serde_json::from_value(self.config_details.clone()).map_err(|e| {
                ValidationError::Invalid { field: "config_details", reason: e.to_string() }
            })?;
        if cfg.user_agent.trim().is_empty() {
            return Err(ValidationError::Empty { field: "userAgent" });
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn persona(kind: PersonaKind, config: serde_json::Value) -> Persona {
        Persona {
            id: Uuid::new_v4(),
            name: "p".into(),
            kind,
            is_enabled: true,
            config_details: config,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dns_config_requires_resolvers_unless_system() {
        let p = persona(
            PersonaKind::Dns,
            json!({
                "resolvers": [],
                "useSystemResolvers": false,
                "queryTimeoutSeconds": 5,
                "maxDomainsPerRequest": 100
            }),
        );
        assert!(p.dns_config().is_err());

        let p = persona(
            PersonaKind::Dns,
            json!({
                "resolvers": [],
                "useSystemResolvers": true,
                "queryTimeoutSeconds": 5,
                "maxDomainsPerRequest": 100
            }),
        );
        assert!(p.dns_config().is_ok());
    }

    #[test]
    fn http_config_requires_user_agent() {
        let p = persona(
            PersonaKind::Http,
            json!({"userAgent": " ", "headers": {}, "requestTimeoutSeconds": 30}),
        );
        assert!(p.http_config().is_err());

        let p = persona(
            PersonaKind::Http,
            json!({"userAgent": "domainflow/0.1", "requestTimeoutSeconds": 30}),
        );
        let cfg = p.http_config().unwrap();
        assert_eq!(cfg.request_timeout_seconds, 30);
        assert!(cfg.headers.is_empty());
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let p = persona(PersonaKind::Http, json!({}));
        assert!(p.dns_config().is_err());
    }
}
