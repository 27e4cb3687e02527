use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "proxy_protocol", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    pub fn scheme(self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "proxy_selection_strategy", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProxySelectionStrategy {
    #[default]
    RoundRobin,
    Random,
    StickyPerPersona,
}

/// An outbound proxy. Credentials are stored encrypted; `password_enc`
/// never leaves the store in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proxy {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub protocol: ProxyProtocol,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password_enc: Option<String>,
    pub is_enabled: bool,
    pub is_healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proxy {
    /// Proxy URL for client configuration, credentials included when present.
    pub fn url(&self) -> String {
        match (&self.username, &self.password_enc) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}", self.protocol.scheme(), user, pass, self.address)
            }
            (Some(user), None) => format!("{}://{}@{}", self.protocol.scheme(), user, self.address),
            _ => format!("{}://{}", self.protocol.scheme(), self.address),
        }
    }
}
