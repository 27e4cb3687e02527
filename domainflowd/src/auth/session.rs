use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;

use super::store::{Session, User};

/// 64 bytes of OS randomness, hex-encoded: the 128-char opaque session id.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Client fingerprint bound to a session when enforcement is on.
pub fn fingerprint(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.unwrap_or_default().as_bytes());
    hasher.update([0]);
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn new_session(
    cfg: &AuthConfig,
    user_id: uuid::Uuid,
    ip: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> Session {
    Session {
        id: generate_session_id(),
        user_id,
        ip_address: ip.map(str::to_string),
        user_agent: user_agent.map(str::to_string),
        fingerprint: Some(fingerprint(ip, user_agent)),
        is_active: true,
        created_at: now,
        last_activity_at: now,
        expires_at: now
            + ChronoDuration::from_std(cfg.session_max_lifetime).unwrap_or_else(|_| ChronoDuration::zero()),
    }
}

/// Why a presented session is not acceptable. Kept as data so the caller
/// can grade audit risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    Inactive,
    Expired,
    IdleTimedOut,
    UserInactive,
    UserLocked,
    FingerprintMismatch,
}

impl SessionRejection {
    pub fn reason(self) -> &'static str {
        match self {
            SessionRejection::Inactive => "session is inactive",
            SessionRejection::Expired => "session expired",
            SessionRejection::IdleTimedOut => "session idle timeout",
            SessionRejection::UserInactive => "user is inactive",
            SessionRejection::UserLocked => "user is locked",
            SessionRejection::FingerprintMismatch => "fingerprint mismatch",
        }
    }

    /// A mismatched fingerprint on a live session smells like theft; grade
    /// it well above routine expiry.
    pub fn risk_score(self) -> i32 {
        match self {
            SessionRejection::FingerprintMismatch => 80,
            SessionRejection::UserLocked => 60,
            SessionRejection::Inactive | SessionRejection::UserInactive => 30,
            SessionRejection::Expired | SessionRejection::IdleTimedOut => 10,
        }
    }
}

/// Pure admission decision over the loaded session + user rows.
pub fn evaluate_session(
    cfg: &AuthConfig,
    session: &Session,
    user: &User,
    presented_fingerprint: &str,
    now: DateTime<Utc>,
) -> Result<(), SessionRejection> {
    if !session.is_active {
        return Err(SessionRejection::Inactive);
    }
    if session.expires_at <= now {
        return Err(SessionRejection::Expired);
    }
    let idle_deadline = session.last_activity_at
        + ChronoDuration::from_std(cfg.session_idle_timeout).unwrap_or_else(|_| ChronoDuration::zero());
    if idle_deadline <= now {
        return Err(SessionRejection::IdleTimedOut);
    }
    if !user.is_active {
        return Err(SessionRejection::UserInactive);
    }
    if user.is_locked {
        return Err(SessionRejection::UserLocked);
    }
    if cfg.enforce_fingerprint {
        match &session.fingerprint {
            Some(stored) if stored == presented_fingerprint => {}
            _ => return Err(SessionRejection::FingerprintMismatch),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: None,
            password_hash: String::new(),
            is_active: true,
            is_locked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn base_session(cfg: &AuthConfig, now: DateTime<Utc>) -> Session {
        new_session(cfg, Uuid::new_v4(), Some("10.0.0.1"), Some("ua/1"), now)
    }

    #[test]
    fn session_ids_are_128_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 128);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn fresh_session_is_accepted() {
        let cfg = AuthConfig::default();
        let now = Utc::now();
        let s = base_session(&cfg, now);
        let fp = fingerprint(Some("10.0.0.1"), Some("ua/1"));
        assert!(evaluate_session(&cfg, &s, &user(), &fp, now).is_ok());
    }

    #[test]
    fn idle_timeout_fires_before_hard_expiry() {
        let cfg = AuthConfig::default();
        let now = Utc::now();
        let s = base_session(&cfg, now);
        let fp = fingerprint(Some("10.0.0.1"), Some("ua/1"));

        let after_idle = now + ChronoDuration::minutes(31);
        assert_eq!(
            evaluate_session(&cfg, &s, &user(), &fp, after_idle),
            Err(SessionRejection::IdleTimedOut)
        );

        // Activity keeps it alive past the idle window but not the hard cap.
        let mut touched = s.clone();
        touched.last_activity_at = now + ChronoDuration::minutes(100);
        let after_hard = now + ChronoDuration::minutes(121);
        assert_eq!(
            evaluate_session(&cfg, &touched, &user(), &fp, after_hard),
            Err(SessionRejection::Expired)
        );
    }

    #[test]
    fn locked_or_inactive_users_are_rejected() {
        let cfg = AuthConfig::default();
        let now = Utc::now();
        let s = base_session(&cfg, now);
        let fp = fingerprint(Some("10.0.0.1"), Some("ua/1"));

        let mut locked = user();
        locked.is_locked = true;
        assert_eq!(
            evaluate_session(&cfg, &s, &locked, &fp, now),
            Err(SessionRejection::UserLocked)
        );

        let mut inactive = user();
        inactive.is_active = false;
        assert_eq!(
            evaluate_session(&cfg, &s, &inactive, &fp, now),
            Err(SessionRejection::UserInactive)
        );
    }

    #[test]
    fn fingerprint_enforcement_rejects_moved_sessions() {
        let mut cfg = AuthConfig::default();
        cfg.enforce_fingerprint = true;
        let now = Utc::now();
        let s = base_session(&cfg, now);

        let same = fingerprint(Some("10.0.0.1"), Some("ua/1"));
        assert!(evaluate_session(&cfg, &s, &user(), &same, now).is_ok());

        let moved = fingerprint(Some("172.16.0.9"), Some("ua/1"));
        assert_eq!(
            evaluate_session(&cfg, &s, &user(), &moved, now),
            Err(SessionRejection::FingerprintMismatch)
        );
    }
}
