use super::user::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
}

/// Record of one login. Sessions are soft-revoked and only removed by
/// retention pruning or when the owning user is deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Session {
    pub username: String,
    pub token: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(username: &str, token: String) -> Self {
        Self {
            username: username.to_string(),
            token,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            revoked_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Marks the session inactive. Returns false if it already was.
    pub fn revoke(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Inactive;
        self.revoked_at = Some(at);
        true
    }

    pub fn revoked_before(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(self.revoked_at, Some(at) if !self.is_active() && at < cutoff)
    }
}

/// What a validated token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

/// Claims a token issuer vouches for after checking signature and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_revoke_once() {
        let mut session = Session::new("alice", "t1".to_string());
        assert!(session.is_active());

        let now = Utc::now();
        assert!(session.revoke(now));
        assert_eq!(session.status, SessionStatus::Inactive);
        assert_eq!(session.revoked_at, Some(now));

        assert!(!session.revoke(now + Duration::seconds(5)));
        assert_eq!(session.revoked_at, Some(now));
    }

    #[test]
    fn test_revoked_before() {
        let mut session = Session::new("alice", "t1".to_string());
        let now = Utc::now();
        assert!(!session.revoked_before(now));

        session.revoke(now - Duration::days(100));
        assert!(session.revoked_before(now - Duration::days(90)));
        assert!(!session.revoked_before(now - Duration::days(120)));
    }
}
