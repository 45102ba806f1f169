use crate::domain::ports::{CredentialHasherRef, SessionStoreRef, TokenIssuerRef, UserStoreRef};
use crate::domain::session::{Identity, Session};
use crate::error::{AuthFailure, Result, VendingError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Login state per user: `NoSession -> Active -> Inactive`, with at most one
/// active session at a time.
#[derive(Clone)]
pub struct SessionManager {
    users: UserStoreRef,
    sessions: SessionStoreRef,
    hasher: CredentialHasherRef,
    issuer: TokenIssuerRef,
    retention: Option<Duration>,
}

impl SessionManager {
    pub fn new(
        users: UserStoreRef,
        sessions: SessionStoreRef,
        hasher: CredentialHasherRef,
        issuer: TokenIssuerRef,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            issuer,
            retention: None,
        }
    }

    /// How long inactive sessions are kept before [`Self::prune_inactive`]
    /// drops them. `None` keeps them forever.
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Checks the password and opens the user's single active session.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let Some(user) = self.users.get(username).await? else {
            warn!(username, "login rejected: unknown user");
            return Err(AuthFailure::InvalidCredentials.into());
        };

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| VendingError::storage(format!("password check task failed: {e}")))?;
        if !verified {
            warn!(username, "login rejected: bad password");
            return Err(AuthFailure::InvalidCredentials.into());
        }

        if self.sessions.find_active(&user.username).await?.is_some() {
            return Err(VendingError::SessionConflict(user.username));
        }

        let token = self.issuer.issue(&user.username)?;
        let session = Session::new(&user.username, token.clone());
        if !self.sessions.insert_if_none_active(session).await? {
            return Err(VendingError::SessionConflict(user.username));
        }

        info!(username = %user.username, "user logged in");
        Ok(token)
    }

    /// Deactivates the user's sessions. Returns how many were active.
    pub async fn logout(&self, username: &str) -> Result<usize> {
        let revoked = self.sessions.deactivate_all(username, Utc::now()).await?;
        info!(username, revoked, "user logged out");
        Ok(revoked)
    }

    /// Same as [`Self::logout`]; kept as its own entry point for callers that
    /// mean "every device".
    pub async fn logout_all(&self, username: &str) -> Result<usize> {
        self.logout(username).await
    }

    /// Resolves a bearer token to the identity behind it.
    ///
    /// The token must verify, must be the token of the user's current active
    /// session, and the user must still exist.
    pub async fn validate(&self, token: &str) -> Result<Identity> {
        let claims = self.issuer.verify(token)?;

        let active = self.sessions.find_active(&claims.username).await?;
        if !matches!(&active, Some(session) if session.token == token) {
            debug!(username = %claims.username, "token does not match an active session");
            return Err(AuthFailure::RevokedSession.into());
        }

        let user = self
            .users
            .get(&claims.username)
            .await?
            .ok_or(AuthFailure::RevokedSession)?;

        Ok(Identity {
            username: user.username,
            role: user.role,
        })
    }

    pub async fn history(&self, username: &str) -> Result<Vec<Session>> {
        self.sessions.sessions_for(username).await
    }

    /// Drops inactive sessions revoked longer ago than the retention window.
    pub async fn prune_inactive(&self) -> Result<usize> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let pruned = self.sessions.prune_inactive(Utc::now() - retention).await?;
        if pruned > 0 {
            info!(pruned, "pruned inactive sessions");
        }
        Ok(pruned)
    }
}
