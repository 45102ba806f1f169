use super::MAX_WRITE_ATTEMPTS;
use crate::domain::coin::CoinLedger;
use crate::domain::ports::{CredentialHasherRef, SessionStoreRef, UserStoreRef};
use crate::domain::user::{Role, User};
use crate::error::{Result, VendingError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns users and their wallets.
///
/// Every balance change goes through [`Accounts::update`], which re-reads the
/// user, applies the domain rule and swaps the result in only if nobody else
/// wrote in between.
#[derive(Clone)]
pub struct Accounts {
    users: UserStoreRef,
    sessions: SessionStoreRef,
    hasher: CredentialHasherRef,
    ledger: Arc<CoinLedger>,
}

impl Accounts {
    pub fn new(
        users: UserStoreRef,
        sessions: SessionStoreRef,
        hasher: CredentialHasherRef,
        ledger: Arc<CoinLedger>,
    ) -> Self {
        Self {
            users,
            sessions,
            hasher,
            ledger,
        }
    }

    pub fn ledger(&self) -> &CoinLedger {
        &self.ledger
    }

    /// Registers a user from raw sign-up input, hashing the password.
    pub async fn sign_up(&self, username: &str, password: &str, role: &str) -> Result<User> {
        let role: Role = role.parse()?;
        if password.is_empty() {
            return Err(VendingError::ValidationError(
                "password must not be empty".to_string(),
            ));
        }

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| VendingError::storage(format!("password hashing task failed: {e}")))??;

        self.create(username, password_hash, role).await
    }

    pub async fn create(&self, username: &str, password_hash: String, role: Role) -> Result<User> {
        let user = User::new(username, password_hash, role)?;
        self.users.insert(user.clone()).await?;
        info!(username = %user.username, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn get(&self, username: &str) -> Result<User> {
        self.users
            .get(username)
            .await?
            .ok_or_else(|| VendingError::not_found("user", username))
    }

    pub async fn all(&self) -> Result<Vec<User>> {
        self.users.all().await
    }

    pub async fn adjust_deposit(&self, username: &str, delta: i64) -> Result<User> {
        self.update(username, |user| user.adjust(delta)).await
    }

    pub async fn credit(&self, username: &str, amount: u64) -> Result<User> {
        self.update(username, |user| user.credit(amount)).await
    }

    pub async fn debit(&self, username: &str, amount: u64) -> Result<User> {
        self.update(username, |user| user.debit(amount)).await
    }

    pub async fn reset_deposit(&self, username: &str) -> Result<User> {
        let user = self
            .update(username, |user| {
                user.reset_deposit();
                Ok(())
            })
            .await?;
        info!(username, "deposit reset");
        Ok(user)
    }

    /// Credits a buyer with a handful of coins.
    ///
    /// Every coin is checked before the wallet is touched: a single rejected
    /// coin fails the whole call with `InvalidCoin`.
    pub async fn deposit_coins(&self, username: &str, coins: &[i64]) -> Result<User> {
        let amount = self.ledger.total(coins)?;
        let user = self
            .update(username, |user| user.deposit_coins(amount))
            .await?;
        info!(username, amount, balance = %user.deposit, "coins deposited");
        Ok(user)
    }

    /// Deletes a user, then drops every session that references it.
    ///
    /// The record goes first so no login can open a new session for the user
    /// while its sessions are being removed.
    pub async fn delete(&self, username: &str) -> Result<User> {
        let user = self
            .users
            .remove(username)
            .await?
            .ok_or_else(|| VendingError::not_found("user", username))?;
        let sessions = self.sessions.remove_all(username).await?;
        info!(username, sessions, "user deleted");
        Ok(user)
    }

    async fn update<F>(&self, username: &str, mutate: F) -> Result<User>
    where
        F: Fn(&mut User) -> Result<()> + Send + Sync,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut user = self.get(username).await?;
            let expected = user.version;
            mutate(&mut user)?;
            user.version = expected + 1;

            if self.users.compare_and_swap(expected, user.clone()).await? {
                return Ok(user);
            }
            debug!(username, attempt, "user changed concurrently, retrying");
        }

        warn!(username, "giving up on contended user write");
        Err(VendingError::storage(format!(
            "write contention on user {username}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SessionStore;
    use crate::domain::session::Session;
    use crate::domain::user::Credit;
    use crate::infrastructure::in_memory::{
        InMemorySessionStore, InMemoryUserStore, in_memory_stores,
    };
    use crate::infrastructure::password::Argon2Hasher;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    fn accounts() -> (Accounts, SessionStoreRef) {
        let stores = in_memory_stores();
        let accounts = Accounts::new(
            stores.users,
            Arc::clone(&stores.sessions),
            Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap()),
            Arc::new(CoinLedger::default()),
        );
        (accounts, stores.sessions)
    }

    #[tokio::test]
    async fn test_sign_up_validates_role_and_password() {
        let (accounts, _) = accounts();
        let user = accounts.sign_up("alice", "pw", "buyer").await.unwrap();
        assert_eq!(user.role, Role::Buyer);
        assert_ne!(user.password_hash, "pw");

        assert!(matches!(
            accounts.sign_up("bob", "pw", "admin").await,
            Err(VendingError::ValidationError(_))
        ));
        assert!(accounts.sign_up("bob", "", "buyer").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_keeps_original() {
        let (accounts, _) = accounts();
        accounts.sign_up("alice", "pw", "buyer").await.unwrap();
        accounts.deposit_coins("alice", &[50]).await.unwrap();

        assert!(matches!(
            accounts.sign_up("alice", "other", "seller").await,
            Err(VendingError::DuplicateIdentity(_))
        ));
        let user = accounts.get("alice").await.unwrap();
        assert_eq!(user.role, Role::Buyer);
        assert_eq!(user.deposit, Credit(50));
    }

    #[tokio::test]
    async fn test_invalid_coin_leaves_deposit_unchanged() {
        let (accounts, _) = accounts();
        accounts.sign_up("alice", "pw", "buyer").await.unwrap();
        accounts.deposit_coins("alice", &[5, 100, 20]).await.unwrap();

        assert!(matches!(
            accounts.deposit_coins("alice", &[5, 10, 16]).await,
            Err(VendingError::InvalidCoin(16))
        ));
        assert_eq!(accounts.get("alice").await.unwrap().deposit, Credit(125));
    }

    #[tokio::test]
    async fn test_sellers_cannot_deposit() {
        let (accounts, _) = accounts();
        accounts.sign_up("sam", "pw", "seller").await.unwrap();
        assert!(matches!(
            accounts.deposit_coins("sam", &[5]).await,
            Err(VendingError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_adjust_and_reset() {
        let (accounts, _) = accounts();
        accounts.sign_up("alice", "pw", "buyer").await.unwrap();
        accounts.adjust_deposit("alice", 30).await.unwrap();
        assert!(matches!(
            accounts.adjust_deposit("alice", -31).await,
            Err(VendingError::InsufficientFunds { .. })
        ));

        let user = accounts.adjust_deposit("alice", -10).await.unwrap();
        assert_eq!(user.deposit, Credit(20));
        assert_eq!(user.version, 2);

        let user = accounts.reset_deposit("alice").await.unwrap();
        assert_eq!(user.deposit, Credit::ZERO);
        assert!(matches!(
            accounts.reset_deposit("ghost").await,
            Err(VendingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_sessions() {
        let (accounts, sessions) = accounts();
        accounts.sign_up("alice", "pw", "buyer").await.unwrap();
        sessions
            .insert_if_none_active(Session::new("alice", "token".into()))
            .await
            .unwrap();

        let deleted = accounts.delete("alice").await.unwrap();
        assert_eq!(deleted.username, "alice");
        assert!(sessions.sessions_for("alice").await.unwrap().is_empty());
        assert!(accounts.get("alice").await.is_err());
        assert!(accounts.delete("alice").await.is_err());
    }

    /// Session store that records whether the user record was still present
    /// when its sessions were removed.
    struct CleanupWitness {
        inner: InMemorySessionStore,
        users: UserStoreRef,
        user_present: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl SessionStore for CleanupWitness {
        async fn insert_if_none_active(&self, session: Session) -> Result<bool> {
            self.inner.insert_if_none_active(session).await
        }
        async fn find_active(&self, username: &str) -> Result<Option<Session>> {
            self.inner.find_active(username).await
        }
        async fn sessions_for(&self, username: &str) -> Result<Vec<Session>> {
            self.inner.sessions_for(username).await
        }
        async fn deactivate_all(&self, username: &str, at: DateTime<Utc>) -> Result<usize> {
            self.inner.deactivate_all(username, at).await
        }
        async fn remove_all(&self, username: &str) -> Result<usize> {
            let present = self.users.get(username).await?.is_some();
            *self.user_present.lock().unwrap() = Some(present);
            self.inner.remove_all(username).await
        }
        async fn prune_inactive(&self, revoked_before: DateTime<Utc>) -> Result<usize> {
            self.inner.prune_inactive(revoked_before).await
        }
    }

    #[tokio::test]
    async fn test_delete_removes_user_before_sessions() {
        let users: UserStoreRef = Arc::new(InMemoryUserStore::new());
        let witness = Arc::new(CleanupWitness {
            inner: InMemorySessionStore::new(),
            users: Arc::clone(&users),
            user_present: Mutex::new(None),
        });
        let accounts = Accounts::new(
            users,
            witness.clone(),
            Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap()),
            Arc::new(CoinLedger::default()),
        );
        accounts.sign_up("alice", "pw", "buyer").await.unwrap();
        witness
            .insert_if_none_active(Session::new("alice", "token".into()))
            .await
            .unwrap();

        accounts.delete("alice").await.unwrap();
        assert_eq!(*witness.user_present.lock().unwrap(), Some(false));
        assert!(witness.sessions_for("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_user_keeps_sessions() {
        let (accounts, sessions) = accounts();
        sessions
            .insert_if_none_active(Session::new("ghost", "token".into()))
            .await
            .unwrap();

        assert!(matches!(
            accounts.delete("ghost").await,
            Err(VendingError::NotFound { .. })
        ));
        assert_eq!(sessions.sessions_for("ghost").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_credits_are_not_lost() {
        let (accounts, _) = accounts();
        accounts.sign_up("alice", "pw", "buyer").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let accounts = accounts.clone();
                tokio::spawn(async move { accounts.deposit_coins("alice", &[5]).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(accounts.get("alice").await.unwrap().deposit, Credit(40));
    }
}
