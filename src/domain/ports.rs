use super::product::Product;
use super::session::{Session, TokenClaims};
use super::user::User;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Persistence for user documents, keyed by username.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user, failing with `DuplicateIdentity` if the username is taken.
    async fn insert(&self, user: User) -> Result<()>;
    async fn get(&self, username: &str) -> Result<Option<User>>;
    /// Replaces the stored user only if its version still equals `expected_version`.
    async fn compare_and_swap(&self, expected_version: u64, user: User) -> Result<bool>;
    async fn remove(&self, username: &str) -> Result<Option<User>>;
    async fn all(&self) -> Result<Vec<User>>;
}

/// Persistence for product documents, keyed by product id.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: Product) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Product>>;
    async fn compare_and_swap(&self, expected_version: u64, product: Product) -> Result<bool>;
    async fn remove(&self, id: &str) -> Result<Option<Product>>;
    async fn all(&self) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores the session unless its user already has an active one.
    async fn insert_if_none_active(&self, session: Session) -> Result<bool>;
    async fn find_active(&self, username: &str) -> Result<Option<Session>>;
    async fn sessions_for(&self, username: &str) -> Result<Vec<Session>>;
    async fn deactivate_all(&self, username: &str, at: DateTime<Utc>) -> Result<usize>;
    async fn remove_all(&self, username: &str) -> Result<usize>;
    async fn prune_inactive(&self, revoked_before: DateTime<Utc>) -> Result<usize>;
}

/// Opaque password hashing capability.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Mints and checks signed, time-bound bearer tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, username: &str) -> Result<String>;
    fn verify(&self, token: &str) -> Result<TokenClaims>;
}

pub type UserStoreRef = Arc<dyn UserStore>;
pub type ProductStoreRef = Arc<dyn ProductStore>;
pub type SessionStoreRef = Arc<dyn SessionStore>;
pub type CredentialHasherRef = Arc<dyn CredentialHasher>;
pub type TokenIssuerRef = Arc<dyn TokenIssuer>;

/// The three collections a machine is backed by.
#[derive(Clone)]
pub struct Stores {
    pub users: UserStoreRef,
    pub products: ProductStoreRef,
    pub sessions: SessionStoreRef,
}
