use crate::domain::ports::{ProductStore, SessionStore, Stores, UserStore};
use crate::domain::product::Product;
use crate::domain::session::Session;
use crate::domain::user::User;
use crate::error::{Result, VendingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for users.
///
/// Uses `Arc<RwLock<HashMap<String, User>>>` to allow shared concurrent access.
/// Every check-then-write happens under a single write guard.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(VendingError::DuplicateIdentity(user.username));
        }
        users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(username).cloned())
    }

    async fn compare_and_swap(&self, expected_version: u64, user: User) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.username) {
            Some(current) if current.version == expected_version => {
                *current = user;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, username: &str) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.remove(username))
    }

    async fn all(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }
}

/// A thread-safe in-memory store for products, keyed by id.
#[derive(Default, Clone)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<String, Product>>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, product: Product) -> Result<()> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(VendingError::storage(format!(
                "product id collision: {}",
                product.id
            )));
        }
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products.get(id).cloned())
    }

    async fn compare_and_swap(&self, expected_version: u64, product: Product) -> Result<bool> {
        let mut products = self.products.write().await;
        match products.get_mut(&product.id) {
            Some(current) if current.version == expected_version => {
                *current = product;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> Result<Option<Product>> {
        let mut products = self.products.write().await;
        Ok(products.remove(id))
    }

    async fn all(&self) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut all: Vec<Product> = products.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

/// A thread-safe in-memory session log, grouped by username.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Session>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert_if_none_active(&self, session: Session) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let history = sessions.entry(session.username.clone()).or_default();
        if history.iter().any(Session::is_active) {
            return Ok(false);
        }
        history.push(session);
        Ok(true)
    }

    async fn find_active(&self, username: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(username)
            .and_then(|history| history.iter().find(|s| s.is_active()).cloned()))
    }

    async fn sessions_for(&self, username: &str) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(username).cloned().unwrap_or_default())
    }

    async fn deactivate_all(&self, username: &str, at: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(username)
            .map(|history| {
                history
                    .iter_mut()
                    .map(|s| s.revoke(at))
                    .filter(|revoked| *revoked)
                    .count()
            })
            .unwrap_or(0))
    }

    async fn remove_all(&self, username: &str) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(username).map(|h| h.len()).unwrap_or(0))
    }

    async fn prune_inactive(&self, revoked_before: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let mut pruned = 0;
        for history in sessions.values_mut() {
            let before = history.len();
            history.retain(|s| !s.revoked_before(revoked_before));
            pruned += before - history.len();
        }
        sessions.retain(|_, history| !history.is_empty());
        Ok(pruned)
    }
}

/// Fresh, isolated in-memory collections.
pub fn in_memory_stores() -> Stores {
    Stores {
        users: Arc::new(InMemoryUserStore::new()),
        products: Arc::new(InMemoryProductStore::new()),
        sessions: Arc::new(InMemorySessionStore::new()),
    }
}
