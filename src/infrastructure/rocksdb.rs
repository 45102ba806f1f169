use crate::domain::ports::{ProductStore, SessionStore, Stores, UserStore};
use crate::domain::product::Product;
use crate::domain::session::Session;
use crate::domain::user::User;
use crate::error::{Result, VendingError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for user documents, keyed by username.
pub const CF_USERS: &str = "users";
/// Column Family for product documents, keyed by product id.
pub const CF_PRODUCTS: &str = "products";
/// Column Family for sessions, keyed by `username \0 token`.
pub const CF_SESSIONS: &str = "sessions";

const KEY_SEPARATOR: u8 = 0;

/// A persistent store implementation using RocksDB.
///
/// Handles users, products and sessions in separate Column Families. Values
/// are JSON documents. Read-modify-write sequences are serialized through an
/// async mutex so that compare-and-swap and insert-if-absent stay atomic.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the `users`, `products` and `sessions` column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_USERS, CF_PRODUCTS, CF_SESSIONS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Exposes this database as the three collections a machine needs.
    pub fn stores(&self) -> Stores {
        Stores {
            users: Arc::new(self.clone()),
            products: Arc::new(self.clone()),
            sessions: Arc::new(self.clone()),
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VendingError::storage(format!("column family `{name}` not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    /// Collects every `(key, document)` pair whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>> {
        let cf = self.cf(cf_name)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), serde_json::from_slice(&value)?));
        }
        Ok(entries)
    }

    fn session_prefix(username: &str) -> Vec<u8> {
        let mut prefix = username.as_bytes().to_vec();
        prefix.push(KEY_SEPARATOR);
        prefix
    }

    fn session_key(session: &Session) -> Vec<u8> {
        let mut key = Self::session_prefix(&session.username);
        key.extend_from_slice(session.token.as_bytes());
        key
    }
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn insert(&self, user: User) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = user.username.as_bytes();
        if self.read::<User>(CF_USERS, key)?.is_some() {
            return Err(VendingError::DuplicateIdentity(user.username));
        }
        self.write(CF_USERS, key, &user)
    }

    async fn get(&self, username: &str) -> Result<Option<User>> {
        self.read(CF_USERS, username.as_bytes())
    }

    async fn compare_and_swap(&self, expected_version: u64, user: User) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = user.username.as_bytes();
        match self.read::<User>(CF_USERS, key)? {
            Some(current) if current.version == expected_version => {
                self.write(CF_USERS, key, &user)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, username: &str) -> Result<Option<User>> {
        let _guard = self.write_lock.lock().await;
        let existing = self.read::<User>(CF_USERS, username.as_bytes())?;
        if existing.is_some() {
            self.delete(CF_USERS, username.as_bytes())?;
        }
        Ok(existing)
    }

    async fn all(&self) -> Result<Vec<User>> {
        Ok(self
            .scan::<User>(CF_USERS, &[])?
            .into_iter()
            .map(|(_, user)| user)
            .collect())
    }
}

#[async_trait]
impl ProductStore for RocksDBStore {
    async fn insert(&self, product: Product) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = product.id.as_bytes();
        if self.read::<Product>(CF_PRODUCTS, key)?.is_some() {
            return Err(VendingError::storage(format!(
                "product id collision: {}",
                product.id
            )));
        }
        self.write(CF_PRODUCTS, key, &product)
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        self.read(CF_PRODUCTS, id.as_bytes())
    }

    async fn compare_and_swap(&self, expected_version: u64, product: Product) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = product.id.as_bytes();
        match self.read::<Product>(CF_PRODUCTS, key)? {
            Some(current) if current.version == expected_version => {
                self.write(CF_PRODUCTS, key, &product)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> Result<Option<Product>> {
        let _guard = self.write_lock.lock().await;
        let existing = self.read::<Product>(CF_PRODUCTS, id.as_bytes())?;
        if existing.is_some() {
            self.delete(CF_PRODUCTS, id.as_bytes())?;
        }
        Ok(existing)
    }

    async fn all(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .scan::<Product>(CF_PRODUCTS, &[])?
            .into_iter()
            .map(|(_, product)| product)
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(products)
    }
}

#[async_trait]
impl SessionStore for RocksDBStore {
    async fn insert_if_none_active(&self, session: Session) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let prefix = Self::session_prefix(&session.username);
        let history = self.scan::<Session>(CF_SESSIONS, &prefix)?;
        if history.iter().any(|(_, s)| s.is_active()) {
            return Ok(false);
        }
        self.write(CF_SESSIONS, &Self::session_key(&session), &session)?;
        Ok(true)
    }

    async fn find_active(&self, username: &str) -> Result<Option<Session>> {
        let prefix = Self::session_prefix(username);
        Ok(self
            .scan::<Session>(CF_SESSIONS, &prefix)?
            .into_iter()
            .map(|(_, session)| session)
            .find(Session::is_active))
    }

    async fn sessions_for(&self, username: &str) -> Result<Vec<Session>> {
        let prefix = Self::session_prefix(username);
        let mut sessions: Vec<Session> = self
            .scan::<Session>(CF_SESSIONS, &prefix)?
            .into_iter()
            .map(|(_, session)| session)
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn deactivate_all(&self, username: &str, at: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_SESSIONS)?;
        let prefix = Self::session_prefix(username);

        let mut batch = WriteBatch::default();
        let mut revoked = 0;
        for (key, mut session) in self.scan::<Session>(CF_SESSIONS, &prefix)? {
            if session.revoke(at) {
                batch.put_cf(cf, key, serde_json::to_vec(&session)?);
                revoked += 1;
            }
        }
        self.db.write(batch)?;
        Ok(revoked)
    }

    async fn remove_all(&self, username: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_SESSIONS)?;
        let prefix = Self::session_prefix(username);

        let mut batch = WriteBatch::default();
        let entries = self.scan::<Session>(CF_SESSIONS, &prefix)?;
        for (key, _) in &entries {
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        Ok(entries.len())
    }

    async fn prune_inactive(&self, revoked_before: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_SESSIONS)?;

        let mut batch = WriteBatch::default();
        let mut pruned = 0;
        for (key, session) in self.scan::<Session>(CF_SESSIONS, &[])? {
            if session.revoked_before(revoked_before) {
                batch.delete_cf(cf, key);
                pruned += 1;
            }
        }
        self.db.write(batch)?;
        Ok(pruned)
    }
}
