use super::accounts::Accounts;
use super::catalog::Catalog;
use super::policy::AccessPolicy;
use super::purchase::{PurchaseOrchestrator, Receipt};
use super::sessions::SessionManager;
use crate::domain::coin::CoinLedger;
use crate::domain::ports::{CredentialHasherRef, Stores, TokenIssuerRef};
use crate::domain::product::{Product, ProductPatch};
use crate::domain::session::Identity;
use crate::domain::user::{Role, UserProfile};
use crate::error::{AuthFailure, Result};
use chrono::Duration;
use std::sync::Arc;

/// Single entry point for inbound adapters.
///
/// Every operation except sign-up and login takes the raw authorization
/// value, resolves it to an [`Identity`] and runs the access policy before
/// touching any store.
#[derive(Clone)]
pub struct VendingMachine {
    accounts: Accounts,
    catalog: Catalog,
    sessions: SessionManager,
    purchases: PurchaseOrchestrator,
}

impl VendingMachine {
    pub fn new(
        stores: Stores,
        ledger: CoinLedger,
        hasher: CredentialHasherRef,
        issuer: TokenIssuerRef,
    ) -> Self {
        let accounts = Accounts::new(
            Arc::clone(&stores.users),
            Arc::clone(&stores.sessions),
            Arc::clone(&hasher),
            Arc::new(ledger),
        );
        let catalog = Catalog::new(stores.products);
        let sessions = SessionManager::new(stores.users, stores.sessions, hasher, issuer);
        let purchases = PurchaseOrchestrator::new(accounts.clone(), catalog.clone());

        Self {
            accounts,
            catalog,
            sessions,
            purchases,
        }
    }

    pub fn with_session_retention(mut self, retention: Option<Duration>) -> Self {
        self.sessions = self.sessions.with_retention(retention);
        self
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Accepts `Bearer <token>` or a bare token.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Identity> {
        let token = authorization
            .map(str::trim_start)
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
            .filter(|token| !token.is_empty())
            .ok_or(AuthFailure::MissingCredentials)?;
        self.sessions.validate(token).await
    }

    pub async fn sign_up(&self, username: &str, password: &str, role: &str) -> Result<UserProfile> {
        let user = self.accounts.sign_up(username, password, role).await?;
        Ok(user.profile())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        self.sessions.login(username, password).await
    }

    pub async fn logout(&self, authorization: Option<&str>) -> Result<()> {
        let identity = self.authenticate(authorization).await?;
        self.sessions.logout(&identity.username).await?;
        Ok(())
    }

    pub async fn logout_all(&self, authorization: Option<&str>) -> Result<()> {
        let identity = self.authenticate(authorization).await?;
        self.sessions.logout_all(&identity.username).await?;
        Ok(())
    }

    pub async fn current_user(&self, authorization: Option<&str>) -> Result<UserProfile> {
        let identity = self.authenticate(authorization).await?;
        Ok(self.accounts.get(&identity.username).await?.profile())
    }

    pub async fn delete_current_user(&self, authorization: Option<&str>) -> Result<UserProfile> {
        let identity = self.authenticate(authorization).await?;
        Ok(self.accounts.delete(&identity.username).await?.profile())
    }

    pub async fn reset_deposit(&self, authorization: Option<&str>) -> Result<UserProfile> {
        let identity = self.authenticate(authorization).await?;
        AccessPolicy::require_role(&identity, Role::Buyer)?;
        Ok(self.accounts.reset_deposit(&identity.username).await?.profile())
    }

    pub async fn deposit(&self, authorization: Option<&str>, coins: &[i64]) -> Result<UserProfile> {
        let identity = self.authenticate(authorization).await?;
        AccessPolicy::require_role(&identity, Role::Buyer)?;
        Ok(self
            .accounts
            .deposit_coins(&identity.username, coins)
            .await?
            .profile())
    }

    pub async fn create_product(
        &self,
        authorization: Option<&str>,
        name: &str,
        available: u64,
        cost: u64,
    ) -> Result<Product> {
        let identity = self.authenticate(authorization).await?;
        AccessPolicy::require_role(&identity, Role::Seller)?;
        self.catalog
            .create(name, available, cost, &identity.username)
            .await
    }

    pub async fn list_products(&self, authorization: Option<&str>) -> Result<Vec<Product>> {
        self.authenticate(authorization).await?;
        self.catalog.list().await
    }

    pub async fn get_product(&self, authorization: Option<&str>, id: &str) -> Result<Product> {
        self.authenticate(authorization).await?;
        self.catalog.get(id).await
    }

    pub async fn update_product(
        &self,
        authorization: Option<&str>,
        id: &str,
        patch: &ProductPatch,
    ) -> Result<Product> {
        let identity = self.authenticate(authorization).await?;
        AccessPolicy::require_role(&identity, Role::Seller)?;
        self.catalog.update(id, patch, &identity).await
    }

    pub async fn delete_product(&self, authorization: Option<&str>, id: &str) -> Result<Product> {
        let identity = self.authenticate(authorization).await?;
        AccessPolicy::require_role(&identity, Role::Seller)?;
        self.catalog.delete(id, &identity).await
    }

    pub async fn buy(
        &self,
        authorization: Option<&str>,
        product_id: &str,
        quantity: u64,
    ) -> Result<Receipt> {
        let identity = self.authenticate(authorization).await?;
        AccessPolicy::require_role(&identity, Role::Buyer)?;
        self.purchases
            .purchase(&identity.username, product_id, quantity)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VendingError;
    use crate::infrastructure::in_memory::in_memory_stores;
    use crate::infrastructure::jwt::JwtTokenIssuer;
    use crate::infrastructure::password::Argon2Hasher;

    fn machine() -> VendingMachine {
        VendingMachine::new(
            in_memory_stores(),
            CoinLedger::default(),
            Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap()),
            Arc::new(JwtTokenIssuer::new("secret", Duration::days(30))),
        )
    }

    async fn logged_in(machine: &VendingMachine, name: &str, role: &str) -> String {
        machine.sign_up(name, "pw", role).await.unwrap();
        machine.login(name, "pw").await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_and_bearer_credentials() {
        let machine = machine();
        let token = logged_in(&machine, "alice", "buyer").await;

        for missing in [None, Some(""), Some("Bearer ")] {
            assert!(matches!(
                machine.current_user(missing).await,
                Err(VendingError::AuthError(AuthFailure::MissingCredentials))
            ));
        }

        let bearer = format!("Bearer {token}");
        let profile = machine.current_user(Some(&bearer)).await.unwrap();
        assert_eq!(profile.username, "alice");
        assert!(machine.current_user(Some(&token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_role_gates() {
        let machine = machine();
        let buyer = logged_in(&machine, "alice", "buyer").await;
        let seller = logged_in(&machine, "sam", "seller").await;

        assert!(matches!(
            machine.create_product(Some(&buyer), "Cola", 5, 10).await,
            Err(VendingError::Forbidden(_))
        ));
        let product = machine
            .create_product(Some(&seller), "Cola", 5, 10)
            .await
            .unwrap();

        assert!(matches!(
            machine.deposit(Some(&seller), &[5]).await,
            Err(VendingError::Forbidden(_))
        ));
        assert!(matches!(
            machine.reset_deposit(Some(&seller)).await,
            Err(VendingError::Forbidden(_))
        ));
        assert!(matches!(
            machine.buy(Some(&seller), &product.id, 1).await,
            Err(VendingError::Forbidden(_))
        ));

        assert_eq!(machine.list_products(Some(&buyer)).await.unwrap().len(), 1);
        assert_eq!(
            machine.get_product(Some(&buyer), &product.id).await.unwrap(),
            product
        );
    }

    #[tokio::test]
    async fn test_full_purchase_flow() {
        let machine = machine();
        let buyer = logged_in(&machine, "alice", "buyer").await;
        let seller = logged_in(&machine, "sam", "seller").await;
        let product = machine
            .create_product(Some(&seller), "Cola", 20, 10)
            .await
            .unwrap();

        let profile = machine.deposit(Some(&buyer), &[100, 50]).await.unwrap();
        assert_eq!(profile.deposit, 150);

        let receipt = machine.buy(Some(&buyer), &product.id, 15).await.unwrap();
        assert_eq!(receipt.total_spent, 150);
        assert_eq!(receipt.change_value(), 0);

        assert_eq!(machine.current_user(Some(&buyer)).await.unwrap().deposit, 0);
        assert_eq!(machine.current_user(Some(&seller)).await.unwrap().deposit, 150);
    }

    #[tokio::test]
    async fn test_other_seller_cannot_mutate() {
        let machine = machine();
        let owner = logged_in(&machine, "sam", "seller").await;
        let rival = logged_in(&machine, "sue", "seller").await;
        let product = machine
            .create_product(Some(&owner), "Cola", 20, 10)
            .await
            .unwrap();

        let patch = ProductPatch {
            available: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            machine.update_product(Some(&rival), &product.id, &patch).await,
            Err(VendingError::Forbidden(_))
        ));
        assert!(matches!(
            machine.delete_product(Some(&rival), &product.id).await,
            Err(VendingError::Forbidden(_))
        ));

        let updated = machine
            .update_product(Some(&owner), &product.id, &patch)
            .await
            .unwrap();
        assert_eq!(updated.available, 0);
        machine.delete_product(Some(&owner), &product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_then_login_again() {
        let machine = machine();
        let token = logged_in(&machine, "alice", "buyer").await;
        machine.logout(Some(&token)).await.unwrap();
        assert!(machine.current_user(Some(&token)).await.is_err());
        assert!(machine.login("alice", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_current_user_revokes_token() {
        let machine = machine();
        let token = logged_in(&machine, "alice", "buyer").await;
        let deleted = machine.delete_current_user(Some(&token)).await.unwrap();
        assert_eq!(deleted.username, "alice");
        assert!(matches!(
            machine.current_user(Some(&token)).await,
            Err(VendingError::AuthError(AuthFailure::RevokedSession))
        ));
    }

    #[tokio::test]
    async fn test_old_token_stays_dead_after_name_is_reused() {
        let machine = machine();
        let token = logged_in(&machine, "alice", "buyer").await;
        machine.delete_current_user(Some(&token)).await.unwrap();

        machine.sign_up("alice", "pw", "seller").await.unwrap();
        assert!(matches!(
            machine.current_user(Some(&token)).await,
            Err(VendingError::AuthError(AuthFailure::RevokedSession))
        ));
    }

    #[tokio::test]
    async fn test_padded_username_is_rejected_at_sign_up() {
        let machine = machine();
        assert!(matches!(
            machine.sign_up(" bob ", "pw", "buyer").await,
            Err(VendingError::ValidationError(_))
        ));
        assert!(machine.login("bob", "pw").await.is_err());
    }
}
