use super::MAX_WRITE_ATTEMPTS;
use super::policy::AccessPolicy;
use crate::domain::ports::ProductStoreRef;
use crate::domain::product::{Product, ProductPatch};
use crate::domain::session::Identity;
use crate::error::{Result, VendingError};
use tracing::{debug, info, warn};

/// Owns product listings and their stock counts.
#[derive(Clone)]
pub struct Catalog {
    products: ProductStoreRef,
}

impl Catalog {
    pub fn new(products: ProductStoreRef) -> Self {
        Self { products }
    }

    pub async fn create(
        &self,
        name: &str,
        available: u64,
        cost: u64,
        seller_id: &str,
    ) -> Result<Product> {
        let product = Product::new(name, available, cost, seller_id)?;
        self.products.insert(product.clone()).await?;
        info!(product_id = %product.id, seller = seller_id, available, cost, "product created");
        Ok(product)
    }

    pub async fn get(&self, id: &str) -> Result<Product> {
        self.products
            .get(id)
            .await?
            .ok_or_else(|| VendingError::not_found("product", id))
    }

    pub async fn list(&self) -> Result<Vec<Product>> {
        self.products.all().await
    }

    /// Applies a partial update on behalf of the product's seller.
    pub async fn update(
        &self,
        id: &str,
        patch: &ProductPatch,
        requester: &Identity,
    ) -> Result<Product> {
        let product = self
            .write(id, |product| {
                AccessPolicy::require_ownership(requester, &product.seller_id)?;
                product.apply(patch)
            })
            .await?;
        info!(product_id = id, seller = %requester.username, "product updated");
        Ok(product)
    }

    pub async fn delete(&self, id: &str, requester: &Identity) -> Result<Product> {
        let product = self.get(id).await?;
        AccessPolicy::require_ownership(requester, &product.seller_id)?;

        let removed = self
            .products
            .remove(id)
            .await?
            .ok_or_else(|| VendingError::not_found("product", id))?;
        info!(product_id = id, seller = %requester.username, "product deleted");
        Ok(removed)
    }

    /// Takes `quantity` items out of stock, failing if fewer are left.
    pub async fn decrement_available(&self, id: &str, quantity: u64) -> Result<Product> {
        self.write(id, |product| product.take(quantity)).await
    }

    async fn write<F>(&self, id: &str, mutate: F) -> Result<Product>
    where
        F: Fn(&mut Product) -> Result<()> + Send + Sync,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut product = self.get(id).await?;
            let expected = product.version;
            mutate(&mut product)?;
            product.version = expected + 1;

            if self
                .products
                .compare_and_swap(expected, product.clone())
                .await?
            {
                return Ok(product);
            }
            debug!(product_id = id, attempt, "product changed concurrently, retrying");
        }

        warn!(product_id = id, "giving up on contended product write");
        Err(VendingError::storage(format!(
            "write contention on product {id}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::Role;
    use crate::infrastructure::in_memory::InMemoryProductStore;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(InMemoryProductStore::new()))
    }

    fn seller(name: &str) -> Identity {
        Identity {
            username: name.to_string(),
            role: Role::Seller,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let catalog = catalog();
        let product = catalog.create("Cola", 20, 10, "sam").await.unwrap();
        assert_eq!(catalog.get(&product.id).await.unwrap(), product);
        assert!(matches!(
            catalog.get("missing").await,
            Err(VendingError::NotFound { .. })
        ));
        assert!(catalog.create("Cola", 0, 10, "sam").await.is_err());
    }

    #[tokio::test]
    async fn test_only_owner_updates() {
        let catalog = catalog();
        let product = catalog.create("Cola", 20, 10, "sam").await.unwrap();
        let patch = ProductPatch {
            cost: Some(15),
            ..Default::default()
        };

        assert!(matches!(
            catalog.update(&product.id, &patch, &seller("sue")).await,
            Err(VendingError::Forbidden(_))
        ));
        assert_eq!(catalog.get(&product.id).await.unwrap(), product);

        let updated = catalog
            .update(&product.id, &patch, &seller("sam"))
            .await
            .unwrap();
        assert_eq!(updated.cost, 15);
        assert_eq!(updated.available, 20);
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn test_only_owner_deletes() {
        let catalog = catalog();
        let product = catalog.create("Cola", 20, 10, "sam").await.unwrap();

        assert!(catalog.delete(&product.id, &seller("sue")).await.is_err());
        assert!(catalog.get(&product.id).await.is_ok());

        let deleted = catalog.delete(&product.id, &seller("sam")).await.unwrap();
        assert_eq!(deleted, product);
        assert!(catalog.get(&product.id).await.is_err());
    }

    #[tokio::test]
    async fn test_decrement_available() {
        let catalog = catalog();
        let product = catalog.create("Cola", 20, 10, "sam").await.unwrap();

        let product = catalog.decrement_available(&product.id, 15).await.unwrap();
        assert_eq!(product.available, 5);
        assert!(matches!(
            catalog.decrement_available(&product.id, 6).await,
            Err(VendingError::InsufficientStock { .. })
        ));
        assert_eq!(catalog.get(&product.id).await.unwrap().available, 5);
    }
}
