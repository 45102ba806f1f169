use super::accounts::Accounts;
use super::catalog::Catalog;
use crate::domain::coin::CoinCount;
use crate::error::{Result, VendingError};
use serde::Serialize;
use tracing::{error, info};

/// What a buyer gets back from a completed purchase.
///
/// `change` is the per-denomination breakdown of the balance still held in
/// the wallet, ascending by coin. It is not a withdrawal. `remainder` is the
/// part of the balance no coin can express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub total_spent: u64,
    pub product_name: String,
    pub product_quantity: u64,
    pub change: Vec<CoinCount>,
    pub remainder: u64,
    pub balance: u64,
}

impl Receipt {
    /// Value of the coins listed in `change`.
    pub fn change_value(&self) -> u64 {
        self.change.iter().map(|c| c.coin * c.count).sum()
    }
}

/// Runs a purchase across the buyer's wallet, the seller's wallet and the
/// product's stock.
///
/// The three writes are individually atomic. When a later write fails the
/// earlier ones are undone with compensating writes, so a purchase either
/// lands completely or not at all.
#[derive(Clone)]
pub struct PurchaseOrchestrator {
    accounts: Accounts,
    catalog: Catalog,
}

impl PurchaseOrchestrator {
    pub fn new(accounts: Accounts, catalog: Catalog) -> Self {
        Self { accounts, catalog }
    }

    pub async fn purchase(&self, buyer: &str, product_id: &str, quantity: u64) -> Result<Receipt> {
        if quantity == 0 {
            return Err(VendingError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = self.catalog.get(product_id).await?;
        if quantity > product.available {
            return Err(VendingError::InsufficientStock {
                requested: quantity,
                available: product.available,
            });
        }

        let buyer_account = self.accounts.get(buyer).await?;
        let seller = self.accounts.get(&product.seller_id).await?;

        let total = quantity.checked_mul(product.cost).ok_or_else(|| {
            VendingError::ValidationError("purchase total overflows".to_string())
        })?;
        if total > buyer_account.deposit.value() {
            return Err(VendingError::InsufficientFunds {
                required: total,
                available: buyer_account.deposit.value(),
            });
        }

        let debited = self.accounts.debit(buyer, total).await?;

        if let Err(err) = self.accounts.credit(&seller.username, total).await {
            self.compensate(buyer, total, None).await?;
            return Err(err);
        }

        if let Err(err) = self.catalog.decrement_available(product_id, quantity).await {
            self.compensate(buyer, total, Some(&seller.username)).await?;
            return Err(err);
        }

        let balance = debited.deposit.value();
        let change = self.accounts.ledger().make_change(balance);
        let receipt = Receipt {
            total_spent: total,
            product_name: product.name,
            product_quantity: quantity,
            change: change.coins,
            remainder: change.remainder,
            balance,
        };
        info!(
            buyer,
            seller = %seller.username,
            product_id,
            quantity,
            total,
            balance,
            "purchase completed"
        );
        Ok(receipt)
    }

    /// Refunds the buyer, then takes back the seller credit if it happened.
    ///
    /// Both writes are attempted even if one fails. Any failure leaves the
    /// wallets inconsistent and is reported as a storage error.
    async fn compensate(&self, buyer: &str, total: u64, seller: Option<&str>) -> Result<()> {
        let mut failures = Vec::new();

        if let Err(err) = self.accounts.credit(buyer, total).await {
            error!(buyer, total, error = %err, "failed to refund buyer");
            failures.push(format!("buyer {buyer} left debited by {total}"));
        }

        if let Some(seller) = seller {
            if let Err(err) = self.accounts.debit(seller, total).await {
                error!(buyer, seller, total, error = %err, "failed to reverse seller credit");
                failures.push(format!("seller {seller} left credited with {total}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(VendingError::storage(format!(
                "purchase compensation incomplete: {}",
                failures.join(", ")
            )))
        }
    }
}
