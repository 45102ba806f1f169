use crate::error::{Result, VendingError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub available: u64,
    pub cost: u64,
    pub seller_id: String,
    #[serde(default)]
    pub version: u64,
}

/// Partial update of a product. `None` leaves the field untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub available: Option<u64>,
    #[serde(default)]
    pub cost: Option<u64>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.available.is_none() && self.cost.is_none()
    }
}

impl Product {
    /// Creates a listing with a fresh id. Both quantity and cost must be positive.
    pub fn new(name: &str, available: u64, cost: u64, seller_id: &str) -> Result<Self> {
        let name = validate_name(name)?;
        if available == 0 {
            return Err(VendingError::ValidationError(
                "available must be a positive integer".to_string(),
            ));
        }
        validate_cost(cost)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            available,
            cost,
            seller_id: seller_id.to_string(),
            version: 0,
        })
    }

    /// Applies every field present in the patch, or none of them.
    pub fn apply(&mut self, patch: &ProductPatch) -> Result<()> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        if let Some(cost) = patch.cost {
            validate_cost(cost)?;
        }

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        if let Some(cost) = patch.cost {
            self.cost = cost;
        }
        Ok(())
    }

    /// Takes `quantity` items out of stock.
    pub fn take(&mut self, quantity: u64) -> Result<()> {
        if quantity > self.available {
            return Err(VendingError::InsufficientStock {
                requested: quantity,
                available: self.available,
            });
        }
        self.available -= quantity;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VendingError::ValidationError(
            "product name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_cost(cost: u64) -> Result<()> {
    if cost == 0 {
        return Err(VendingError::ValidationError(
            "cost must be a positive integer".to_string(),
        ));
    }
    Ok(())
}
