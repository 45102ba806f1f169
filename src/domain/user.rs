use crate::error::{Result, VendingError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wallet balance, in units of the smallest accepted coin value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credit(pub u64);

impl Credit {
    pub const ZERO: Self = Self(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, amount: u64) -> Option<Self> {
        self.0.checked_add(amount).map(Self)
    }

    pub fn checked_sub(self, amount: u64) -> Option<Self> {
        self.0.checked_sub(amount).map(Self)
    }
}

impl fmt::Display for Credit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = VendingError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            _ => Err(VendingError::ValidationError(
                "unknown role type".to_string(),
            )),
        }
    }
}

/// A registered account together with its wallet.
///
/// `version` is bumped by every successful write and is what stores compare
/// against when swapping in a new state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub deposit: Credit,
    #[serde(default)]
    pub version: u64,
}

/// Outward view of a user; never carries the password hash.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct UserProfile {
    pub username: String,
    pub role: Role,
    pub deposit: u64,
}

impl User {
    pub fn new(username: &str, password_hash: String, role: Role) -> Result<Self> {
        if username.trim().is_empty() {
            return Err(VendingError::ValidationError(
                "username must not be empty".to_string(),
            ));
        }
        if username.trim() != username {
            return Err(VendingError::ValidationError(
                "username must not start or end with whitespace".to_string(),
            ));
        }
        // The persistent session index separates username and token with NUL.
        if username.contains('\0') {
            return Err(VendingError::ValidationError(
                "username must not contain NUL".to_string(),
            ));
        }
        if password_hash.is_empty() {
            return Err(VendingError::ValidationError(
                "password hash must not be empty".to_string(),
            ));
        }

        Ok(Self {
            username: username.to_string(),
            password_hash,
            role,
            deposit: Credit::ZERO,
            version: 0,
        })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            role: self.role,
            deposit: self.deposit.value(),
        }
    }

    /// Adds already validated coins to a buyer's wallet.
    pub fn deposit_coins(&mut self, amount: u64) -> Result<()> {
        if !self.has_role(Role::Buyer) {
            return Err(VendingError::Forbidden(
                "user does not have buyer role".to_string(),
            ));
        }
        self.credit(amount)
    }

    pub fn credit(&mut self, amount: u64) -> Result<()> {
        self.deposit = self.deposit.checked_add(amount).ok_or_else(|| {
            VendingError::ValidationError("deposit would overflow".to_string())
        })?;
        Ok(())
    }

    /// Removes funds from the wallet if enough are available.
    pub fn debit(&mut self, amount: u64) -> Result<()> {
        match self.deposit.checked_sub(amount) {
            Some(remaining) => {
                self.deposit = remaining;
                Ok(())
            }
            None => Err(VendingError::InsufficientFunds {
                required: amount,
                available: self.deposit.value(),
            }),
        }
    }

    /// Applies a signed adjustment, refusing to go below zero.
    pub fn adjust(&mut self, delta: i64) -> Result<()> {
        if delta >= 0 {
            self.credit(delta.unsigned_abs())
        } else {
            self.debit(delta.unsigned_abs())
        }
    }

    pub fn reset_deposit(&mut self) {
        self.deposit = Credit::ZERO;
    }
}
