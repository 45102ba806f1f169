use crate::error::{Result, VendingError};
use serde::{Deserialize, Serialize};

/// Coin values accepted when no other set is configured.
pub const DEFAULT_DENOMINATIONS: [u64; 5] = [5, 10, 20, 50, 100];

/// Number of coins of a single denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinCount {
    pub coin: u64,
    pub count: u64,
}

/// Breakdown of an amount into accepted coins, ascending by denomination.
///
/// `remainder` is whatever could not be expressed in coins (only possible
/// when the amount is not a multiple of the smallest denomination).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub coins: Vec<CoinCount>,
    pub remainder: u64,
}

impl Change {
    /// Sum of the coins in the breakdown.
    pub fn value(&self) -> u64 {
        self.coins.iter().map(|c| c.coin * c.count).sum()
    }
}

/// The fixed set of coin denominations the machine deals in.
///
/// The set is validated once at construction and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinLedger {
    denominations: Vec<u64>,
}

impl Default for CoinLedger {
    fn default() -> Self {
        Self {
            denominations: DEFAULT_DENOMINATIONS.to_vec(),
        }
    }
}

impl CoinLedger {
    pub fn new(denominations: impl IntoIterator<Item = u64>) -> Result<Self> {
        let mut denominations: Vec<u64> = denominations.into_iter().collect();
        if denominations.is_empty() {
            return Err(VendingError::ValidationError(
                "at least one coin denomination is required".to_string(),
            ));
        }
        if denominations.contains(&0) {
            return Err(VendingError::ValidationError(
                "coin denominations must be positive".to_string(),
            ));
        }

        denominations.sort_unstable();
        let before = denominations.len();
        denominations.dedup();
        if denominations.len() != before {
            return Err(VendingError::ValidationError(
                "coin denominations must be unique".to_string(),
            ));
        }

        Ok(Self { denominations })
    }

    /// Accepted denominations, smallest first.
    pub fn denominations(&self) -> &[u64] {
        &self.denominations
    }

    pub fn accept(&self, coin: u64) -> bool {
        self.denominations.binary_search(&coin).is_ok()
    }

    /// Validates every coin and returns their sum.
    ///
    /// Coins arrive as signed values straight from requests; anything that is
    /// not a positive accepted denomination is rejected with `InvalidCoin`.
    /// Nothing is summed unless all coins are accepted, so callers can use
    /// the result for an all-or-nothing deposit.
    pub fn total(&self, coins: &[i64]) -> Result<u64> {
        let accepted = coins
            .iter()
            .map(|&coin| {
                u64::try_from(coin)
                    .ok()
                    .filter(|value| self.accept(*value))
                    .ok_or(VendingError::InvalidCoin(coin))
            })
            .collect::<Result<Vec<u64>>>()?;

        accepted.iter().try_fold(0u64, |sum, coin| {
            sum.checked_add(*coin).ok_or_else(|| {
                VendingError::ValidationError("deposit amount overflows".to_string())
            })
        })
    }

    /// Breaks `amount` into coins by greedy descent from the largest denomination.
    pub fn make_change(&self, amount: u64) -> Change {
        let mut remaining = amount;
        let mut coins: Vec<CoinCount> = self
            .denominations
            .iter()
            .rev()
            .map(|&coin| {
                let count = remaining / coin;
                remaining -= count * coin;
                CoinCount { coin, count }
            })
            .collect();
        coins.reverse();

        Change {
            coins,
            remainder: remaining,
        }
    }
}
