use crate::domain::product::ProductPatch;
use crate::error::{Result, VendingError};
use serde::Deserialize;
use std::io::BufRead;

/// One line of a request script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// User whose stored token authorizes the request.
    #[serde(default, rename = "as")]
    pub principal: Option<String>,
    /// Explicit authorization value; wins over `principal`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    SignUp {
        username: String,
        password: String,
        role: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout,
    LogoutAll,
    GetUser,
    DeleteUser,
    ResetDeposit,
    Deposit {
        coins: Vec<i64>,
    },
    CreateProduct {
        name: String,
        available: u64,
        cost: u64,
        #[serde(default)]
        label: Option<String>,
    },
    ListProducts,
    GetProduct {
        id: String,
    },
    UpdateProduct {
        id: String,
        #[serde(flatten)]
        patch: ProductPatch,
    },
    DeleteProduct {
        id: String,
    },
    Buy {
        product_id: String,
        quantity: u64,
    },
}

/// Reads requests from a JSON Lines source.
///
/// Blank lines and lines starting with `#` are skipped. Every other line
/// yields its 1-based line number and either a request or the reason it
/// could not be parsed, so one bad line never stops the stream.
pub struct RequestReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn requests(self) -> impl Iterator<Item = (usize, Result<Request>)> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line_no = index + 1;
                match line {
                    Ok(line) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() || trimmed.starts_with('#') {
                            return None;
                        }
                        Some((line_no, parse(trimmed)))
                    }
                    Err(e) => Some((line_no, Err(VendingError::from(e)))),
                }
            })
    }
}

fn parse(line: &str) -> Result<Request> {
    serde_json::from_str(line)
        .map_err(|e| VendingError::ValidationError(format!("malformed request: {e}")))
}
