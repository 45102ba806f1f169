use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VendingError>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a request could not be authenticated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing authorization token")]
    MissingCredentials,
    #[error("account username/password is incorrect")]
    InvalidCredentials,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("session has been revoked")]
    RevokedSession,
}

#[derive(Error, Debug)]
pub enum VendingError {
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("username already taken: {0}")]
    DuplicateIdentity(String),
    #[error("there is already an active session for {0}")]
    SessionConflict(String),
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },
    #[error("coin not accepted: {0}")]
    InvalidCoin(i64),
    #[error("authentication failed: {0}")]
    AuthError(#[from] AuthFailure),
    #[error("storage error: {0}")]
    StorageError(#[source] BoxError),
}

/// Stable, machine-checkable error category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Forbidden,
    Conflict,
    InsufficientFunds,
    InsufficientStock,
    InvalidCoin,
    AuthError,
    InternalError,
}

impl VendingError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Wraps a plain message as an opaque storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::StorageError(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ValidationError(_) => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::DuplicateIdentity(_) | Self::SessionConflict(_) => ErrorCode::Conflict,
            Self::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Self::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            Self::InvalidCoin(_) => ErrorCode::InvalidCoin,
            Self::AuthError(_) => ErrorCode::AuthError,
            Self::StorageError(_) => ErrorCode::InternalError,
        }
    }

    /// Human-readable message safe to hand back to a caller.
    ///
    /// Storage failures are collapsed into a generic message so that no
    /// backend detail leaks out; everything else uses its `Display` form.
    pub fn public_message(&self) -> String {
        match self {
            Self::StorageError(_) => "failed to process the request".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for VendingError {
    fn from(err: serde_json::Error) -> Self {
        Self::StorageError(Box::new(err))
    }
}

impl From<std::io::Error> for VendingError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(Box::new(err))
    }
}

impl From<csv::Error> for VendingError {
    fn from(err: csv::Error) -> Self {
        Self::StorageError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for VendingError {
    fn from(err: rocksdb::Error) -> Self {
        Self::StorageError(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_share_a_code() {
        assert_eq!(
            VendingError::DuplicateIdentity("bob".into()).code(),
            ErrorCode::Conflict
        );
        assert_eq!(
            VendingError::SessionConflict("bob".into()).code(),
            ErrorCode::Conflict
        );
    }

    #[test]
    fn test_storage_errors_are_opaque() {
        let err = VendingError::storage("column family `users` not found");
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(!err.public_message().contains("column family"));
    }

    #[test]
    fn test_auth_failures_convert() {
        let err: VendingError = AuthFailure::RevokedSession.into();
        assert_eq!(err.code(), ErrorCode::AuthError);
        assert_eq!(
            err.public_message(),
            "authentication failed: session has been revoked"
        );
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InsufficientFunds).unwrap();
        assert_eq!(json, "\"insufficient_funds\"");
    }
}
