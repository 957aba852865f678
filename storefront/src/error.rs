use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for storefront operations
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Every failure a storefront service can hand back to its caller
#[derive(Error, Debug)]
pub enum StorefrontError {
    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Purchase status outside pending/completed/cancelled
    #[error("Invalid purchase status '{0}', expected one of pending, completed, cancelled")]
    InvalidStatus(String),

    /// No row matched the lookup
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Purchase references a product that does not exist
    #[error("Product {0} not found")]
    ProductNotFound(i64),

    /// Username already registered
    #[error("Username '{0}' already registered")]
    DuplicateUsername(String),

    /// Unknown username or wrong password
    #[error("Invalid credentials")]
    Authentication,

    /// Session token failed signature, shape or expiry checks
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Not enough stock to cover the requested quantity
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    /// Stock kept changing underneath the reservation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The remote table store failed or answered with garbage
    #[error("Upstream store error: {0}")]
    Upstream(#[from] StoreError),

    /// Anything else that should never reach a client verbatim
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorefrontError {
    /// Create a new validation error
    pub fn validation<T: ToString>(message: T) -> Self {
        Self::Validation(message.to_string())
    }

    /// Create a new internal error
    pub fn internal<T: ToString>(message: T) -> Self {
        Self::Internal(message.to_string())
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidStatus(_) => "INVALID_STATUS",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            Self::Authentication => "AUTHENTICATION_FAILED",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Conflict(_) => "CONFLICT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors caused by the server side rather than the request
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let errors = [
            StorefrontError::validation("x"),
            StorefrontError::InvalidStatus("shipped".into()),
            StorefrontError::NotFound { entity: "Purchase", id: 1 },
            StorefrontError::ProductNotFound(1),
            StorefrontError::DuplicateUsername("alice".into()),
            StorefrontError::Authentication,
            StorefrontError::InvalidToken("expired".into()),
            StorefrontError::InsufficientStock { product_id: 1, requested: 3, available: 2 },
            StorefrontError::Conflict("busy".into()),
            StorefrontError::Upstream(StoreError::Malformed("bad".into())),
            StorefrontError::internal("boom"),
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_server_errors() {
        assert!(StorefrontError::internal("boom").is_server_error());
        assert!(StorefrontError::Upstream(StoreError::Unfiltered).is_server_error());
        assert!(!StorefrontError::Authentication.is_server_error());
        assert!(!StorefrontError::ProductNotFound(7).is_server_error());
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = StorefrontError::InsufficientStock { product_id: 4, requested: 3, available: 2 };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 4: requested 3, available 2"
        );
    }
}
