use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Error type shared by all core services.
///
/// Validation failures are raised before any write; stock and payment
/// failures abort the surrounding transaction so no partial state survives.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(
        "Insufficient stock for item {stock_item_id} at branch {branch_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        stock_item_id: Uuid,
        branch_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Payments of {paid} exceed total {total} for order {order_id}")]
    PaymentExceedsTotal {
        order_id: Uuid,
        paid: Decimal,
        total: Decimal,
    },

    #[error("Invalid sequence kind: {0}")]
    InvalidSequenceKind(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error(error: sea_orm::error::DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// True for the error classes a caller may retry with corrected data.
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InsufficientStock { .. }
                | ServiceError::PaymentExceedsTotal { .. }
                | ServiceError::InvalidOperation(_)
                | ServiceError::InvalidSequenceKind(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<sea_orm::TransactionError<ServiceError>> for ServiceError {
    fn from(err: sea_orm::TransactionError<ServiceError>) -> Self {
        match err {
            sea_orm::TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            sea_orm::TransactionError::Transaction(service_err) => service_err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_stock_message_names_item_and_quantities() {
        let item = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let err = ServiceError::InsufficientStock {
            stock_item_id: item,
            branch_id: branch,
            requested: 5,
            available: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains(&item.to_string()));
        assert!(msg.contains("requested 5"));
        assert!(msg.contains("available 2"));
        assert!(err.is_business_error());
    }

    #[test]
    fn overpayment_message_names_amounts() {
        let err = ServiceError::PaymentExceedsTotal {
            order_id: Uuid::new_v4(),
            paid: dec!(1200),
            total: dec!(1000),
        };
        assert!(err.to_string().contains("1200"));
        assert!(err.is_business_error());
    }
}
