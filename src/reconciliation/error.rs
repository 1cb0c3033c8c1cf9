use sea_orm::error::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Failures of a reconciliation attempt.
///
/// `InvalidEntry`, `TooManyEntries` and `InvariantViolation` are produced before
/// any store access. The remaining variants only come out of the plan executor.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid entry at index {index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("Too many entries: {actual} exceeds the limit of {limit}")]
    TooManyEntries { limit: usize, actual: usize },

    #[error("Reconciliation invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Concurrent edit of product {0}; refetch and retry")]
    ConflictingConcurrentEdit(Uuid),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Store error: {0}")]
    Store(DbErr),
}

impl ReconcileError {
    pub fn invalid_entry(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            index,
            reason: reason.into(),
        }
    }

    /// Reads a lock or serialization failure on `product_id` as losing the
    /// race for that product.
    pub fn for_product(self, product_id: Uuid) -> Self {
        match self {
            Self::Store(err) if crate::db::is_write_conflict(&err) => {
                Self::ConflictingConcurrentEdit(product_id)
            }
            other => other,
        }
    }

    /// Whether rerunning the whole reconciliation (snapshot, plan, apply) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::ConflictingConcurrentEdit(_)
        )
    }
}

impl From<DbErr> for ReconcileError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(e) => Self::StoreUnavailable(e.to_string()),
            DbErr::Conn(e) => Self::StoreUnavailable(e.to_string()),
            other => Self::Store(other),
        }
    }
}
