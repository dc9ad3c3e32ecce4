use thiserror::Error;

/// Errors that can occur when talking to the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another order in the same tenant already carries this number.
    #[error("Order number {order_number} is already taken")]
    DuplicateOrderNumber { order_number: String },

    /// A persisted value could not be mapped back into a domain type.
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// The backend refused the operation for a reason other than the database driver.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
