/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use faultline_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "silence",
///     id: "sil-99".to_string(),
/// };
/// assert!(err.to_string().contains("silence"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (e.g. labels_json,
    /// routes_json columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
