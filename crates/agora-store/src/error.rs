use agora_shared::GatewayError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness rule rejected the write.
    #[error("{0}")]
    Duplicate(String),

    /// Email/password pair did not match an account.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Map `QueryReturnedNoRows` onto [`StoreError::NotFound`].
    pub(crate) fn or_not_found(e: rusqlite::Error, what: &'static str) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(what),
            other => StoreError::Sqlite(other),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => GatewayError::NotFound(what.to_string()),
            StoreError::Duplicate(msg) => GatewayError::Constraint(msg),
            StoreError::InvalidCredentials => {
                GatewayError::Auth("Invalid login credentials".to_string())
            }
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                GatewayError::Constraint(msg.unwrap_or_else(|| err.to_string()))
            }
            other => GatewayError::Network(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_gateway_not_found() {
        let e: GatewayError = StoreError::NotFound("community").into();
        assert_eq!(e, GatewayError::NotFound("community".into()));
    }

    #[test]
    fn bad_credentials_map_to_auth() {
        let e: GatewayError = StoreError::InvalidCredentials.into();
        assert!(matches!(e, GatewayError::Auth(_)));
    }
}
