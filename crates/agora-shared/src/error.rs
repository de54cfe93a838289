use thiserror::Error;

/// Failures reported by the remote data gateway.
///
/// Containers never inspect the kind beyond logging it; the view layer only
/// renders the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport or backend failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or invalid session.
    #[error("{0}")]
    Auth(String),

    /// A uniqueness or integrity rule rejected the write.
    #[error("{0}")]
    Constraint(String),

    /// A single-row fetch found nothing.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn not_authenticated() -> Self {
        Self::Auth(crate::constants::NOT_AUTHENTICATED.to_string())
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
