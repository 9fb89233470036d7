use thiserror::Error;

/// Error taxonomy shared by every callable operation. Trigger and scheduler
/// paths recover from these locally; the API layer maps them to HTTP at the
/// boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable error code exposed to callers.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthenticated(_) => "unauthenticated",
            ServiceError::PermissionDenied(_) => "permission-denied",
            ServiceError::InvalidArgument(_) => "invalid-argument",
            ServiceError::NotFound(_) => "not-found",
            ServiceError::Internal(_) => "internal",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
