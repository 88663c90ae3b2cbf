use thiserror::Error;

use crate::codegen::CodeError;
use crate::models::InvalidInput;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("short link not found")]
    NotFound,
    #[error("short code is already taken")]
    CodeTaken,
    /// Caller may not touch another account's link. Rendered exactly like
    /// `NotFound` so the link's existence is not revealed.
    #[error("short link not found")]
    Forbidden,
    #[error("admin privileges required")]
    AdminRequired,
    #[error("authentication required")]
    Unauthorized,
    #[error("no free short code available, please retry")]
    CapacityExhausted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<InvalidInput> for ServiceError {
    fn from(e: InvalidInput) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<CodeError> for ServiceError {
    fn from(e: CodeError) -> Self {
        match e {
            CodeError::CodeTaken => ServiceError::CodeTaken,
            CodeError::CapacityExhausted(_) => ServiceError::CapacityExhausted,
            CodeError::Storage(inner) => ServiceError::Internal(inner),
        }
    }
}
