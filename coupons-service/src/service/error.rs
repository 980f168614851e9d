//! Service-layer error taxonomy, mirroring §7's error kinds
//! (Validation / NotFound / Conflict / Business / Internal) plus the two
//! code-generation failure modes. Handlers convert this into
//! `shared::errors::ApiError` for the HTTP response.

use shared::errors::ApiError;
use thiserror::Error;

use crate::codegen::CodegenError;
use crate::domain::InvalidCouponCode;
use crate::repository::RepoError;

#[derive(Debug, Error)]
pub enum CouponError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid code pattern: {0}")]
    PatternInvalid(String),

    #[error("pattern exhausted: produced {produced} of {requested} requested")]
    PatternExhausted { requested: usize, produced: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Business(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for CouponError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(resource) => CouponError::NotFound(resource),
            RepoError::Conflict(resource) => CouponError::Conflict(resource),
            RepoError::Business(message) => CouponError::Business(message),
            RepoError::Internal(message) => CouponError::Internal(message),
        }
    }
}

impl From<CodegenError> for CouponError {
    fn from(e: CodegenError) -> Self {
        match e {
            CodegenError::PatternInvalid { reason } => CouponError::PatternInvalid(reason),
            CodegenError::PatternExhausted { requested, produced } => {
                CouponError::PatternExhausted { requested, produced }
            }
        }
    }
}

impl From<InvalidCouponCode> for CouponError {
    fn from(e: InvalidCouponCode) -> Self {
        CouponError::Validation(e.to_string())
    }
}

impl From<CouponError> for ApiError {
    fn from(e: CouponError) -> Self {
        match e {
            CouponError::Validation(message) => ApiError::BadRequest { message },
            CouponError::PatternInvalid(reason) => ApiError::BadRequest { message: reason },
            CouponError::PatternExhausted { requested, produced } => ApiError::Business {
                message: format!(
                    "pattern exhausted: produced {produced} of {requested} requested unique codes"
                ),
            },
            CouponError::NotFound(resource) => ApiError::NotFound { resource },
            CouponError::Conflict(resource) => ApiError::Conflict { resource },
            CouponError::Business(message) => ApiError::Business { message },
            CouponError::Internal(message) => ApiError::InternalError { message },
        }
    }
}

/// Caps `limit` to the documented maximum and converts a 1-based `page`
/// into an offset.
pub fn paginate(page: i64, limit: i64) -> (i64, i64) {
    let limit = limit.clamp(1, 100);
    let page = page.max(1);
    (limit, (page - 1) * limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_clamps_limit_and_converts_page_to_offset() {
        assert_eq!(paginate(1, 20), (20, 0));
        assert_eq!(paginate(3, 20), (20, 40));
        assert_eq!(paginate(1, 500), (100, 0));
        assert_eq!(paginate(0, 20), (20, 0));
    }
}
