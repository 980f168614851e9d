//! # Persistence Plane
//!
//! PostgreSQL data access for coupon books, coupons, and assignments.
//! Implements the locking primitives the concurrency protocol depends
//! on: `FOR UPDATE SKIP LOCKED` for random assignment, `FOR UPDATE
//! NOWAIT` for targeted operations, bulk insert with conflict-ignore,
//! and optimistic compare-and-set on the coupon's `version` column.

pub mod book_repository;
pub mod coupon_repository;

pub use book_repository::{BookRepository, BulkInsertOutcome, PgBookRepository};
pub use coupon_repository::{
    CouponRepository, CouponStatusView, PgCouponRepository, RedeemOutcome, UserCouponView,
};

#[cfg(test)]
pub use book_repository::MockBookRepository;
#[cfg(test)]
pub use coupon_repository::MockCouponRepository;

use thiserror::Error;

/// Outcome of a repository operation, coarse enough to map directly onto
/// the service layer's error taxonomy without the service needing to
/// inspect `sqlx::Error` internals.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Business(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => return RepoError::Conflict(db_err.to_string()),
                // lock_not_available (FOR UPDATE NOWAIT contention)
                Some("55P03") => return RepoError::Conflict("row is locked".to_string()),
                _ => {}
            }
        }
        if matches!(e, sqlx::Error::RowNotFound) {
            return RepoError::NotFound("row not found".to_string());
        }
        RepoError::Internal(e.to_string())
    }
}
