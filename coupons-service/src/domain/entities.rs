//! # Coupon Domain Entities
//!
//! Core domain entities for the coupon lifecycle engine.
//!
//! ## Entity Hierarchy
//!
//! ```text
//! CouponBook (aggregate root)
//!     └── Coupon
//!             └── CouponAssignment
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// ENUMS
// =============================================================================

/// Coupon lifecycle status.
///
/// `Expired` is never stored: it is derived at read time from
/// `now > book.valid_until` and is included here only so API responses
/// and `GetStatus` projections can report it alongside the stored
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Available,
    Assigned,
    Locked,
    Redeemed,
    Expired,
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponStatus::Available => write!(f, "available"),
            CouponStatus::Assigned => write!(f, "assigned"),
            CouponStatus::Locked => write!(f, "locked"),
            CouponStatus::Redeemed => write!(f, "redeemed"),
            CouponStatus::Expired => write!(f, "expired"),
        }
    }
}

// =============================================================================
// COUPON BOOK
// =============================================================================

/// A named collection of coupon codes sharing validity window and limits.
///
/// # Database Mapping
///
/// Maps to the `coupon_books` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CouponBook {
    pub book_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_redemptions_per_user: Option<i32>,
    pub max_assignments_per_user: Option<i32>,
    pub code_pattern: Option<String>,
    pub max_codes: Option<i32>,
    pub total_codes: i32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CouponBook {
    /// True once `now` has passed the book's validity window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// True while the book accepts assignments: active and inside the
    /// validity window.
    pub fn accepts_assignments(&self, now: DateTime<Utc>) -> bool {
        self.active && now >= self.valid_from && now <= self.valid_until
    }

    /// Remaining code slots before `max_codes` is hit, or `None` if the
    /// book has no cap.
    pub fn remaining_code_slots(&self) -> Option<i32> {
        self.max_codes.map(|max| (max - self.total_codes).max(0))
    }
}

/// Data required to create a new coupon book.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCouponBook {
    pub name: String,
    pub description: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_redemptions_per_user: Option<i32>,
    pub max_assignments_per_user: Option<i32>,
    pub code_pattern: Option<String>,
    pub max_codes: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

// =============================================================================
// COUPON
// =============================================================================

/// An individual coupon code drawn from a book.
///
/// # Database Mapping
///
/// Maps to the `coupons` table. `version` backs the optimistic
/// compare-and-set used by the redemption protocol's Layer D.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub coupon_id: Uuid,
    pub book_id: Uuid,
    pub code: String,
    pub status: CouponStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A `(code, status)` projection used by `ListCoupons`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CouponSummary {
    pub code: String,
    pub status: CouponStatus,
}

// =============================================================================
// COUPON ASSIGNMENT
// =============================================================================

/// A user's binding to a coupon, carrying redemption and lock state.
///
/// # Database Mapping
///
/// Maps to the `coupon_assignments` table. At most one row exists per
/// `(coupon_id, user_id)` pair, enforced by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CouponAssignment {
    pub assignment_id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: String,
    pub assigned_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redemption_count: i32,
    pub metadata: serde_json::Value,
}

impl CouponAssignment {
    /// True while the lock fields are present and the expiry is in the
    /// future relative to `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lock_expires_at, Some(expires) if expires > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assignment_with_lock(lock_expires_at: Option<DateTime<Utc>>) -> CouponAssignment {
        CouponAssignment {
            assignment_id: Uuid::new_v4(),
            coupon_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            assigned_at: Utc::now(),
            locked_at: lock_expires_at.map(|_| Utc::now()),
            lock_expires_at,
            redeemed_at: None,
            redemption_count: 0,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn is_locked_true_when_expiry_in_future() {
        let assignment = assignment_with_lock(Some(Utc::now() + Duration::seconds(60)));
        assert!(assignment.is_locked(Utc::now()));
    }

    #[test]
    fn is_locked_false_when_expiry_in_past() {
        let assignment = assignment_with_lock(Some(Utc::now() - Duration::seconds(60)));
        assert!(!assignment.is_locked(Utc::now()));
    }

    #[test]
    fn is_locked_false_when_never_locked() {
        let assignment = assignment_with_lock(None);
        assert!(!assignment.is_locked(Utc::now()));
    }
}
