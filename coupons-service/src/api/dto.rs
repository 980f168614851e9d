//! # DTOs
//!
//! Request and response data transfer objects for the coupon API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{Coupon, CouponAssignment, CouponBook, CouponStatus, CouponSummary};
use crate::repository::{BulkInsertOutcome, CouponStatusView, RedeemOutcome, UserCouponView};

// =============================================================================
// COUPON BOOK DTOs
// =============================================================================

/// Request to create a new coupon book.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookRequest {
    #[validate(length(min = 1, max = 200), custom(function = "shared::validation::validators::not_blank"))]
    pub name: String,
    pub description: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub max_redemptions_per_user: Option<i32>,
    #[validate(range(min = 1))]
    pub max_assignments_per_user: Option<i32>,
    pub code_pattern: Option<String>,
    #[validate(range(min = 1))]
    pub max_codes: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// Request to upload a fixed list of codes into a book.
///
/// Individual codes are not grammar-validated here: a malformed code is
/// not a bad request, it's an item the service layer counts as
/// `invalid` while still inserting the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadCodesRequest {
    #[validate(length(min = 1))]
    pub codes: Vec<String>,
}

/// Request to server-generate codes for a pattern-backed book.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerateCodesRequest {
    #[validate(range(min = 1))]
    pub count: usize,
}

/// Coupon book response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookResponse {
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
    pub remaining_code_slots: Option<i32>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CouponBook> for BookResponse {
    fn from(b: CouponBook) -> Self {
        let remaining_code_slots = b.remaining_code_slots();
        Self {
            book_id: b.book_id,
            name: b.name,
            description: b.description,
            active: b.active,
            valid_from: b.valid_from,
            valid_until: b.valid_until,
            max_redemptions_per_user: b.max_redemptions_per_user,
            max_assignments_per_user: b.max_assignments_per_user,
            code_pattern: b.code_pattern,
            max_codes: b.max_codes,
            total_codes: b.total_codes,
            remaining_code_slots,
            metadata: b.metadata,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

/// Coupon summary response, used by `ListCoupons`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponSummaryResponse {
    pub code: String,
    pub status: CouponStatus,
}

impl From<CouponSummary> for CouponSummaryResponse {
    fn from(c: CouponSummary) -> Self {
        Self { code: c.code, status: c.status }
    }
}

/// Bulk insert outcome response, used by `UploadCodes`/`GenerateCodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkInsertResponse {
    pub uploaded: i64,
    pub duplicates: i64,
    pub invalid: i64,
    pub new_total: i32,
    pub max_codes: Option<i32>,
}

impl From<BulkInsertOutcome> for BulkInsertResponse {
    fn from(o: BulkInsertOutcome) -> Self {
        Self {
            uploaded: o.uploaded,
            duplicates: o.duplicates,
            invalid: o.invalid,
            new_total: o.new_total,
            max_codes: o.max_codes,
        }
    }
}

/// A page of results plus its pagination parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: i64,
    pub limit: i64,
}

/// Query parameters for paginated listings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PaginationQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20)
    }
}

// =============================================================================
// COUPON DTOs
// =============================================================================

/// Request to assign a random available coupon from a book.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignRandomRequest {
    pub book_id: Uuid,
}

/// Request to lock an assigned coupon for checkout.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct LockRequest {
    pub duration_seconds: Option<u64>,
}

/// Request to redeem a coupon, optionally merging metadata into the
/// assignment record.
#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct RedeemRequest {
    pub metadata: Option<serde_json::Value>,
}

/// Coupon + assignment response, used by assign/lock/unlock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponAssignmentResponse {
    pub coupon_id: Uuid,
    pub code: String,
    pub status: CouponStatus,
    pub user_id: String,
    pub assigned_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redemption_count: i32,
}

impl From<(Coupon, CouponAssignment)> for CouponAssignmentResponse {
    fn from((coupon, assignment): (Coupon, CouponAssignment)) -> Self {
        Self {
            coupon_id: coupon.coupon_id,
            code: coupon.code,
            status: coupon.status,
            user_id: assignment.user_id,
            assigned_at: assignment.assigned_at,
            locked_at: assignment.locked_at,
            lock_expires_at: assignment.lock_expires_at,
            redeemed_at: assignment.redeemed_at,
            redemption_count: assignment.redemption_count,
        }
    }
}

/// Redemption outcome response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub code: String,
    pub redeemed_at: DateTime<Utc>,
    pub redemption_count: i32,
    pub remaining: Option<i32>,
    pub fully_redeemed: bool,
}

impl From<RedeemOutcome> for RedeemResponse {
    fn from(o: RedeemOutcome) -> Self {
        Self {
            code: o.code,
            redeemed_at: o.redeemed_at,
            redemption_count: o.redemption_count,
            remaining: o.remaining,
            fully_redeemed: o.fully_redeemed,
        }
    }
}

/// `GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponStatusResponse {
    pub code: String,
    pub status: CouponStatus,
    pub valid_until: DateTime<Utc>,
    pub is_owner: bool,
    pub is_locked: bool,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub redemption_count: Option<i32>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl From<CouponStatusView> for CouponStatusResponse {
    fn from(v: CouponStatusView) -> Self {
        Self {
            code: v.code,
            status: v.status,
            valid_until: v.valid_until,
            is_owner: v.is_owner,
            is_locked: v.is_locked,
            lock_expires_at: v.lock_expires_at,
            redemption_count: v.redemption_count,
            redeemed_at: v.redeemed_at,
        }
    }
}

/// `GetUserCoupons` row response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCouponResponse {
    pub code: String,
    pub status: CouponStatus,
    pub book_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redemption_count: i32,
}

impl From<UserCouponView> for UserCouponResponse {
    fn from(v: UserCouponView) -> Self {
        Self {
            code: v.code,
            status: v.status,
            book_id: v.book_id,
            assigned_at: v.assigned_at,
            locked_at: v.locked_at,
            lock_expires_at: v.lock_expires_at,
            redeemed_at: v.redeemed_at,
            redemption_count: v.redemption_count,
        }
    }
}
