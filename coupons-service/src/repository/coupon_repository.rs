//! Coupon Repository: assignment, locking, and redemption.
//!
//! Each public method is a complete unit of the concurrency protocol —
//! it opens its own transaction, takes the row lock the operation needs,
//! and commits or fails atomically. This keeps the locking semantics out
//! of the service layer and lets tests substitute an in-memory
//! [`CouponRepository`] that simulates "skip locked" / "no-wait" /
//! compare-and-set contention without a live Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::RepoError;
use crate::domain::{BookId, Coupon, CouponAssignment, CouponCode, CouponStatus};

#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    pub code: String,
    pub redeemed_at: DateTime<Utc>,
    pub redemption_count: i32,
    pub remaining: Option<i32>,
    pub fully_redeemed: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CouponStatusView {
    pub code: String,
    pub status: CouponStatus,
    pub valid_until: DateTime<Utc>,
    pub is_owner: bool,
    pub is_locked: bool,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub redemption_count: Option<i32>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCouponView {
    pub code: String,
    pub status: CouponStatus,
    pub book_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redemption_count: i32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepoError>;

    async fn count_assignments_for_user(
        &self,
        book_id: BookId,
        user_id: &str,
    ) -> Result<i64, RepoError>;

    async fn assign_random(
        &self,
        book_id: BookId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Coupon, CouponAssignment), RepoError>;

    async fn assign_specific(
        &self,
        code: &CouponCode,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Coupon, CouponAssignment), RepoError>;

    async fn lock(
        &self,
        code: &CouponCode,
        user_id: &str,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(Coupon, CouponAssignment), RepoError>;

    async fn unlock(
        &self,
        code: &CouponCode,
        user_id: &str,
    ) -> Result<(Coupon, CouponAssignment), RepoError>;

    async fn redeem(
        &self,
        code: &CouponCode,
        user_id: &str,
        now: DateTime<Utc>,
        metadata_patch: Option<Json>,
        max_redemptions_per_user: Option<i32>,
    ) -> Result<RedeemOutcome, RepoError>;

    async fn get_status(
        &self,
        code: &CouponCode,
        user_id: &str,
    ) -> Result<Option<CouponStatusView>, RepoError>;

    async fn list_user_coupons(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserCouponView>, RepoError>;
}

#[derive(Debug, sqlx::FromRow)]
struct LockedCoupon {
    coupon_id: Uuid,
    status: CouponStatus,
}

#[derive(Debug, sqlx::FromRow)]
struct RedeemLockRow {
    coupon_id: Uuid,
    version: i64,
    status: CouponStatus,
    redemption_count: i32,
    metadata: Json,
}

/// Shallow-merges `patch` into `base` when both are JSON objects;
/// otherwise `patch` replaces `base`.
fn merge_metadata(base: Json, patch: Option<Json>) -> Json {
    match (base, patch) {
        (Json::Object(mut base_map), Some(Json::Object(patch_map))) => {
            for (k, v) in patch_map {
                base_map.insert(k, v);
            }
            Json::Object(base_map)
        }
        (base, None) => base,
        (_, Some(patch)) => patch,
    }
}

#[derive(Debug, Clone)]
pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepoError> {
        let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(coupon)
    }

    async fn count_assignments_for_user(
        &self,
        book_id: BookId,
        user_id: &str,
    ) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM coupon_assignments a
            JOIN coupons c ON c.coupon_id = a.coupon_id
            WHERE c.book_id = $1 AND a.user_id = $2
            "#,
        )
        .bind(book_id.as_uuid())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn assign_random(
        &self,
        book_id: BookId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Coupon, CouponAssignment), RepoError> {
        let mut tx = self.pool.begin().await?;

        let picked = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT * FROM coupons
            WHERE book_id = $1 AND status = 'available'
            ORDER BY RANDOM()
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(book_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let picked = picked
            .ok_or_else(|| RepoError::Business("no available coupons in book".to_string()))?;

        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons SET status = 'assigned', version = version + 1, updated_at = NOW()
            WHERE coupon_id = $1
            RETURNING *
            "#,
        )
        .bind(picked.coupon_id)
        .fetch_one(&mut *tx)
        .await?;

        let assignment = sqlx::query_as::<_, CouponAssignment>(
            r#"
            INSERT INTO coupon_assignments (assignment_id, coupon_id, user_id, assigned_at, redemption_count, metadata)
            VALUES ($1, $2, $3, $4, 0, '{}'::jsonb)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(coupon.coupon_id)
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((coupon, assignment))
    }

    async fn assign_specific(
        &self,
        code: &CouponCode,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Coupon, CouponAssignment), RepoError> {
        let mut tx = self.pool.begin().await?;

        let existing =
            sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1 FOR UPDATE NOWAIT")
                .bind(code.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepoError::NotFound(format!("coupon:{code}")))?;

        if existing.status != CouponStatus::Available {
            return Err(RepoError::Business(format!("coupon {code} is not available")));
        }

        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons SET status = 'assigned', version = version + 1, updated_at = NOW()
            WHERE coupon_id = $1
            RETURNING *
            "#,
        )
        .bind(existing.coupon_id)
        .fetch_one(&mut *tx)
        .await?;

        let assignment = sqlx::query_as::<_, CouponAssignment>(
            r#"
            INSERT INTO coupon_assignments (assignment_id, coupon_id, user_id, assigned_at, redemption_count, metadata)
            VALUES ($1, $2, $3, $4, 0, '{}'::jsonb)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(coupon.coupon_id)
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((coupon, assignment))
    }

    async fn lock(
        &self,
        code: &CouponCode,
        user_id: &str,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(Coupon, CouponAssignment), RepoError> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query_as::<_, LockedCoupon>(
            r#"
            SELECT c.coupon_id, c.status
            FROM coupons c
            JOIN coupon_assignments a ON a.coupon_id = c.coupon_id
            WHERE c.code = $1 AND a.user_id = $2
            FOR UPDATE NOWAIT
            "#,
        )
        .bind(code.as_str())
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("coupon:{code} for user")))?;

        if !matches!(found.status, CouponStatus::Assigned | CouponStatus::Locked) {
            return Err(RepoError::Business(format!("coupon {code} is not assigned")));
        }

        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons SET status = 'locked', version = version + 1, updated_at = NOW()
            WHERE coupon_id = $1
            RETURNING *
            "#,
        )
        .bind(found.coupon_id)
        .fetch_one(&mut *tx)
        .await?;

        let assignment = sqlx::query_as::<_, CouponAssignment>(
            r#"
            UPDATE coupon_assignments
            SET locked_at = $1, lock_expires_at = $2
            WHERE coupon_id = $3 AND user_id = $4
            RETURNING *
            "#,
        )
        .bind(locked_at)
        .bind(expires_at)
        .bind(found.coupon_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((coupon, assignment))
    }

    async fn unlock(
        &self,
        code: &CouponCode,
        user_id: &str,
    ) -> Result<(Coupon, CouponAssignment), RepoError> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query_as::<_, LockedCoupon>(
            r#"
            SELECT c.coupon_id, c.status
            FROM coupons c
            JOIN coupon_assignments a ON a.coupon_id = c.coupon_id
            WHERE c.code = $1 AND a.user_id = $2
            FOR UPDATE NOWAIT
            "#,
        )
        .bind(code.as_str())
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("coupon:{code} for user")))?;

        if found.status != CouponStatus::Locked {
            return Err(RepoError::Business(format!("coupon {code} is not locked")));
        }

        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons SET status = 'assigned', version = version + 1, updated_at = NOW()
            WHERE coupon_id = $1
            RETURNING *
            "#,
        )
        .bind(found.coupon_id)
        .fetch_one(&mut *tx)
        .await?;

        let assignment = sqlx::query_as::<_, CouponAssignment>(
            r#"
            UPDATE coupon_assignments
            SET locked_at = NULL, lock_expires_at = NULL
            WHERE coupon_id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(found.coupon_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((coupon, assignment))
    }

    async fn redeem(
        &self,
        code: &CouponCode,
        user_id: &str,
        now: DateTime<Utc>,
        metadata_patch: Option<Json>,
        max_redemptions_per_user: Option<i32>,
    ) -> Result<RedeemOutcome, RepoError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_as::<_, RedeemLockRow>(
            r#"
            SELECT c.coupon_id, c.version, c.status, a.redemption_count, a.metadata
            FROM coupons c
            JOIN coupon_assignments a ON a.coupon_id = c.coupon_id
            WHERE c.code = $1 AND a.user_id = $2
            FOR UPDATE NOWAIT
            "#,
        )
        .bind(code.as_str())
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("coupon:{code} for user")))?;

        if !matches!(locked.status, CouponStatus::Assigned | CouponStatus::Locked) {
            return Err(RepoError::Business(format!("coupon {code} is not redeemable")));
        }

        let new_count = locked.redemption_count + 1;
        if let Some(max) = max_redemptions_per_user {
            if new_count > max {
                return Err(RepoError::Business(format!(
                    "redemption limit reached for coupon {code}"
                )));
            }
        }
        let fully_redeemed = max_redemptions_per_user
            .map(|max| new_count == max)
            .unwrap_or(false);
        let new_status = if fully_redeemed {
            CouponStatus::Redeemed
        } else {
            CouponStatus::Assigned
        };

        let cas = sqlx::query(
            r#"
            UPDATE coupons SET status = $1, version = version + 1, updated_at = NOW()
            WHERE coupon_id = $2 AND version = $3
            "#,
        )
        .bind(new_status)
        .bind(locked.coupon_id)
        .bind(locked.version)
        .execute(&mut *tx)
        .await?;

        if cas.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "coupon {code} version changed concurrently, retry"
            )));
        }

        let merged_metadata = merge_metadata(locked.metadata, metadata_patch);

        sqlx::query(
            r#"
            UPDATE coupon_assignments
            SET redemption_count = $1, redeemed_at = $2,
                locked_at = NULL, lock_expires_at = NULL, metadata = $3
            WHERE coupon_id = $4 AND user_id = $5
            "#,
        )
        .bind(new_count)
        .bind(now)
        .bind(&merged_metadata)
        .bind(locked.coupon_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RedeemOutcome {
            code: code.as_str().to_string(),
            redeemed_at: now,
            redemption_count: new_count,
            remaining: max_redemptions_per_user.map(|max| (max - new_count).max(0)),
            fully_redeemed,
        })
    }

    async fn get_status(
        &self,
        code: &CouponCode,
        user_id: &str,
    ) -> Result<Option<CouponStatusView>, RepoError> {
        let view = sqlx::query_as::<_, CouponStatusView>(
            r#"
            SELECT
                c.code,
                c.status,
                b.valid_until,
                (a.assignment_id IS NOT NULL) AS is_owner,
                (a.lock_expires_at IS NOT NULL AND a.lock_expires_at > NOW()) AS is_locked,
                a.lock_expires_at,
                a.redemption_count,
                a.redeemed_at
            FROM coupons c
            JOIN coupon_books b ON b.book_id = c.book_id
            LEFT JOIN coupon_assignments a ON a.coupon_id = c.coupon_id AND a.user_id = $2
            WHERE c.code = $1
            "#,
        )
        .bind(code.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(view)
    }

    async fn list_user_coupons(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserCouponView>, RepoError> {
        let views = sqlx::query_as::<_, UserCouponView>(
            r#"
            SELECT
                c.code, c.status, c.book_id,
                a.assigned_at, a.locked_at, a.lock_expires_at,
                a.redeemed_at, a.redemption_count
            FROM coupon_assignments a
            JOIN coupons c ON c.coupon_id = a.coupon_id
            WHERE a.user_id = $1
            ORDER BY a.assigned_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_metadata_overlays_patch_keys() {
        let base = serde_json::json!({"source": "campaign", "tier": "gold"});
        let patch = Some(serde_json::json!({"tier": "platinum", "channel": "email"}));
        let merged = merge_metadata(base, patch);
        assert_eq!(merged["source"], "campaign");
        assert_eq!(merged["tier"], "platinum");
        assert_eq!(merged["channel"], "email");
    }

    #[test]
    fn merge_metadata_keeps_base_when_no_patch() {
        let base = serde_json::json!({"source": "campaign"});
        assert_eq!(merge_metadata(base.clone(), None), base);
    }
}
