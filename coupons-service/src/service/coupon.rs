//! # Coupon Service
//!
//! Owns assignment, reservation, and redemption of individual coupons.
//! Coordinates the cache plane (short-circuit concurrency control) and
//! the persistence plane (authoritative state transition) to provide
//! at-most-one-winner semantics under concurrent access.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value as Json;
use shared::config::CouponConfig;

use crate::cache::CachePlane;
use crate::domain::{BookId, Coupon, CouponAssignment, CouponCode};
use crate::repository::{BookRepository, CouponRepository, CouponStatusView, RedeemOutcome, UserCouponView};

use super::error::{paginate, CouponError};

const MIN_LOCK_SECONDS: u64 = 30;
const MAX_LOCK_SECONDS: u64 = 600;

const FEATURE_LOCK: &str = "coupon-lock";
const FEATURE_REDEEM: &str = "coupon-redeem";

#[derive(Clone)]
pub struct CouponService {
    coupons: Arc<dyn CouponRepository>,
    books: Arc<dyn BookRepository>,
    cache: Arc<dyn CachePlane>,
    config: CouponConfig,
}

impl CouponService {
    pub fn new(
        coupons: Arc<dyn CouponRepository>,
        books: Arc<dyn BookRepository>,
        cache: Arc<dyn CachePlane>,
        config: CouponConfig,
    ) -> Self {
        Self { coupons, books, cache, config }
    }

    pub async fn assign_random(
        &self,
        book_id: BookId,
        user_id: &str,
    ) -> Result<(Coupon, CouponAssignment), CouponError> {
        let now = Utc::now();
        let book = self
            .books
            .find_by_id(book_id)
            .await?
            .ok_or_else(|| CouponError::NotFound(format!("book:{book_id}")))?;

        if !book.accepts_assignments(now) {
            return Err(CouponError::Business(
                "book is not active or outside its validity window".to_string(),
            ));
        }

        if let Some(max) = book.max_assignments_per_user {
            let existing = self.coupons.count_assignments_for_user(book_id, user_id).await?;
            if existing >= max as i64 {
                return Err(CouponError::Business(
                    "user has reached the maximum assignments for this book".to_string(),
                ));
            }
        }

        Ok(self.coupons.assign_random(book_id, user_id, now).await?)
    }

    pub async fn assign_specific(
        &self,
        raw_code: &str,
        user_id: &str,
    ) -> Result<(Coupon, CouponAssignment), CouponError> {
        let now = Utc::now();
        let code = CouponCode::parse(raw_code)?;

        let existing = self
            .coupons
            .find_by_code(&code)
            .await?
            .ok_or_else(|| CouponError::NotFound(format!("coupon:{code}")))?;
        let book_id = BookId::from_uuid(existing.book_id);
        let book = self
            .books
            .find_by_id(book_id)
            .await?
            .ok_or_else(|| CouponError::Internal(format!("coupon {code} references missing book")))?;

        if !book.accepts_assignments(now) {
            return Err(CouponError::Business(
                "book is not active or outside its validity window".to_string(),
            ));
        }

        if let Some(max) = book.max_assignments_per_user {
            let count = self.coupons.count_assignments_for_user(book_id, user_id).await?;
            if count >= max as i64 {
                return Err(CouponError::Business(
                    "user has reached the maximum assignments for this book".to_string(),
                ));
            }
        }

        Ok(self.coupons.assign_specific(&code, user_id, now).await?)
    }

    pub async fn lock(
        &self,
        raw_code: &str,
        user_id: &str,
        duration_seconds: Option<u64>,
    ) -> Result<(Coupon, CouponAssignment), CouponError> {
        let code = CouponCode::parse(raw_code)?;
        let duration = duration_seconds.unwrap_or(self.config.default_lock_duration_seconds);
        if duration_seconds.is_some() && !(MIN_LOCK_SECONDS..=MAX_LOCK_SECONDS).contains(&duration) {
            return Err(CouponError::Validation(format!(
                "lock duration must be between {MIN_LOCK_SECONDS} and {MAX_LOCK_SECONDS} seconds"
            )));
        }

        let acquired = self
            .cache
            .acquire_lock(FEATURE_LOCK, code.as_str(), StdDuration::from_secs(duration))
            .await;
        if !acquired {
            return Err(CouponError::Conflict(format!("coupon {code} is currently locked")));
        }

        let now = Utc::now();
        let expires_at = now + ChronoDuration::seconds(duration as i64);
        let result = self.coupons.lock(&code, user_id, now, expires_at).await;

        self.cache.release_lock(FEATURE_LOCK, code.as_str()).await;

        Ok(result?)
    }

    pub async fn unlock(
        &self,
        raw_code: &str,
        user_id: &str,
    ) -> Result<(Coupon, CouponAssignment), CouponError> {
        let code = CouponCode::parse(raw_code)?;
        Ok(self.coupons.unlock(&code, user_id).await?)
    }

    pub async fn redeem(
        &self,
        raw_code: &str,
        user_id: &str,
        metadata_patch: Option<Json>,
    ) -> Result<RedeemOutcome, CouponError> {
        let code = CouponCode::parse(raw_code)?;
        let dedup_resource = format!("{code}:{user_id}");

        let claimed_dedup = self
            .cache
            .set_dedup(
                FEATURE_REDEEM,
                &dedup_resource,
                StdDuration::from_secs(self.config.dedup_ttl_seconds),
            )
            .await;
        if !claimed_dedup {
            return Err(CouponError::Conflict(format!(
                "redemption already in progress for coupon {code}"
            )));
        }

        let result = self.redeem_with_lock(&code, user_id, &dedup_resource, metadata_patch).await;

        self.cache.clear_dedup(FEATURE_REDEEM, &dedup_resource).await;
        result
    }

    async fn redeem_with_lock(
        &self,
        code: &CouponCode,
        user_id: &str,
        lock_resource: &str,
        metadata_patch: Option<Json>,
    ) -> Result<RedeemOutcome, CouponError> {
        let acquired = self
            .cache
            .acquire_lock(
                FEATURE_REDEEM,
                lock_resource,
                StdDuration::from_secs(self.config.redemption_lock_ttl_seconds),
            )
            .await;
        if !acquired {
            return Err(CouponError::Conflict(format!(
                "redemption already in progress for coupon {code}"
            )));
        }

        let result = self.redeem_in_transaction(code, user_id, metadata_patch).await;

        self.cache.release_lock(FEATURE_REDEEM, lock_resource).await;
        result
    }

    async fn redeem_in_transaction(
        &self,
        code: &CouponCode,
        user_id: &str,
        metadata_patch: Option<Json>,
    ) -> Result<RedeemOutcome, CouponError> {
        let coupon = self
            .coupons
            .find_by_code(code)
            .await?
            .ok_or_else(|| CouponError::NotFound(format!("coupon:{code}")))?;
        let book = self
            .books
            .find_by_id(BookId::from_uuid(coupon.book_id))
            .await?
            .ok_or_else(|| CouponError::Internal(format!("coupon {code} references missing book")))?;

        let now = Utc::now();
        Ok(self
            .coupons
            .redeem(code, user_id, now, metadata_patch, book.max_redemptions_per_user)
            .await?)
    }

    pub async fn get_status(
        &self,
        raw_code: &str,
        user_id: &str,
    ) -> Result<CouponStatusView, CouponError> {
        let code = CouponCode::parse(raw_code)?;
        self.coupons
            .get_status(&code, user_id)
            .await?
            .ok_or_else(|| CouponError::NotFound(format!("coupon:{code}")))
    }

    pub async fn get_user_coupons(
        &self,
        user_id: &str,
        page: i64,
        limit: i64,
    ) -> Result<Vec<UserCouponView>, CouponError> {
        let (limit, offset) = paginate(page, limit);
        Ok(self.coupons.list_user_coupons(user_id, limit, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockCachePlane;
    use crate::domain::{CouponBook, CouponStatus};
    use crate::repository::{MockBookRepository, MockCouponRepository, RepoError};
    use chrono::Duration as ChDuration;

    fn test_config() -> CouponConfig {
        CouponConfig {
            default_lock_duration_seconds: 300,
            redemption_lock_ttl_seconds: 10,
            dedup_ttl_seconds: 60,
            code_batch_size: 5000,
        }
    }

    fn active_book(book_id: BookId, max_assignments: Option<i32>) -> CouponBook {
        CouponBook {
            book_id: *book_id.as_uuid(),
            name: "Summer Sale".to_string(),
            description: None,
            active: true,
            valid_from: Utc::now() - ChDuration::days(1),
            valid_until: Utc::now() + ChDuration::days(30),
            max_redemptions_per_user: Some(1),
            max_assignments_per_user: max_assignments,
            code_pattern: None,
            max_codes: None,
            total_codes: 10,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_coupon(book_id: BookId, status: CouponStatus) -> Coupon {
        Coupon {
            coupon_id: uuid::Uuid::new_v4(),
            book_id: *book_id.as_uuid(),
            code: "SUMMER24-ABCD".to_string(),
            status,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_assignment(coupon_id: uuid::Uuid, user_id: &str) -> CouponAssignment {
        CouponAssignment {
            assignment_id: uuid::Uuid::new_v4(),
            coupon_id,
            user_id: user_id.to_string(),
            assigned_at: Utc::now(),
            locked_at: None,
            lock_expires_at: None,
            redeemed_at: None,
            redemption_count: 0,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn assign_random_fails_when_book_outside_validity_window() {
        let book_id = BookId::new();
        let mut books = MockBookRepository::new();
        let mut book = active_book(book_id, None);
        book.valid_until = Utc::now() - ChDuration::days(1);
        books.expect_find_by_id().returning(move |_| Ok(Some(book.clone())));

        let coupons = MockCouponRepository::new();
        let cache = MockCachePlane::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.assign_random(book_id, "user-1").await.unwrap_err();
        assert!(matches!(err, CouponError::Business(_)));
    }

    #[tokio::test]
    async fn assign_random_fails_when_user_at_assignment_limit() {
        let book_id = BookId::new();
        let mut books = MockBookRepository::new();
        let book = active_book(book_id, Some(1));
        books.expect_find_by_id().returning(move |_| Ok(Some(book.clone())));

        let mut coupons = MockCouponRepository::new();
        coupons.expect_count_assignments_for_user().returning(|_, _| Ok(1));

        let cache = MockCachePlane::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.assign_random(book_id, "user-1").await.unwrap_err();
        assert!(matches!(err, CouponError::Business(_)));
    }

    #[tokio::test]
    async fn assign_random_succeeds_within_limit() {
        let book_id = BookId::new();
        let mut books = MockBookRepository::new();
        let book = active_book(book_id, Some(3));
        books.expect_find_by_id().returning(move |_| Ok(Some(book.clone())));

        let mut coupons = MockCouponRepository::new();
        coupons.expect_count_assignments_for_user().returning(|_, _| Ok(1));
        coupons.expect_assign_random().returning(move |bid, uid, _now| {
            let coupon = sample_coupon(bid, CouponStatus::Assigned);
            let assignment = sample_assignment(coupon.coupon_id, uid);
            Ok((coupon, assignment))
        });

        let cache = MockCachePlane::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let (coupon, assignment) = service.assign_random(book_id, "user-1").await.unwrap();
        assert_eq!(coupon.status, CouponStatus::Assigned);
        assert_eq!(assignment.user_id, "user-1");
    }

    #[tokio::test]
    async fn lock_fails_and_does_not_touch_repository_when_cache_lock_contended() {
        let mut cache = MockCachePlane::new();
        cache.expect_acquire_lock().returning(|_, _, _| false);

        let coupons = MockCouponRepository::new();
        let books = MockBookRepository::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.lock("SUMMER24-ABCD", "user-1", None).await.unwrap_err();
        assert!(matches!(err, CouponError::Conflict(_)));
    }

    #[tokio::test]
    async fn lock_releases_cache_lock_even_when_repository_fails() {
        let mut cache = MockCachePlane::new();
        cache.expect_acquire_lock().returning(|_, _, _| true);
        cache.expect_release_lock().times(1).returning(|_, _| ());

        let mut coupons = MockCouponRepository::new();
        coupons
            .expect_lock()
            .returning(|_, _, _, _| Err(RepoError::Business("coupon is not assigned".to_string())));

        let books = MockBookRepository::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.lock("SUMMER24-ABCD", "user-1", None).await.unwrap_err();
        assert!(matches!(err, CouponError::Business(_)));
    }

    #[tokio::test]
    async fn lock_rejects_out_of_range_duration() {
        let cache = MockCachePlane::new();
        let coupons = MockCouponRepository::new();
        let books = MockBookRepository::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.lock("SUMMER24-ABCD", "user-1", Some(10)).await.unwrap_err();
        assert!(matches!(err, CouponError::Validation(_)));
    }

    #[tokio::test]
    async fn redeem_fails_immediately_when_dedup_flag_already_set() {
        let mut cache = MockCachePlane::new();
        cache.expect_set_dedup().returning(|_, _, _| false);

        let coupons = MockCouponRepository::new();
        let books = MockBookRepository::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.redeem("SUMMER24-ABCD", "user-1", None).await.unwrap_err();
        assert!(matches!(err, CouponError::Conflict(_)));
    }

    #[tokio::test]
    async fn redeem_clears_dedup_flag_even_on_success() {
        let mut cache = MockCachePlane::new();
        cache.expect_set_dedup().returning(|_, _, _| true);
        cache.expect_acquire_lock().returning(|_, _, _| true);
        cache.expect_release_lock().returning(|_, _| ());
        cache.expect_clear_dedup().times(1).returning(|_, _| ());

        let book_id = BookId::new();
        let mut books = MockBookRepository::new();
        let book = active_book(book_id, None);
        books.expect_find_by_id().returning(move |_| Ok(Some(book.clone())));

        let mut coupons = MockCouponRepository::new();
        let coupon = sample_coupon(book_id, CouponStatus::Assigned);
        let coupon_for_find = coupon.clone();
        coupons.expect_find_by_code().returning(move |_| Ok(Some(coupon_for_find.clone())));
        coupons.expect_redeem().returning(|code, _, now, _, _| {
            Ok(RedeemOutcome {
                code: code.as_str().to_string(),
                redeemed_at: now,
                redemption_count: 1,
                remaining: Some(0),
                fully_redeemed: true,
            })
        });

        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let outcome = service.redeem("SUMMER24-ABCD", "user-1", None).await.unwrap();
        assert!(outcome.fully_redeemed);
        assert_eq!(outcome.redemption_count, 1);
    }

    #[tokio::test]
    async fn redeem_fails_when_redemption_lock_contended() {
        let mut cache = MockCachePlane::new();
        cache.expect_set_dedup().returning(|_, _, _| true);
        cache.expect_acquire_lock().returning(|_, _, _| false);
        cache.expect_clear_dedup().times(1).returning(|_, _| ());

        let coupons = MockCouponRepository::new();
        let books = MockBookRepository::new();
        let service = CouponService::new(Arc::new(coupons), Arc::new(books), Arc::new(cache), test_config());

        let err = service.redeem("SUMMER24-ABCD", "user-1", None).await.unwrap_err();
        assert!(matches!(err, CouponError::Conflict(_)));
    }
}
