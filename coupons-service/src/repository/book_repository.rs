//! Book Repository: `coupon_books` CRUD and bulk code materialization.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::RepoError;
use crate::domain::{BookId, CouponBook, CouponCode, CouponSummary, NewCouponBook};

/// Result of a bulk-insert (upload or generate) call.
#[derive(Debug, Clone)]
pub struct BulkInsertOutcome {
    pub uploaded: i64,
    pub duplicates: i64,
    /// Codes that failed grammar validation before the transaction ever
    /// ran. The repository itself never rejects a code on format
    /// grounds — this is always populated by the caller.
    pub invalid: i64,
    pub new_total: i32,
    pub max_codes: Option<i32>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn create(&self, new_book: NewCouponBook) -> Result<CouponBook, RepoError>;
    async fn find_by_id(&self, book_id: BookId) -> Result<Option<CouponBook>, RepoError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CouponBook>, RepoError>;
    async fn deactivate(&self, book_id: BookId) -> Result<CouponBook, RepoError>;
    async fn list_coupons(
        &self,
        book_id: BookId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CouponSummary>, RepoError>;
    async fn bulk_insert_codes(
        &self,
        book_id: BookId,
        codes: &[CouponCode],
    ) -> Result<BulkInsertOutcome, RepoError>;
}

const INSERT_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone)]
pub struct PgBookRepository {
    pool: PgPool,
}

impl PgBookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn create(&self, new_book: NewCouponBook) -> Result<CouponBook, RepoError> {
        let metadata = new_book.metadata.unwrap_or_else(|| serde_json::json!({}));

        let book = sqlx::query_as::<_, CouponBook>(
            r#"
            INSERT INTO coupon_books (
                book_id, name, description, active, valid_from, valid_until,
                max_redemptions_per_user, max_assignments_per_user,
                code_pattern, max_codes, total_codes, metadata
            )
            VALUES ($1, $2, $3, true, $4, $5, $6, $7, $8, $9, 0, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_book.name)
        .bind(&new_book.description)
        .bind(new_book.valid_from)
        .bind(new_book.valid_until)
        .bind(new_book.max_redemptions_per_user)
        .bind(new_book.max_assignments_per_user)
        .bind(&new_book.code_pattern)
        .bind(new_book.max_codes)
        .bind(&metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(book)
    }

    async fn find_by_id(&self, book_id: BookId) -> Result<Option<CouponBook>, RepoError> {
        let book = sqlx::query_as::<_, CouponBook>("SELECT * FROM coupon_books WHERE book_id = $1")
            .bind(book_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CouponBook>, RepoError> {
        let books = sqlx::query_as::<_, CouponBook>(
            "SELECT * FROM coupon_books ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn deactivate(&self, book_id: BookId) -> Result<CouponBook, RepoError> {
        let updated = sqlx::query_as::<_, CouponBook>(
            r#"
            UPDATE coupon_books
            SET active = false, updated_at = NOW()
            WHERE book_id = $1 AND active = true
            RETURNING *
            "#,
        )
        .bind(book_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(book) = updated {
            return Ok(book);
        }

        // Either missing or already inactive — distinguish to pick the
        // right error kind.
        match self.find_by_id(book_id).await? {
            Some(_) => Err(RepoError::Conflict("book already inactive".to_string())),
            None => Err(RepoError::NotFound(format!("book:{book_id}"))),
        }
    }

    async fn list_coupons(
        &self,
        book_id: BookId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CouponSummary>, RepoError> {
        let coupons = sqlx::query_as::<_, CouponSummary>(
            r#"
            SELECT code, status FROM coupons
            WHERE book_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(book_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(coupons)
    }

    async fn bulk_insert_codes(
        &self,
        book_id: BookId,
        codes: &[CouponCode],
    ) -> Result<BulkInsertOutcome, RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted_total: i64 = 0;

        for chunk in codes.chunks(INSERT_BATCH_SIZE) {
            let coupon_ids: Vec<Uuid> = chunk.iter().map(|_| Uuid::new_v4()).collect();
            let book_ids: Vec<Uuid> = vec![*book_id.as_uuid(); chunk.len()];
            let code_strs: Vec<String> = chunk.iter().map(|c| c.as_str().to_string()).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO coupons (coupon_id, book_id, code, status, version)
                SELECT t.coupon_id, t.book_id, t.code, 'available', 1
                FROM UNNEST($1::uuid[], $2::uuid[], $3::text[]) AS t(coupon_id, book_id, code)
                ON CONFLICT (code) DO NOTHING
                "#,
            )
            .bind(&coupon_ids)
            .bind(&book_ids)
            .bind(&code_strs)
            .execute(&mut *tx)
            .await?;

            inserted_total += result.rows_affected() as i64;
        }

        let book = sqlx::query_as::<_, CouponBook>(
            r#"
            UPDATE coupon_books
            SET total_codes = total_codes + $1, updated_at = NOW()
            WHERE book_id = $2
            RETURNING *
            "#,
        )
        .bind(inserted_total)
        .bind(book_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BulkInsertOutcome {
            uploaded: inserted_total,
            duplicates: codes.len() as i64 - inserted_total,
            invalid: 0,
            new_total: book.total_codes,
            max_codes: book.max_codes,
        })
    }
}
