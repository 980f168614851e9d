//! # Book Service
//!
//! Owns the coupon book catalog and the bulk materialization of codes
//! (uploaded or server-generated) into the persistence plane.

use std::sync::Arc;

use crate::codegen::{generate_codes, max_unique_codes, CodePattern};
use crate::domain::{BookId, CouponBook, CouponCode, CouponSummary, NewCouponBook};
use crate::repository::{BookRepository, BulkInsertOutcome};

use super::error::{paginate, CouponError};

/// Codes accepted per `UploadCodes` call.
const MAX_UPLOAD_BATCH: usize = 10_000;

/// Generated counts may use at most this fraction of a pattern's
/// combinatorial space, per §4.1.
const MAX_PATTERN_UTILIZATION_NUM: u128 = 80;
const MAX_PATTERN_UTILIZATION_DEN: u128 = 100;

/// Splits raw code strings into those that pass [`CouponCode`] grammar
/// validation and a count of those that don't.
fn partition_valid_codes(raw_codes: &[String]) -> (Vec<CouponCode>, i64) {
    let mut valid = Vec::with_capacity(raw_codes.len());
    let mut invalid = 0i64;
    for raw in raw_codes {
        match CouponCode::parse(raw) {
            Ok(code) => valid.push(code),
            Err(_) => invalid += 1,
        }
    }
    (valid, invalid)
}

#[derive(Clone)]
pub struct BookService {
    books: Arc<dyn BookRepository>,
}

impl BookService {
    pub fn new(books: Arc<dyn BookRepository>) -> Self {
        Self { books }
    }

    pub async fn create_book(&self, spec: NewCouponBook) -> Result<CouponBook, CouponError> {
        if spec.valid_from >= spec.valid_until {
            return Err(CouponError::Validation(
                "valid_from must be strictly before valid_until".to_string(),
            ));
        }

        if let Some(pattern) = &spec.code_pattern {
            if spec.max_codes.is_none() {
                return Err(CouponError::Validation(
                    "max_codes is required when code_pattern is set".to_string(),
                ));
            }
            CodePattern::parse(pattern)?;
        }

        if let Some(max) = spec.max_codes {
            if max < 0 {
                return Err(CouponError::Validation("max_codes must be non-negative".to_string()));
            }
        }

        Ok(self.books.create(spec).await?)
    }

    pub async fn get_book(&self, book_id: BookId) -> Result<CouponBook, CouponError> {
        self.books
            .find_by_id(book_id)
            .await?
            .ok_or_else(|| CouponError::NotFound(format!("book:{book_id}")))
    }

    pub async fn list_books(&self, page: i64, limit: i64) -> Result<Vec<CouponBook>, CouponError> {
        let (limit, offset) = paginate(page, limit);
        Ok(self.books.list(limit, offset).await?)
    }

    pub async fn list_coupons(
        &self,
        book_id: BookId,
        page: i64,
        limit: i64,
    ) -> Result<Vec<CouponSummary>, CouponError> {
        self.get_book(book_id).await?;
        let (limit, offset) = paginate(page, limit);
        Ok(self.books.list_coupons(book_id, limit, offset).await?)
    }

    pub async fn deactivate_book(&self, book_id: BookId) -> Result<CouponBook, CouponError> {
        Ok(self.books.deactivate(book_id).await?)
    }

    pub async fn upload_codes(
        &self,
        book_id: BookId,
        raw_codes: Vec<String>,
    ) -> Result<BulkInsertOutcome, CouponError> {
        if raw_codes.is_empty() {
            return Err(CouponError::Validation("codes must not be empty".to_string()));
        }
        if raw_codes.len() > MAX_UPLOAD_BATCH {
            return Err(CouponError::Validation(format!(
                "cannot upload more than {MAX_UPLOAD_BATCH} codes per call"
            )));
        }

        let book = self.get_book(book_id).await?;
        if !book.active {
            return Err(CouponError::Business("book is not active".to_string()));
        }
        if book.code_pattern.is_some() {
            return Err(CouponError::Business(
                "book has a code pattern; use GenerateCodes instead".to_string(),
            ));
        }

        // Codes that fail grammar validation are dropped and counted
        // rather than failing the whole batch — the valid subset still
        // has to reach the transaction.
        let (codes, invalid) = partition_valid_codes(&raw_codes);

        if codes.is_empty() {
            return Ok(BulkInsertOutcome {
                uploaded: 0,
                duplicates: 0,
                invalid,
                new_total: book.total_codes,
                max_codes: book.max_codes,
            });
        }

        let mut outcome = self.books.bulk_insert_codes(book_id, &codes).await?;
        outcome.invalid = invalid;
        Ok(outcome)
    }

    pub async fn generate_codes(
        &self,
        book_id: BookId,
        count: usize,
    ) -> Result<BulkInsertOutcome, CouponError> {
        let book = self.get_book(book_id).await?;
        if !book.active {
            return Err(CouponError::Business("book is not active".to_string()));
        }

        let pattern_str = book.code_pattern.clone().ok_or_else(|| {
            CouponError::Business("book has no code pattern; use UploadCodes instead".to_string())
        })?;
        let max_codes = book.max_codes.ok_or_else(|| {
            CouponError::Internal("book has a code_pattern but no max_codes".to_string())
        })?;

        let remaining = (max_codes - book.total_codes).max(0) as usize;
        if remaining == 0 {
            return Err(CouponError::Business(
                "book has reached its maximum code count".to_string(),
            ));
        }

        let to_generate = count.min(remaining);
        let pattern = CodePattern::parse(&pattern_str)?;

        let max_unique = max_unique_codes(&pattern);
        if (to_generate as u128) * MAX_PATTERN_UTILIZATION_DEN
            > max_unique * MAX_PATTERN_UTILIZATION_NUM
        {
            return Err(CouponError::PatternInvalid(format!(
                "requested count {to_generate} exceeds {}% of the pattern's \
                 {max_unique}-code combinatorial space",
                MAX_PATTERN_UTILIZATION_NUM
            )));
        }

        let raw_codes = generate_codes(&pattern, to_generate)?;
        let codes = raw_codes
            .into_iter()
            .map(|raw| {
                CouponCode::parse(&raw).map_err(|_| {
                    CouponError::Internal(
                        "generated code failed CouponCode grammar; pattern and code length \
                         bounds are inconsistent"
                            .to_string(),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.books.bulk_insert_codes(book_id, &codes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockBookRepository;
    use chrono::{Duration, Utc};
    use mockall::predicate::*;

    fn new_book_spec(code_pattern: Option<&str>, max_codes: Option<i32>) -> NewCouponBook {
        NewCouponBook {
            name: "Summer Sale".to_string(),
            description: None,
            valid_from: Utc::now(),
            valid_until: Utc::now() + Duration::days(30),
            max_redemptions_per_user: Some(1),
            max_assignments_per_user: Some(1),
            code_pattern: code_pattern.map(|s| s.to_string()),
            max_codes,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_book_rejects_inverted_validity_window() {
        let repo = MockBookRepository::new();
        let service = BookService::new(Arc::new(repo));

        let mut spec = new_book_spec(None, None);
        spec.valid_until = spec.valid_from - Duration::days(1);

        let err = service.create_book(spec).await.unwrap_err();
        assert!(matches!(err, CouponError::Validation(_)));
    }

    #[tokio::test]
    async fn create_book_requires_max_codes_with_pattern() {
        let repo = MockBookRepository::new();
        let service = BookService::new(Arc::new(repo));

        let spec = new_book_spec(Some("SAVE-{XXXX}"), None);
        let err = service.create_book(spec).await.unwrap_err();
        assert!(matches!(err, CouponError::Validation(_)));
    }

    #[tokio::test]
    async fn create_book_rejects_unparseable_pattern() {
        let repo = MockBookRepository::new();
        let service = BookService::new(Arc::new(repo));

        let spec = new_book_spec(Some("NOPLACEHOLDER"), Some(100));
        let err = service.create_book(spec).await.unwrap_err();
        assert!(matches!(err, CouponError::PatternInvalid(_)));
    }

    #[tokio::test]
    async fn upload_codes_rejects_book_with_pattern() {
        let mut repo = MockBookRepository::new();
        let book_id = BookId::new();
        repo.expect_find_by_id().returning(move |_| {
            Ok(Some(CouponBook {
                book_id: *book_id.as_uuid(),
                name: "Summer".to_string(),
                description: None,
                active: true,
                valid_from: Utc::now() - Duration::days(1),
                valid_until: Utc::now() + Duration::days(1),
                max_redemptions_per_user: None,
                max_assignments_per_user: None,
                code_pattern: Some("SAVE-{XXXX}".to_string()),
                max_codes: Some(100),
                total_codes: 0,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        let service = BookService::new(Arc::new(repo));

        let err = service
            .upload_codes(book_id, vec!["SUMMER24".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CouponError::Business(_)));
    }

    #[tokio::test]
    async fn generate_codes_rejects_book_without_pattern() {
        let mut repo = MockBookRepository::new();
        let book_id = BookId::new();
        repo.expect_find_by_id().returning(move |_| {
            Ok(Some(CouponBook {
                book_id: *book_id.as_uuid(),
                name: "Summer".to_string(),
                description: None,
                active: true,
                valid_from: Utc::now() - Duration::days(1),
                valid_until: Utc::now() + Duration::days(1),
                max_redemptions_per_user: None,
                max_assignments_per_user: None,
                code_pattern: None,
                max_codes: None,
                total_codes: 0,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        let service = BookService::new(Arc::new(repo));

        let err = service.generate_codes(book_id, 10).await.unwrap_err();
        assert!(matches!(err, CouponError::Business(_)));
    }

    #[tokio::test]
    async fn generate_codes_clamps_to_remaining_slots() {
        let mut repo = MockBookRepository::new();
        let book_id = BookId::new();
        repo.expect_find_by_id().returning(move |_| {
            Ok(Some(CouponBook {
                book_id: *book_id.as_uuid(),
                name: "Summer".to_string(),
                description: None,
                active: true,
                valid_from: Utc::now() - Duration::days(1),
                valid_until: Utc::now() + Duration::days(1),
                max_redemptions_per_user: None,
                max_assignments_per_user: None,
                code_pattern: Some("{XXXXXXXX}".to_string()),
                max_codes: Some(100),
                total_codes: 95,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        repo.expect_bulk_insert_codes()
            .withf(|_, codes| codes.len() == 5)
            .returning(|_, codes| {
                Ok(BulkInsertOutcome {
                    uploaded: codes.len() as i64,
                    duplicates: 0,
                    invalid: 0,
                    new_total: 100,
                    max_codes: Some(100),
                })
            });
        let service = BookService::new(Arc::new(repo));

        let outcome = service.generate_codes(book_id, 50).await.unwrap();
        assert_eq!(outcome.uploaded, 5);
    }

    #[tokio::test]
    async fn upload_codes_filters_invalid_codes_and_inserts_the_rest() {
        let mut repo = MockBookRepository::new();
        let book_id = BookId::new();
        repo.expect_find_by_id().returning(move |_| {
            Ok(Some(CouponBook {
                book_id: *book_id.as_uuid(),
                name: "Summer".to_string(),
                description: None,
                active: true,
                valid_from: Utc::now() - Duration::days(1),
                valid_until: Utc::now() + Duration::days(1),
                max_redemptions_per_user: None,
                max_assignments_per_user: None,
                code_pattern: None,
                max_codes: None,
                total_codes: 0,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        repo.expect_bulk_insert_codes()
            .withf(|_, codes| codes.len() == 1)
            .returning(|_, codes| {
                Ok(BulkInsertOutcome {
                    uploaded: codes.len() as i64,
                    duplicates: 0,
                    invalid: 0,
                    new_total: 1,
                    max_codes: None,
                })
            });
        let service = BookService::new(Arc::new(repo));

        let outcome = service
            .upload_codes(book_id, vec!["SUMMER24".to_string(), "bad".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.uploaded, 1);
        assert_eq!(outcome.invalid, 1);
    }

    #[tokio::test]
    async fn upload_codes_all_invalid_skips_repository_and_reports_invalid_count() {
        let mut repo = MockBookRepository::new();
        let book_id = BookId::new();
        repo.expect_find_by_id().returning(move |_| {
            Ok(Some(CouponBook {
                book_id: *book_id.as_uuid(),
                name: "Summer".to_string(),
                description: None,
                active: true,
                valid_from: Utc::now() - Duration::days(1),
                valid_until: Utc::now() + Duration::days(1),
                max_redemptions_per_user: None,
                max_assignments_per_user: None,
                code_pattern: None,
                max_codes: None,
                total_codes: 0,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        repo.expect_bulk_insert_codes().times(0);
        let service = BookService::new(Arc::new(repo));

        let outcome = service
            .upload_codes(book_id, vec!["bad".to_string(), "also bad".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.uploaded, 0);
        assert_eq!(outcome.invalid, 2);
    }
}
