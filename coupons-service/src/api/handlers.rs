//! # HTTP Request Handlers
//!
//! Handlers for all coupon API endpoints. User identity rides on the
//! `X-User-Id` header, the same convention the rest of the platform uses
//! ahead of a proper gateway-issued JWT.

use actix_web::{web, HttpRequest, HttpResponse};
use shared::errors::ApiError;
use uuid::Uuid;
use validator::Validate;

use crate::api::dto::*;
use crate::domain::{BookId, NewCouponBook};
use crate::AppState;

fn require_user_id(req: &HttpRequest) -> Result<String, ApiError> {
    req.headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::BadRequest { message: "missing X-User-Id header".to_string() })
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "coupons-service"
    }))
}

// =============================================================================
// COUPON BOOK HANDLERS
// =============================================================================

pub async fn create_book(
    state: web::Data<AppState>,
    body: web::Json<CreateBookRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate().map_err(ApiError::ValidationError)?;

    let spec = NewCouponBook {
        name: body.name.clone(),
        description: body.description.clone(),
        valid_from: body.valid_from,
        valid_until: body.valid_until,
        max_redemptions_per_user: body.max_redemptions_per_user,
        max_assignments_per_user: body.max_assignments_per_user,
        code_pattern: body.code_pattern.clone(),
        max_codes: body.max_codes,
        metadata: body.metadata.clone(),
    };

    let book = state.book_service.create_book(spec).await?;
    Ok(HttpResponse::Created().json(BookResponse::from(book)))
}

pub async fn list_books(
    state: web::Data<AppState>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ApiError> {
    let books = state.book_service.list_books(query.page(), query.limit()).await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items: books.into_iter().map(BookResponse::from).collect(),
        pagination: PaginationInfo { page: query.page(), limit: query.limit() },
    }))
}

pub async fn get_book(
    state: web::Data<AppState>,
    book_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let book = state.book_service.get_book(BookId::from_uuid(*book_id)).await?;
    Ok(HttpResponse::Ok().json(BookResponse::from(book)))
}

pub async fn deactivate_book(
    state: web::Data<AppState>,
    book_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let book = state.book_service.deactivate_book(BookId::from_uuid(*book_id)).await?;
    Ok(HttpResponse::Ok().json(BookResponse::from(book)))
}

pub async fn list_book_coupons(
    state: web::Data<AppState>,
    book_id: web::Path<Uuid>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ApiError> {
    let coupons = state
        .book_service
        .list_coupons(BookId::from_uuid(*book_id), query.page(), query.limit())
        .await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items: coupons.into_iter().map(CouponSummaryResponse::from).collect(),
        pagination: PaginationInfo { page: query.page(), limit: query.limit() },
    }))
}

pub async fn upload_codes(
    state: web::Data<AppState>,
    book_id: web::Path<Uuid>,
    body: web::Json<UploadCodesRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate().map_err(ApiError::ValidationError)?;

    let outcome = state
        .book_service
        .upload_codes(BookId::from_uuid(*book_id), body.codes.clone())
        .await?;
    Ok(HttpResponse::Created().json(BulkInsertResponse::from(outcome)))
}

pub async fn generate_codes(
    state: web::Data<AppState>,
    book_id: web::Path<Uuid>,
    body: web::Json<GenerateCodesRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate().map_err(ApiError::ValidationError)?;

    let outcome = state
        .book_service
        .generate_codes(BookId::from_uuid(*book_id), body.count)
        .await?;
    Ok(HttpResponse::Created().json(BulkInsertResponse::from(outcome)))
}

// =============================================================================
// COUPON HANDLERS
// =============================================================================

pub async fn assign_random(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<AssignRandomRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let pair = state
        .coupon_service
        .assign_random(BookId::from_uuid(body.book_id), &user_id)
        .await?;
    Ok(HttpResponse::Ok().json(CouponAssignmentResponse::from(pair)))
}

pub async fn assign_specific(
    req: HttpRequest,
    state: web::Data<AppState>,
    code: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let pair = state.coupon_service.assign_specific(&code, &user_id).await?;
    Ok(HttpResponse::Ok().json(CouponAssignmentResponse::from(pair)))
}

pub async fn lock_coupon(
    req: HttpRequest,
    state: web::Data<AppState>,
    code: web::Path<String>,
    body: web::Json<LockRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let pair = state
        .coupon_service
        .lock(&code, &user_id, body.duration_seconds)
        .await?;
    Ok(HttpResponse::Ok().json(CouponAssignmentResponse::from(pair)))
}

pub async fn unlock_coupon(
    req: HttpRequest,
    state: web::Data<AppState>,
    code: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let pair = state.coupon_service.unlock(&code, &user_id).await?;
    Ok(HttpResponse::Ok().json(CouponAssignmentResponse::from(pair)))
}

pub async fn redeem_coupon(
    req: HttpRequest,
    state: web::Data<AppState>,
    code: web::Path<String>,
    body: web::Json<RedeemRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let outcome = state
        .coupon_service
        .redeem(&code, &user_id, body.metadata.clone())
        .await?;
    Ok(HttpResponse::Ok().json(RedeemResponse::from(outcome)))
}

pub async fn get_coupon_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    code: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let view = state.coupon_service.get_status(&code, &user_id).await?;
    Ok(HttpResponse::Ok().json(CouponStatusResponse::from(view)))
}

pub async fn get_my_coupons(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user_id(&req)?;
    let coupons = state
        .coupon_service
        .get_user_coupons(&user_id, query.page(), query.limit())
        .await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items: coupons.into_iter().map(UserCouponResponse::from).collect(),
        pagination: PaginationInfo { page: query.page(), limit: query.limit() },
    }))
}
