//! # Routes Configuration
//!
//! Configures all API routes for the coupons service.

use actix_web::web;

use crate::api::handlers;

/// Configures all routes for the coupons service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .service(
                web::scope("/coupon-books")
                    .route("", web::get().to(handlers::list_books))
                    .route("", web::post().to(handlers::create_book))
                    .route("/{book_id}", web::get().to(handlers::get_book))
                    .route("/{book_id}", web::delete().to(handlers::deactivate_book))
                    .route("/{book_id}/coupons", web::get().to(handlers::list_book_coupons))
                    .route("/{book_id}/codes", web::post().to(handlers::upload_codes))
                    .route(
                        "/{book_id}/codes/generate",
                        web::post().to(handlers::generate_codes),
                    ),
            )
            .service(
                web::scope("/coupons")
                    .route("/assign/random", web::post().to(handlers::assign_random))
                    .route("/assign/{code}", web::post().to(handlers::assign_specific))
                    .route("/my-coupons", web::get().to(handlers::get_my_coupons))
                    .route("/{code}/lock", web::post().to(handlers::lock_coupon))
                    .route("/{code}/unlock", web::post().to(handlers::unlock_coupon))
                    .route("/{code}/redeem", web::post().to(handlers::redeem_coupon))
                    .route("/{code}/status", web::get().to(handlers::get_coupon_status)),
            ),
    );
}

#[cfg(test)]
mod tests {
    // Route wiring is exercised end-to-end by the handler/service tests;
    // this just guards against `configure` failing to compile.

    #[test]
    fn route_configuration_compiles() {
        assert!(true);
    }
}
