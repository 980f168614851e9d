//! # Coupons Service
//!
//! Issues, assigns, locks, and redeems discount coupons organized into
//! coupon books.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        HTTP Layer (api/)                      │
//! └───────────────────────────┬───────────────────────────────────┘
//!                             ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │          Service Layer (service::BookService, CouponService)  │
//! └───────────┬───────────────────────────────────┬───────────────┘
//!             ▼                                   ▼
//! ┌───────────────────────────┐    ┌────────────────────────────────┐
//! │ Cache Plane (cache/)      │    │ Persistence Plane (repository/) │
//! │ dedup flags + locks       │    │ books, coupons, assignments     │
//! └───────────────────────────┘    └────────────────────────────────┘
//! ```
//!
//! Code generation (`codegen/`) is a pure leaf the book service uses to
//! materialize pattern-generated codes.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use shared::{config::AppConfig, database, redis_client::RedisClient, tracing_config};
use std::sync::Arc;
use tracing::info;

mod api;
mod cache;
mod codegen;
mod domain;
mod repository;
mod service;

use cache::{CachePlane, RedisCachePlane};
use repository::{BookRepository, CouponRepository, PgBookRepository, PgCouponRepository};
use service::{BookService, CouponService};

/// Shared application state injected into every request handler.
pub struct AppState {
    pub book_service: BookService,
    pub coupon_service: CouponService,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env().expect("Failed to load configuration");

    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "starting coupons-service"
    );

    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    let redis_client = RedisClient::new(&config.redis)
        .await
        .expect("Failed to connect to Redis");

    let book_repository: Arc<dyn BookRepository> = Arc::new(PgBookRepository::new(db_pool.clone()));
    let coupon_repository: Arc<dyn CouponRepository> =
        Arc::new(PgCouponRepository::new(db_pool.clone()));
    let cache_plane: Arc<dyn CachePlane> = Arc::new(RedisCachePlane::new(redis_client));

    let book_service = BookService::new(book_repository.clone());
    let coupon_service = CouponService::new(
        coupon_repository,
        book_repository,
        cache_plane,
        config.coupons.clone(),
    );

    let app_state = web::Data::new(AppState { book_service, coupon_service });

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    info!("server listening on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(app_state.clone())
            .configure(api::routes::configure)
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
