//! Business logic for the coupon lifecycle: book catalog management and
//! bulk code materialization (`book`), and coupon assignment, locking,
//! and redemption under concurrency (`coupon`).

mod book;
mod coupon;
mod error;

pub use book::BookService;
pub use coupon::CouponService;
pub use error::CouponError;
