//! Spice storefront coupon service
//!
//! Decides whether a coupon may be applied to an order and how much it takes off.
//!
//! ## Features
//! - Percentage and fixed discounts with caps and order minimums
//! - Validity windows, global and per-user usage caps
//! - Category, product and customer-type scoping
//! - Serialized redemption against in-memory or Postgres storage
//! - Domain events fanned out over NATS

pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod service;
pub mod store;

use thiserror::Error;

pub use domain::aggregates::{Coupon, CouponSnapshot, CouponTerms, UsageRecord};
pub use domain::engine::{Eligibility, IneligibleReason, OrderContext};
pub use domain::events::CouponEvent;
pub use domain::value_objects::{CouponCode, DiscountType, UserId};
pub use service::CouponService;
pub use store::CouponStore;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponError {
    #[error("valid_from must be before valid_until")]
    InvalidDateRange,

    #[error("percentage discount cannot exceed 100")]
    InvalidPercentage,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("coupon not applicable: {0}")]
    Ineligible(IneligibleReason),

    #[error("coupon not found")]
    NotFound,

    #[error("coupon code already exists")]
    DuplicateCode,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<domain::value_objects::CouponCodeError> for CouponError {
    fn from(e: domain::value_objects::CouponCodeError) -> Self { Self::InvalidArgument(e.to_string()) }
}

impl From<domain::value_objects::UserIdError> for CouponError {
    fn from(e: domain::value_objects::UserIdError) -> Self { Self::InvalidArgument(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, CouponError>;
