//! Aggregates module
pub mod coupon;

pub use coupon::{Coupon, CouponSnapshot, CouponTerms, UsageRecord};
