//! Coupon persistence port and its implementations

mod memory;
mod postgres;

pub use memory::InMemoryCouponStore;
pub use postgres::PgCouponStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::domain::aggregates::{Coupon, CouponTerms, UsageRecord};
use crate::domain::engine::OrderContext;
use crate::domain::value_objects::CouponCode;
use crate::Result;

/// Storage for coupons.
///
/// Every method that changes a stored coupon runs inside that coupon's exclusion
/// scope, so concurrent redemptions and edits of one code are applied one at a time.
/// Returned coupons still carry the domain events the change raised.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Fails with `DuplicateCode` when the code is taken.
    async fn insert(&self, coupon: &Coupon) -> Result<()>;

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>>;

    /// Coupons with `is_active` set, ordered by code.
    async fn list_active(&self) -> Result<Vec<Coupon>>;

    async fn update_terms(&self, code: &CouponCode, terms: CouponTerms) -> Result<Coupon>;

    async fn set_active(&self, code: &CouponCode, active: bool) -> Result<Coupon>;

    /// Evaluates `order` against the stored coupon and records the redemption when
    /// eligible. Never lets `usage_count` pass `max_usage`.
    async fn redeem(&self, code: &CouponCode, order: &OrderContext, now: DateTime<Utc>) -> Result<(Coupon, UsageRecord)>;
}
