//! Coupon workflows used by the order and admin surfaces

use std::sync::Arc;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::instrument;
use crate::domain::aggregates::{Coupon, CouponTerms, UsageRecord};
use crate::domain::engine::{self, Eligibility, OrderContext};
use crate::domain::value_objects::{CouponCode, UserId};
use crate::publisher::EventPublisher;
use crate::store::CouponStore;
use crate::{CouponError, Result};

#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn CouponStore>,
    publisher: EventPublisher,
}

impl CouponService {
    pub fn new(store: Arc<dyn CouponStore>, publisher: EventPublisher) -> Self { Self { store, publisher } }

    #[instrument(skip(self, terms))]
    pub async fn create(&self, code: &str, terms: CouponTerms) -> Result<Coupon> {
        let mut coupon = Coupon::create(CouponCode::new(code)?, terms)?;
        self.store.insert(&coupon).await?;
        tracing::info!(code = %coupon.code(), id = coupon.id(), "coupon created");
        self.publisher.publish(coupon.take_events()).await;
        Ok(coupon)
    }

    pub async fn get(&self, code: &str) -> Result<Coupon> {
        self.store.find_by_code(&CouponCode::new(code)?).await?.ok_or(CouponError::NotFound)
    }

    pub async fn list_active(&self) -> Result<Vec<Coupon>> { self.store.list_active().await }

    #[instrument(skip(self, terms))]
    pub async fn update_terms(&self, code: &str, terms: CouponTerms) -> Result<Coupon> {
        let mut coupon = self.store.update_terms(&CouponCode::new(code)?, terms).await?;
        tracing::info!(code = %coupon.code(), "coupon terms updated");
        self.publisher.publish(coupon.take_events()).await;
        Ok(coupon)
    }

    #[instrument(skip(self))]
    pub async fn set_active(&self, code: &str, active: bool) -> Result<Coupon> {
        let mut coupon = self.store.set_active(&CouponCode::new(code)?, active).await?;
        self.publisher.publish(coupon.take_events()).await;
        Ok(coupon)
    }

    /// Read-only check for an order; nothing is recorded.
    #[instrument(skip(self, order), fields(user = %order.user_id, amount = %order.order_amount))]
    pub async fn validate(&self, code: &str, order: &OrderContext, now: DateTime<Utc>) -> Result<Eligibility> {
        let coupon = self.get(code).await?;
        let result = engine::evaluate(&coupon, order, now)?;
        if let Some(reason) = result.reason() {
            tracing::info!(%reason, "coupon not applicable");
        }
        Ok(result)
    }

    /// Applies the coupon to an order and records the redemption.
    #[instrument(skip(self, order), fields(user = %order.user_id, amount = %order.order_amount))]
    pub async fn redeem(&self, code: &str, order: &OrderContext, now: DateTime<Utc>) -> Result<UsageRecord> {
        match self.store.redeem(&CouponCode::new(code)?, order, now).await {
            Ok((mut coupon, record)) => {
                tracing::info!(discount = %record.discount_amount, usage = coupon.usage_count(), "coupon redeemed");
                self.publisher.publish(coupon.take_events()).await;
                Ok(record)
            }
            Err(CouponError::Ineligible(reason)) => {
                tracing::warn!(%reason, "coupon redemption rejected");
                Err(CouponError::Ineligible(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Active coupons the user could apply to an order of `order_amount`, largest discount first.
    pub async fn eligible_for_user(&self, user_id: &UserId, order_amount: Decimal, now: DateTime<Utc>) -> Result<Vec<(Coupon, Decimal)>> {
        let coupons = self.store.list_active().await?;
        let ranked = engine::rank_eligible(&coupons, user_id, order_amount, now)?;
        Ok(ranked.into_iter().map(|(c, d)| (c.clone(), d)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::domain::engine::IneligibleReason;
    use crate::store::InMemoryCouponStore;

    fn service() -> CouponService { CouponService::new(Arc::new(InMemoryCouponStore::new()), EventPublisher::disabled()) }

    fn terms(now: DateTime<Utc>) -> CouponTerms {
        CouponTerms { max_discount_amount: Decimal::new(10, 0), max_usage_per_user: 1, ..CouponTerms::percentage(Decimal::new(20, 0), now - Duration::days(1), now + Duration::days(30), 10) }
    }

    #[tokio::test]
    async fn test_create_validate_redeem() {
        let svc = service();
        let now = Utc::now();
        svc.create("chili20", terms(now)).await.unwrap();
        let order = OrderContext::new(UserId::new("u1").unwrap(), Decimal::new(100, 0));
        let result = svc.validate("CHILI20", &order, now).await.unwrap();
        assert_eq!(result, Eligibility::Eligible { discount: Decimal::new(10, 0) });
        assert_eq!(svc.get("CHILI20").await.unwrap().usage_count(), 0);

        let record = svc.redeem("chili20", &order, now).await.unwrap();
        assert_eq!(record.discount_amount, Decimal::new(10, 0));
        assert_eq!(svc.redeem("CHILI20", &order, now).await.unwrap_err(), CouponError::Ineligible(IneligibleReason::UserUsageLimitReached));
        assert_eq!(svc.get("CHILI20").await.unwrap().usage_count(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let svc = service();
        let now = Utc::now();
        assert!(matches!(svc.create("X", terms(now)).await, Err(CouponError::InvalidArgument(_))));
        let bad = CouponTerms { discount_value: Decimal::new(150, 0), ..terms(now) };
        assert_eq!(svc.create("TOOMUCH", bad).await.unwrap_err(), CouponError::InvalidPercentage);
        assert_eq!(svc.get("TOOMUCH").await.unwrap_err(), CouponError::NotFound);
    }

    #[tokio::test]
    async fn test_deactivated_coupon_not_offered() {
        let svc = service();
        let now = Utc::now();
        svc.create("BAYLEAF", terms(now)).await.unwrap();
        svc.create("OREGANO", CouponTerms::fixed(Decimal::new(5, 0), now - Duration::days(1), now + Duration::days(1), 3)).await.unwrap();
        let user = UserId::new("u1").unwrap();
        let offered = svc.eligible_for_user(&user, Decimal::new(100, 0), now).await.unwrap();
        assert_eq!(offered.iter().map(|(c, _)| c.code().as_str()).collect::<Vec<_>>(), vec!["BAYLEAF", "OREGANO"]);

        svc.set_active("bayleaf", false).await.unwrap();
        let offered = svc.eligible_for_user(&user, Decimal::new(100, 0), now).await.unwrap();
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].1, Decimal::new(5, 0));
        let order = OrderContext::new(user, Decimal::new(100, 0));
        assert_eq!(svc.validate("BAYLEAF", &order, now).await.unwrap().reason(), Some(IneligibleReason::ExpiredOrInactive));
    }
}
