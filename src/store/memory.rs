//! In-process coupon store

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use crate::domain::aggregates::{Coupon, CouponTerms, UsageRecord};
use crate::domain::engine::{self, OrderContext};
use crate::domain::value_objects::CouponCode;
use crate::store::CouponStore;
use crate::{CouponError, Result};

/// Keeps coupons in memory, each behind its own lock.
#[derive(Debug, Default)]
pub struct InMemoryCouponStore {
    coupons: RwLock<HashMap<CouponCode, Arc<Mutex<Coupon>>>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self { Self::default() }

    async fn slot(&self, code: &CouponCode) -> Result<Arc<Mutex<Coupon>>> {
        self.coupons.read().await.get(code).cloned().ok_or(CouponError::NotFound)
    }

    /// Runs `f` on the stored coupon under its lock. The stored copy keeps no events.
    async fn modify<T>(&self, code: &CouponCode, f: impl FnOnce(&mut Coupon) -> Result<T>) -> Result<(Coupon, T)> {
        let slot = self.slot(code).await?;
        let mut stored = slot.lock().await;
        let mut working = stored.clone();
        let out = f(&mut working)?;
        *stored = working.clone();
        stored.take_events();
        Ok((working, out))
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn insert(&self, coupon: &Coupon) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(coupon.code()) { return Err(CouponError::DuplicateCode); }
        let mut stored = coupon.clone();
        stored.take_events();
        coupons.insert(coupon.code().clone(), Arc::new(Mutex::new(stored)));
        Ok(())
    }

    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        let slot = self.coupons.read().await.get(code).cloned();
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_active(&self) -> Result<Vec<Coupon>> {
        let slots: Vec<_> = self.coupons.read().await.values().cloned().collect();
        let mut active = Vec::with_capacity(slots.len());
        for slot in slots {
            let coupon = slot.lock().await;
            if coupon.is_active() { active.push(coupon.clone()); }
        }
        active.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(active)
    }

    async fn update_terms(&self, code: &CouponCode, terms: CouponTerms) -> Result<Coupon> {
        Ok(self.modify(code, |c| c.update_terms(terms)).await?.0)
    }

    async fn set_active(&self, code: &CouponCode, active: bool) -> Result<Coupon> {
        let (coupon, ()) = self.modify(code, |c| {
            if active { c.activate() } else { c.deactivate() }
            Ok(())
        }).await?;
        Ok(coupon)
    }

    async fn redeem(&self, code: &CouponCode, order: &OrderContext, now: DateTime<Utc>) -> Result<(Coupon, UsageRecord)> {
        self.modify(code, |c| engine::redeem(c, order, now)).await
    }
}
