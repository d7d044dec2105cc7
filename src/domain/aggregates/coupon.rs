//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::engine::{self, IneligibleReason};
use crate::domain::events::CouponEvent;
use crate::domain::value_objects::{CouponCode, DiscountType, UserId};
use crate::CouponError;

/// Terms an administrator sets on a coupon. Everything except the code and usage data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouponTerms {
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    /// Ceiling for percentage discounts; zero means uncapped.
    #[serde(default)]
    pub max_discount_amount: Decimal,
    #[serde(default)]
    pub min_order_amount: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_usage: u32,
    /// Zero means a user may redeem as often as the global cap allows.
    #[serde(default)]
    pub max_usage_per_user: u32,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub user_types: Vec<String>,
}

impl CouponTerms {
    pub fn percentage(value: Decimal, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>, max_usage: u32) -> Self {
        Self::new(DiscountType::Percentage, value, valid_from, valid_until, max_usage)
    }

    pub fn fixed(value: Decimal, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>, max_usage: u32) -> Self {
        Self::new(DiscountType::Fixed, value, valid_from, valid_until, max_usage)
    }

    fn new(discount_type: DiscountType, discount_value: Decimal, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>, max_usage: u32) -> Self {
        Self {
            description: String::new(), discount_type, discount_value,
            max_discount_amount: Decimal::ZERO, min_order_amount: Decimal::ZERO,
            valid_from, valid_until, max_usage, max_usage_per_user: 0,
            categories: vec![], products: vec![], user_types: vec![],
        }
    }
}

/// One entry of a coupon's append-only redemption log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: UserId,
    pub used_at: DateTime<Utc>,
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
}

/// A coupon as held by storage, before its invariants are re-checked.
#[derive(Clone, Debug)]
pub struct CouponSnapshot {
    pub id: String,
    pub code: CouponCode,
    pub terms: CouponTerms,
    pub is_active: bool,
    pub usage_count: u32,
    pub used_by: Vec<UsageRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Coupon {
    id: String,
    code: CouponCode,
    #[serde(flatten)]
    terms: CouponTerms,
    is_active: bool,
    usage_count: u32,
    used_by: Vec<UsageRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<CouponEvent>,
}

impl Coupon {
    /// Creates an active coupon with no redemptions. Terms are validated first.
    pub fn create(code: CouponCode, terms: CouponTerms) -> Result<Self, CouponError> {
        engine::validate_terms(&terms)?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let mut coupon = Self {
            id: id.clone(), code: code.clone(), terms, is_active: true, usage_count: 0,
            used_by: vec![], created_at: now, updated_at: now, events: vec![],
        };
        coupon.raise_event(CouponEvent::Created { coupon_id: id, code });
        Ok(coupon)
    }

    /// Rebuilds a coupon loaded from storage, rejecting records that break the usage invariants.
    pub fn restore(snapshot: CouponSnapshot) -> Result<Self, CouponError> {
        engine::validate_terms(&snapshot.terms)?;
        if snapshot.usage_count as usize != snapshot.used_by.len() {
            return Err(CouponError::InvalidArgument(format!(
                "coupon {} records {} uses but has {} usage entries",
                snapshot.code, snapshot.usage_count, snapshot.used_by.len()
            )));
        }
        if snapshot.usage_count > snapshot.terms.max_usage {
            return Err(CouponError::InvalidArgument(format!("coupon {} is over-redeemed", snapshot.code)));
        }
        Ok(Self {
            id: snapshot.id, code: snapshot.code, terms: snapshot.terms, is_active: snapshot.is_active,
            usage_count: snapshot.usage_count, used_by: snapshot.used_by,
            created_at: snapshot.created_at, updated_at: snapshot.updated_at, events: vec![],
        })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn code(&self) -> &CouponCode { &self.code }
    pub fn terms(&self) -> &CouponTerms { &self.terms }
    pub fn discount_type(&self) -> DiscountType { self.terms.discount_type }
    pub fn discount_value(&self) -> Decimal { self.terms.discount_value }
    pub fn max_discount_amount(&self) -> Decimal { self.terms.max_discount_amount }
    pub fn min_order_amount(&self) -> Decimal { self.terms.min_order_amount }
    pub fn valid_from(&self) -> DateTime<Utc> { self.terms.valid_from }
    pub fn valid_until(&self) -> DateTime<Utc> { self.terms.valid_until }
    pub fn max_usage(&self) -> u32 { self.terms.max_usage }
    pub fn max_usage_per_user(&self) -> u32 { self.terms.max_usage_per_user }
    pub fn is_active(&self) -> bool { self.is_active }
    pub fn usage_count(&self) -> u32 { self.usage_count }
    pub fn used_by(&self) -> &[UsageRecord] { &self.used_by }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn redemptions_by(&self, user_id: &UserId) -> usize {
        self.used_by.iter().filter(|u| &u.user_id == user_id).count()
    }

    pub fn update_terms(&mut self, terms: CouponTerms) -> Result<(), CouponError> {
        engine::validate_terms(&terms)?;
        if terms.max_usage < self.usage_count {
            return Err(CouponError::InvalidArgument(format!(
                "max_usage {} is below the {} redemptions already recorded", terms.max_usage, self.usage_count
            )));
        }
        self.terms = terms;
        self.touch();
        self.raise_event(CouponEvent::TermsUpdated { coupon_id: self.id.clone(), code: self.code.clone() });
        Ok(())
    }

    pub fn activate(&mut self) {
        if self.is_active { return; }
        self.is_active = true;
        self.touch();
        self.raise_event(CouponEvent::Activated { coupon_id: self.id.clone(), code: self.code.clone() });
    }

    pub fn deactivate(&mut self) {
        if !self.is_active { return; }
        self.is_active = false;
        self.touch();
        self.raise_event(CouponEvent::Deactivated { coupon_id: self.id.clone(), code: self.code.clone() });
    }

    /// Appends to the usage log and bumps the usage count. Refuses once `max_usage` is reached.
    ///
    /// Callers must hold the coupon's exclusion scope; see `CouponStore::redeem`.
    pub fn record_redemption(&mut self, user_id: UserId, order_amount: Decimal, discount_amount: Decimal, now: DateTime<Utc>) -> Result<UsageRecord, CouponError> {
        engine::ensure_money("order_amount", order_amount)?;
        engine::ensure_money("discount_amount", discount_amount)?;
        if self.usage_count >= self.terms.max_usage {
            return Err(CouponError::Ineligible(IneligibleReason::Exhausted));
        }
        let record = UsageRecord { user_id, used_at: now, order_amount, discount_amount };
        self.used_by.push(record.clone());
        self.usage_count += 1;
        self.updated_at = now;
        self.raise_event(CouponEvent::Redeemed {
            coupon_id: self.id.clone(), code: self.code.clone(), user_id: record.user_id.clone(),
            order_amount, discount_amount,
        });
        Ok(record)
    }

    pub fn take_events(&mut self) -> Vec<CouponEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: CouponEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn terms() -> CouponTerms {
        CouponTerms::percentage(Decimal::new(10, 0), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap(), 2)
    }

    #[test]
    fn test_coupon_create() {
        let mut c = Coupon::create(CouponCode::new("cumin10").unwrap(), terms()).unwrap();
        assert_eq!(c.code().as_str(), "CUMIN10");
        assert!(c.is_active());
        assert_eq!(c.usage_count(), 0);
        assert!(matches!(c.take_events().as_slice(), [CouponEvent::Created { .. }]));
    }

    #[test]
    fn test_create_rejects_bad_terms() {
        let bad = CouponTerms { valid_until: terms().valid_from, ..terms() };
        assert_eq!(Coupon::create(CouponCode::new("BAD").unwrap(), bad).unwrap_err(), CouponError::InvalidDateRange);
    }

    #[test]
    fn test_redemption_until_exhausted() {
        let mut c = Coupon::create(CouponCode::new("CLOVE").unwrap(), terms()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let user = UserId::new("u1").unwrap();
        c.record_redemption(user.clone(), Decimal::new(50, 0), Decimal::new(5, 0), now).unwrap();
        c.record_redemption(user.clone(), Decimal::new(50, 0), Decimal::new(5, 0), now).unwrap();
        assert_eq!(c.usage_count(), 2);
        assert_eq!(c.used_by().len(), 2);
        assert_eq!(c.redemptions_by(&user), 2);
        let err = c.record_redemption(user, Decimal::new(50, 0), Decimal::new(5, 0), now).unwrap_err();
        assert_eq!(err, CouponError::Ineligible(IneligibleReason::Exhausted));
        assert_eq!(c.usage_count(), 2);
    }

    #[test]
    fn test_redemption_rejects_sub_cent_amounts() {
        let mut c = Coupon::create(CouponCode::new("MACE").unwrap(), terms()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let user = UserId::new("u1").unwrap();
        let err = c.record_redemption(user.clone(), Decimal::new(10005, 3), Decimal::new(1, 0), now).unwrap_err();
        assert!(matches!(err, CouponError::InvalidArgument(_)));
        let err = c.record_redemption(user.clone(), Decimal::new(10, 0), Decimal::new(1001, 3), now).unwrap_err();
        assert!(matches!(err, CouponError::InvalidArgument(_)));
        assert!(c.record_redemption(user, Decimal::new(-1, 0), Decimal::ZERO, now).is_err());
        assert_eq!(c.usage_count(), 0);
        assert!(c.used_by().is_empty());
    }

    #[test]
    fn test_update_terms_keeps_usage_invariant() {
        let mut c = Coupon::create(CouponCode::new("MACE").unwrap(), terms()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        c.record_redemption(UserId::new("u1").unwrap(), Decimal::new(20, 0), Decimal::new(2, 0), now).unwrap();
        c.record_redemption(UserId::new("u2").unwrap(), Decimal::new(20, 0), Decimal::new(2, 0), now).unwrap();
        assert!(matches!(c.update_terms(CouponTerms { max_usage: 1, ..terms() }), Err(CouponError::InvalidArgument(_))));
        c.update_terms(CouponTerms { max_usage: 5, ..terms() }).unwrap();
        assert_eq!(c.max_usage(), 5);
    }

    #[test]
    fn test_toggle_active_raises_once() {
        let mut c = Coupon::create(CouponCode::new("ANISE").unwrap(), terms()).unwrap();
        c.take_events();
        c.deactivate();
        c.deactivate();
        assert!(!c.is_active());
        c.activate();
        let events = c.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind(), "activated");
    }

    #[test]
    fn test_restore_checks_usage_log() {
        let now = Utc::now();
        let snapshot = CouponSnapshot {
            id: "c1".into(), code: CouponCode::new("FENNEL").unwrap(), terms: terms(), is_active: true,
            usage_count: 1, used_by: vec![], created_at: now, updated_at: now,
        };
        assert!(matches!(Coupon::restore(snapshot.clone()), Err(CouponError::InvalidArgument(_))));
        let ok = CouponSnapshot { usage_count: 0, ..snapshot };
        assert!(Coupon::restore(ok).unwrap().take_events().is_empty());
    }
}
