//! Coupon eligibility and discount computation.
//!
//! Every function here is a pure computation over the coupon and the inputs passed
//! in: no I/O, no clock reads, no logging. Redemption mutates only the coupon it is
//! handed, and relies on the caller holding that coupon's exclusion scope.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::aggregates::{Coupon, CouponTerms, UsageRecord};
use crate::domain::value_objects::{DiscountType, UserId};
use crate::CouponError;

/// Why a coupon cannot be applied to an order right now.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    #[error("coupon is expired or inactive")]
    ExpiredOrInactive,
    #[error("coupon has reached its usage limit")]
    Exhausted,
    #[error("order amount is below the coupon minimum")]
    BelowMinimumOrder,
    #[error("user has reached the usage limit for this coupon")]
    UserUsageLimitReached,
    #[error("coupon is not available to this customer type")]
    UserTypeNotEligible,
    #[error("coupon does not apply to any item in the order")]
    NotApplicableToItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible { discount: Decimal },
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool { matches!(self, Self::Eligible { .. }) }

    /// Discount to apply; zero when the coupon is not applicable.
    pub fn discount(&self) -> Decimal {
        match self { Self::Eligible { discount } => *discount, Self::Ineligible(_) => Decimal::ZERO }
    }

    pub fn reason(&self) -> Option<IneligibleReason> {
        match self { Self::Eligible { .. } => None, Self::Ineligible(reason) => Some(*reason) }
    }
}

/// What the order workflow knows about the order a coupon is being applied to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderContext {
    pub user_id: UserId,
    pub order_amount: Decimal,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl OrderContext {
    pub fn new(user_id: UserId, order_amount: Decimal) -> Self {
        Self { user_id, order_amount, user_type: None, products: vec![], categories: vec![] }
    }
}

/// Active, inside its validity window and not exhausted.
pub fn check_validity(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), IneligibleReason> {
    if !coupon.is_active() || now < coupon.valid_from() || now > coupon.valid_until() {
        return Err(IneligibleReason::ExpiredOrInactive);
    }
    if coupon.usage_count() >= coupon.max_usage() {
        return Err(IneligibleReason::Exhausted);
    }
    Ok(())
}

pub fn is_currently_valid(coupon: &Coupon, now: DateTime<Utc>) -> bool {
    check_validity(coupon, now).is_ok()
}

/// `check_validity` plus the per-user cap.
pub fn check_user(coupon: &Coupon, user_id: &UserId, now: DateTime<Utc>) -> Result<(), IneligibleReason> {
    check_validity(coupon, now)?;
    let cap = coupon.max_usage_per_user();
    if cap > 0 && coupon.redemptions_by(user_id) >= cap as usize {
        return Err(IneligibleReason::UserUsageLimitReached);
    }
    Ok(())
}

pub fn can_user_use(coupon: &Coupon, user_id: &UserId, now: DateTime<Utc>) -> bool {
    check_user(coupon, user_id, now).is_ok()
}

/// Discount from the coupon's formula alone, rounded to cents.
///
/// Fixed discounts are not limited to the order amount here; see `compute_discount`.
pub fn raw_discount(coupon: &Coupon, order_amount: Decimal) -> Result<Decimal, CouponError> {
    ensure_order_amount(order_amount)?;
    if order_amount < coupon.min_order_amount() {
        return Ok(Decimal::ZERO);
    }
    let raw = match coupon.discount_type() {
        DiscountType::Percentage => {
            let raw = round_cents(order_amount * coupon.discount_value() / Decimal::ONE_HUNDRED);
            let cap = coupon.max_discount_amount();
            if cap > Decimal::ZERO { raw.min(cap) } else { raw }
        }
        DiscountType::Fixed => coupon.discount_value(),
    };
    Ok(raw.max(Decimal::ZERO))
}

/// Discount to apply to an order: the raw discount, never more than the order itself.
pub fn compute_discount(coupon: &Coupon, order_amount: Decimal) -> Result<Decimal, CouponError> {
    let raw = raw_discount(coupon, order_amount)?;
    Ok(raw.min(order_amount))
}

/// Checks administrator-supplied terms before they are stored.
pub fn validate_terms(terms: &CouponTerms) -> Result<(), CouponError> {
    if terms.valid_from >= terms.valid_until {
        return Err(CouponError::InvalidDateRange);
    }
    if terms.discount_type == DiscountType::Percentage && terms.discount_value > Decimal::ONE_HUNDRED {
        return Err(CouponError::InvalidPercentage);
    }
    ensure_money("discount_value", terms.discount_value)?;
    ensure_money("max_discount_amount", terms.max_discount_amount)?;
    ensure_money("min_order_amount", terms.min_order_amount)?;
    if terms.max_usage == 0 {
        return Err(CouponError::InvalidArgument("max_usage must be positive".into()));
    }
    Ok(())
}

/// Coupons from `coupons` the user could apply to an order of `order_amount` at `now`.
pub fn find_eligible_for_user<'a>(coupons: &'a [Coupon], user_id: &UserId, order_amount: Decimal, now: DateTime<Utc>) -> Result<Vec<&'a Coupon>, CouponError> {
    ensure_order_amount(order_amount)?;
    Ok(coupons
        .iter()
        .filter(|c| c.min_order_amount() <= order_amount)
        .filter(|c| check_user(c, user_id, now).is_ok())
        .collect())
}

/// Eligible coupons paired with their discount, best first. Ties keep code order.
pub fn rank_eligible<'a>(coupons: &'a [Coupon], user_id: &UserId, order_amount: Decimal, now: DateTime<Utc>) -> Result<Vec<(&'a Coupon, Decimal)>, CouponError> {
    let mut ranked = find_eligible_for_user(coupons, user_id, order_amount, now)?
        .into_iter()
        .map(|c| compute_discount(c, order_amount).map(|d| (c, d)))
        .collect::<Result<Vec<_>, _>>()?;
    ranked.sort_by(|(a, da), (b, db)| db.cmp(da).then_with(|| a.code().cmp(b.code())));
    Ok(ranked)
}

/// Full check the order workflow runs before applying a coupon, including scoping rules.
pub fn evaluate(coupon: &Coupon, order: &OrderContext, now: DateTime<Utc>) -> Result<Eligibility, CouponError> {
    ensure_order_amount(order.order_amount)?;
    if let Err(reason) = check_user(coupon, &order.user_id, now) {
        return Ok(Eligibility::Ineligible(reason));
    }
    if order.order_amount < coupon.min_order_amount() {
        return Ok(Eligibility::Ineligible(IneligibleReason::BelowMinimumOrder));
    }
    let terms = coupon.terms();
    if !terms.user_types.is_empty() {
        let allowed = order.user_type.as_ref().is_some_and(|t| terms.user_types.contains(t));
        if !allowed { return Ok(Eligibility::Ineligible(IneligibleReason::UserTypeNotEligible)); }
    }
    if !terms.products.is_empty() || !terms.categories.is_empty() {
        let hit = order.products.iter().any(|p| terms.products.contains(p))
            || order.categories.iter().any(|c| terms.categories.contains(c));
        if !hit { return Ok(Eligibility::Ineligible(IneligibleReason::NotApplicableToItems)); }
    }
    Ok(Eligibility::Eligible { discount: compute_discount(coupon, order.order_amount)? })
}

/// Evaluates and, when eligible, records the redemption on `coupon`.
pub fn redeem(coupon: &mut Coupon, order: &OrderContext, now: DateTime<Utc>) -> Result<UsageRecord, CouponError> {
    match evaluate(coupon, order, now)? {
        Eligibility::Eligible { discount } => coupon.record_redemption(order.user_id.clone(), order.order_amount, discount, now),
        Eligibility::Ineligible(reason) => Err(CouponError::Ineligible(reason)),
    }
}

/// Round half-up at the cent boundary.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amounts are non-negative with at most two decimal places; nothing is rounded on the way in.
pub fn ensure_money(field: &str, value: Decimal) -> Result<(), CouponError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(CouponError::InvalidArgument(format!("{field} {value} is negative")));
    }
    if value.normalize().scale() > 2 {
        return Err(CouponError::InvalidArgument(format!("{field} {value} has more than two decimal places")));
    }
    Ok(())
}

fn ensure_order_amount(order_amount: Decimal) -> Result<(), CouponError> {
    ensure_money("order amount", order_amount)
}
