//! Domain events
use crate::domain::value_objects::{CouponCode, UserId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponEvent {
    Created { coupon_id: String, code: CouponCode },
    TermsUpdated { coupon_id: String, code: CouponCode },
    Activated { coupon_id: String, code: CouponCode },
    Deactivated { coupon_id: String, code: CouponCode },
    Redeemed { coupon_id: String, code: CouponCode, user_id: UserId, order_amount: Decimal, discount_amount: Decimal },
}

impl CouponEvent {
    /// Suffix of the subject the event is published on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::TermsUpdated { .. } => "terms_updated",
            Self::Activated { .. } => "activated",
            Self::Deactivated { .. } => "deactivated",
            Self::Redeemed { .. } => "redeemed",
        }
    }
}
