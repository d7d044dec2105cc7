//! Value Objects for coupons

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coupon code value object: trimmed, uppercased, 3 to 20 characters
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 20;

    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        let len = value.chars().count();
        if len < Self::MIN_LEN { return Err(CouponCodeError::TooShort); }
        if len > Self::MAX_LEN { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponCodeError { TooShort, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "coupon code shorter than {} characters", CouponCode::MIN_LEN),
            Self::TooLong => write!(f, "coupon code longer than {} characters", CouponCode::MAX_LEN),
        }
    }
}

/// Identifier of the customer redeeming a coupon
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Result<Self, UserIdError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(UserIdError::Empty); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self { id.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum UserIdError { Empty }
impl std::error::Error for UserIdError {}
impl fmt::Display for UserIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "user id empty") }
}

/// How a coupon's discount value is interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[default]
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "percentage", Self::Fixed => "fixed" }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown discount type `{other}`")),
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
