//! JSON API over the coupon service

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::{Validate, ValidationError};
use crate::domain::aggregates::{Coupon, CouponTerms, UsageRecord};
use crate::domain::engine::{IneligibleReason, OrderContext};
use crate::domain::value_objects::{DiscountType, UserId};
use crate::service::CouponService;
use crate::CouponError;

#[derive(Clone)] pub struct AppState { pub service: CouponService }

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn router(service: CouponService) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "spice-coupons"})) }))
        .route("/api/v1/coupons", get(list_coupons).post(create_coupon))
        .route("/api/v1/coupons/validate", post(validate_coupon))
        .route("/api/v1/coupons/redeem", post(redeem_coupon))
        .route("/api/v1/coupons/eligible", get(eligible_coupons))
        .route("/api/v1/coupons/:code", get(get_coupon).put(update_coupon))
        .route("/api/v1/coupons/:code/activate", post(activate_coupon))
        .route("/api/v1/coupons/:code/deactivate", post(deactivate_coupon))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(AppState { service })
}

pub fn error_response(e: CouponError) -> (StatusCode, String) {
    let status = match &e {
        CouponError::InvalidDateRange | CouponError::InvalidPercentage | CouponError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        CouponError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CouponError::NotFound => StatusCode::NOT_FOUND,
        CouponError::DuplicateCode => StatusCode::CONFLICT,
        CouponError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn invalid(e: validator::ValidationErrors) -> (StatusCode, String) { (StatusCode::BAD_REQUEST, e.to_string()) }

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() { return Err(ValidationError::new("negative_amount")); }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct TermsRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    pub discount_type: DiscountType,
    #[validate(custom = "non_negative")]
    pub discount_value: Decimal,
    #[serde(default)]
    #[validate(custom = "non_negative")]
    pub max_discount_amount: Decimal,
    #[serde(default)]
    #[validate(custom = "non_negative")]
    pub min_order_amount: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub max_usage: u32,
    #[serde(default)]
    pub max_usage_per_user: u32,
    #[serde(default)] pub categories: Vec<String>,
    #[serde(default)] pub products: Vec<String>,
    #[serde(default)] pub user_types: Vec<String>,
}

impl From<TermsRequest> for CouponTerms {
    fn from(r: TermsRequest) -> Self {
        CouponTerms {
            description: r.description, discount_type: r.discount_type, discount_value: r.discount_value,
            max_discount_amount: r.max_discount_amount, min_order_amount: r.min_order_amount,
            valid_from: r.valid_from, valid_until: r.valid_until, max_usage: r.max_usage,
            max_usage_per_user: r.max_usage_per_user, categories: r.categories, products: r.products, user_types: r.user_types,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCouponRequest {
    /// Normalized and length-checked by `CouponCode::new`.
    pub code: String,
    #[serde(flatten)]
    #[validate]
    pub terms: TermsRequest,
}

#[derive(Debug, Deserialize)] pub struct ApplyCouponRequest { pub code: String, #[serde(flatten)] pub order: OrderContext }

#[derive(Debug, Serialize)]
pub struct ValidateResponse { pub valid: bool, pub discount: Decimal, pub reason: Option<IneligibleReason>, pub message: Option<String> }

#[derive(Debug, Deserialize)] pub struct EligibleParams { pub user_id: String, pub order_amount: Decimal }
#[derive(Debug, Serialize)] pub struct EligibleCoupon { pub code: String, pub discount_type: DiscountType, pub discount_value: Decimal, pub discount: Decimal }

async fn list_coupons(State(s): State<AppState>) -> ApiResult<Json<Vec<Coupon>>> {
    s.service.list_active().await.map(Json).map_err(error_response)
}

async fn create_coupon(State(s): State<AppState>, Json(r): Json<CreateCouponRequest>) -> ApiResult<(StatusCode, Json<Coupon>)> {
    r.validate().map_err(invalid)?;
    let c = s.service.create(&r.code, r.terms.into()).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(c)))
}

async fn get_coupon(State(s): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<Coupon>> {
    s.service.get(&code).await.map(Json).map_err(error_response)
}

async fn update_coupon(State(s): State<AppState>, Path(code): Path<String>, Json(r): Json<TermsRequest>) -> ApiResult<Json<Coupon>> {
    r.validate().map_err(invalid)?;
    s.service.update_terms(&code, r.into()).await.map(Json).map_err(error_response)
}

async fn activate_coupon(State(s): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<Coupon>> {
    s.service.set_active(&code, true).await.map(Json).map_err(error_response)
}

async fn deactivate_coupon(State(s): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<Coupon>> {
    s.service.set_active(&code, false).await.map(Json).map_err(error_response)
}

async fn validate_coupon(State(s): State<AppState>, Json(r): Json<ApplyCouponRequest>) -> ApiResult<Json<ValidateResponse>> {
    let result = s.service.validate(&r.code, &r.order, Utc::now()).await.map_err(error_response)?;
    let reason = result.reason();
    Ok(Json(ValidateResponse { valid: result.is_eligible(), discount: result.discount(), reason, message: reason.map(|r| r.to_string()) }))
}

async fn redeem_coupon(State(s): State<AppState>, Json(r): Json<ApplyCouponRequest>) -> ApiResult<(StatusCode, Json<UsageRecord>)> {
    let record = s.service.redeem(&r.code, &r.order, Utc::now()).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn eligible_coupons(State(s): State<AppState>, Query(p): Query<EligibleParams>) -> ApiResult<Json<Vec<EligibleCoupon>>> {
    let user = UserId::new(p.user_id).map_err(|e| error_response(e.into()))?;
    let ranked = s.service.eligible_for_user(&user, p.order_amount, Utc::now()).await.map_err(error_response)?;
    Ok(Json(ranked.into_iter().map(|(c, discount)| EligibleCoupon {
        code: c.code().to_string(), discount_type: c.discount_type(), discount_value: c.discount_value(), discount,
    }).collect()))
}
