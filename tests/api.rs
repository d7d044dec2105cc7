use std::str::FromStr;
use std::sync::Arc;
use axum::{body::Body, http::{Request, StatusCode}, Router};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use spice_coupons::{http::router, publisher::EventPublisher, service::CouponService, store::InMemoryCouponStore};

fn app() -> Router {
    router(CouponService::new(Arc::new(InMemoryCouponStore::new()), EventPublisher::disabled()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    let req = match body {
        Some(b) => req.body(Body::from(b.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn amount(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn coupon_body(code: &str, extra: Value) -> Value {
    let now = Utc::now();
    let mut body = json!({
        "code": code,
        "discount_type": "percentage",
        "discount_value": 20,
        "max_discount_amount": 10,
        "valid_from": (now - Duration::days(1)).to_rfc3339(),
        "valid_until": (now + Duration::days(30)).to_rfc3339(),
        "max_usage": 100
    });
    if let (Some(b), Some(e)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in e { b.insert(k.clone(), v.clone()); }
    }
    body
}

#[tokio::test]
async fn health() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn create_and_fetch_coupon() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("turmeric20", json!({})))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["code"], "TURMERIC20");
    assert_eq!(body["usage_count"], 0);

    let (status, body) = send(&app, "GET", "/api/v1/coupons/TURMERIC20", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["discount_type"], "percentage");

    let (status, _) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("TURMERIC20", json!({})))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, "GET", "/api/v1/coupons/UNKNOWN", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejects_invalid_terms() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("HUGE", json!({"discount_value": 150})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("percentage"));

    let now = Utc::now().to_rfc3339();
    let (status, _) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("BACKWARDS", json!({"valid_from": now, "valid_until": now})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("X", json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("SUBCENT", json!({"max_discount_amount": "10.005"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("decimal places"));
}

#[tokio::test]
async fn padded_code_is_trimmed_before_length_check() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("  saffronsaffronsaff1  ", json!({})))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["code"], "SAFFRONSAFFRONSAFF1");

    let (status, _) = send(&app, "POST", "/api/v1/coupons", Some(coupon_body("  abcdefghijklmnopqrst  ", json!({})))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, "GET", "/api/v1/coupons/ABCDEFGHIJKLMNOPQRST", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sub_cent_order_amount_rejected() {
    let app = app();
    send(&app, "POST", "/api/v1/coupons", Some(coupon_body("NUTMEG", json!({"discount_type": "fixed", "discount_value": 15, "max_discount_amount": 0})))).await;
    let order = json!({"code": "NUTMEG", "user_id": "u1", "order_amount": "10.005"});

    let (status, _) = send(&app, "POST", "/api/v1/coupons/validate", Some(order.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "POST", "/api/v1/coupons/redeem", Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, "GET", "/api/v1/coupons/NUTMEG", None).await;
    assert_eq!(body["usage_count"], 0);
}

#[tokio::test]
async fn validate_reports_discount_and_reason() {
    let app = app();
    send(&app, "POST", "/api/v1/coupons", Some(coupon_body("PAPRIKA", json!({"min_order_amount": 25})))).await;

    let (status, body) = send(&app, "POST", "/api/v1/coupons/validate", Some(json!({"code": "paprika", "user_id": "u1", "order_amount": 100}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(amount(&body["discount"]), Decimal::new(10, 0));

    let (_, body) = send(&app, "POST", "/api/v1/coupons/validate", Some(json!({"code": "PAPRIKA", "user_id": "u1", "order_amount": 30}))).await;
    assert_eq!(body["valid"], true);
    assert_eq!(amount(&body["discount"]), Decimal::new(6, 0));

    let (_, body) = send(&app, "POST", "/api/v1/coupons/validate", Some(json!({"code": "PAPRIKA", "user_id": "u1", "order_amount": 10}))).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["reason"], "below_minimum_order");

    let (status, _) = send(&app, "POST", "/api/v1/coupons/validate", Some(json!({"code": "PAPRIKA", "user_id": "u1", "order_amount": -5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn redeem_enforces_per_user_cap() {
    let app = app();
    send(&app, "POST", "/api/v1/coupons", Some(coupon_body("ONEPER", json!({"max_usage_per_user": 1})))).await;
    let order = json!({"code": "ONEPER", "user_id": "alice", "order_amount": 40});

    let (status, body) = send(&app, "POST", "/api/v1/coupons/redeem", Some(order.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], "alice");
    assert_eq!(amount(&body["discount_amount"]), Decimal::new(8, 0));

    let (status, _) = send(&app, "POST", "/api/v1/coupons/redeem", Some(order)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, "POST", "/api/v1/coupons/redeem", Some(json!({"code": "ONEPER", "user_id": "bob", "order_amount": 40}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, "GET", "/api/v1/coupons/ONEPER", None).await;
    assert_eq!(body["usage_count"], 2);
    assert_eq!(body["used_by"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn deactivate_and_list_eligible() {
    let app = app();
    send(&app, "POST", "/api/v1/coupons", Some(coupon_body("SMALLFIX", json!({"discount_type": "fixed", "discount_value": 5, "max_discount_amount": 0})))).await;
    send(&app, "POST", "/api/v1/coupons", Some(coupon_body("BIGPCT", json!({})))).await;

    let (status, body) = send(&app, "GET", "/api/v1/coupons/eligible?user_id=u1&order_amount=100", None).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<_> = body.as_array().unwrap().iter().map(|c| c["code"].as_str().unwrap().to_string()).collect();
    assert_eq!(codes, vec!["BIGPCT", "SMALLFIX"]);

    let (status, body) = send(&app, "POST", "/api/v1/coupons/BIGPCT/deactivate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (_, body) = send(&app, "GET", "/api/v1/coupons", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&app, "POST", "/api/v1/coupons/validate", Some(json!({"code": "BIGPCT", "user_id": "u1", "order_amount": 100}))).await;
    assert_eq!(body["reason"], "expired_or_inactive");
}

#[tokio::test]
async fn update_terms() {
    let app = app();
    send(&app, "POST", "/api/v1/coupons", Some(coupon_body("CINNAMON", json!({})))).await;
    let mut terms = coupon_body("CINNAMON", json!({"discount_value": 50, "max_discount_amount": 0}));
    terms.as_object_mut().unwrap().remove("code");

    let (status, body) = send(&app, "PUT", "/api/v1/coupons/cinnamon", Some(terms)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&body["discount_value"]), Decimal::new(50, 0));

    let (_, body) = send(&app, "POST", "/api/v1/coupons/validate", Some(json!({"code": "CINNAMON", "user_id": "u1", "order_amount": 100}))).await;
    assert_eq!(amount(&body["discount"]), Decimal::new(50, 0));
}
