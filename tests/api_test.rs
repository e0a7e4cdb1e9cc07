mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use common::{date, Fixture, RecordingNotifier};
use dairy_billing::config::Config;
use dairy_billing::models::UserRole;
use dairy_billing::services::AuthService;
use dairy_billing::{api, AppState};

fn app(fx: &Fixture) -> Router {
    let state = AppState::new(
        fx.store.clone(),
        Arc::new(RecordingNotifier::default()),
        Config::for_tests(),
    );
    api::router(state)
}

fn token(user_id: Uuid, role: UserRole) -> String {
    AuthService::new(Config::for_tests())
        .generate_access_token(user_id, &role)
        .unwrap()
}

fn admin() -> String {
    token(Uuid::new_v4(), UserRole::Admin)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let fx = Fixture::new(60).await;
    let (status, body) = send(&app(&fx), Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_foreign_token_is_unauthorized() {
    let fx = Fixture::new(60).await;
    let app = app(&fx);

    let (status, body) = send(&app, Method::GET, "/api/v1/billing", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let mut foreign = Config::for_tests();
    foreign.jwt_secret = "another-secret".to_string();
    let forged = AuthService::new(foreign)
        .generate_access_token(Uuid::new_v4(), &UserRole::Admin)
        .unwrap();
    let (status, _) = send(&app, Method::GET, "/api/v1/billing", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_generate_bill_over_http() {
    let fx = Fixture::new(60).await;
    fx.deliver(fx.customer.id, date(2025, 3, 2), 2).await;
    let app = app(&fx);
    let payload = json!({ "customerId": fx.customer.id, "month": 3, "year": 2025 });

    let customer_token = token(fx.customer.id, UserRole::Customer);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/billing/generate",
        Some(&customer_token),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin();
    let (status, bill) = send(
        &app,
        Method::POST,
        "/api/v1/billing/generate",
        Some(&admin),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(bill["bill_number"], "MDF-202503-00001");
    assert_eq!(bill["status"], "generated");

    let (status, error) = send(
        &app,
        Method::POST,
        "/api/v1/billing/generate",
        Some(&admin),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "ALREADY_EXISTS");

    // Клиент видит свой счёт, но не чужой
    let uri = format!("/api/v1/billing/{}", bill["id"].as_str().unwrap());
    let (status, details) = send(&app, Method::GET, &uri, Some(&customer_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["items"].as_array().unwrap().len(), 1);

    let stranger = token(Uuid::new_v4(), UserRole::Customer);
    let (status, _) = send(&app, Method::GET, &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bad_gateway_signature_is_rejected() {
    let fx = Fixture::new(60).await;
    fx.deliver(fx.customer.id, date(2025, 3, 2), 2).await;
    let bill = fx
        .billing(Arc::new(RecordingNotifier::default()))
        .generate_bill(fx.customer.id, 3, 2025)
        .await
        .unwrap();
    let app = app(&fx);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/payments/verify",
        Some(&token(fx.customer.id, UserRole::Customer)),
        Some(json!({
            "orderId": "order_Q1xYz",
            "paymentId": "pay_Q1xYzAbc",
            "signature": "0000",
            "billId": bill.id,
            "amount": "120.00"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_customer_skips_own_delivery() {
    let fx = Fixture::new(60).await;
    let delivery = fx.schedule(fx.customer.id, date(2025, 3, 12), 1).await;
    let app = app(&fx);
    let uri = format!("/api/v1/deliveries/{}/skip", delivery.id);
    let payload = json!({ "reason": "Уезжаем", "initiator": "admin" });

    let stranger = token(Uuid::new_v4(), UserRole::Customer);
    let (status, _) = send(&app, Method::PUT, &uri, Some(&stranger), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let owner = token(fx.customer.id, UserRole::Customer);
    let (status, body) = send(&app, Method::PUT, &uri, Some(&owner), Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["skipped_by"], "customer");
}

#[tokio::test]
async fn test_scheduler_endpoints_are_admin_only() {
    let fx = Fixture::new(60).await;
    let app = app(&fx);
    let deliverer = token(Uuid::new_v4(), UserRole::Deliverer);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/scheduler/jobs/overdue_transition/run",
        Some(&deliverer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin();
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/scheduler/jobs/unknown_job/run",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, report) = send(
        &app,
        Method::POST,
        "/api/v1/scheduler/jobs/overdue_transition/run",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["processed"], 0);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/scheduler/jobs/overdue_transition/run",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, runs) = send(&app, Method::GET, "/api/v1/scheduler/runs", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 1);
}
