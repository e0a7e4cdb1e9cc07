use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::middleware::{is_staff, AppState, AuthUser};
use crate::models::{
    CashPaymentRequest, CreateOrderRequest, CreateOrderResponse, Payment, PaymentFilter,
    PaymentsQuery, VerifyPaymentRequest,
};
use crate::utils::validators::validate_request;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments))
        .route("/create-order", post(create_order))
        .route("/verify", post(verify_payment))
        .route("/cash", post(record_cash_payment))
}

async fn require_bill_access(
    state: &AppState,
    auth_user: &AuthUser,
    bill_id: uuid::Uuid,
) -> AppResult<()> {
    let bill = state
        .store
        .get_bill(bill_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?;
    auth_user.require_self_or_staff(bill.customer_id)
}

/// Создать заказ в платёжном шлюзе для оплаты счёта
#[utoipa::path(
    post,
    path = "/api/v1/payments/create-order",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Заказ создан", body = CreateOrderResponse),
        (status = 400, description = "Счёт уже оплачен или неверная сумма"),
        (status = 401, description = "Не авторизован"),
        (status = 404, description = "Счёт не найден"),
        (status = 502, description = "Шлюз недоступен")
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<Json<CreateOrderResponse>> {
    require_bill_access(&state, &auth_user, payload.bill_id).await?;
    let response = state.payments().create_order(payload).await?;
    Ok(Json(response))
}

/// Подтвердить онлайн-платёж по подписи шлюза
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Платёж проведён", body = Payment),
        (status = 400, description = "INVALID_SIGNATURE"),
        (status = 401, description = "Не авторизован"),
        (status = 404, description = "Счёт не найден")
    )
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<VerifyPaymentRequest>,
) -> AppResult<Json<Payment>> {
    validate_request(&payload)?;
    require_bill_access(&state, &auth_user, payload.bill_id).await?;

    let payment = state
        .payments()
        .verify_gateway_payment(payload, Utc::now())
        .await?;

    Ok(Json(payment))
}

/// Принять наличные
#[utoipa::path(
    post,
    path = "/api/v1/payments/cash",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = CashPaymentRequest,
    responses(
        (status = 201, description = "Платёж принят", body = Payment),
        (status = 400, description = "INVALID_AMOUNT"),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Только персонал"),
        (status = 404, description = "Клиент или счёт не найден")
    )
)]
pub async fn record_cash_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CashPaymentRequest>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    auth_user.require_staff()?;
    validate_request(&payload)?;

    let applied = state
        .payments()
        .record_cash_payment(payload, Some(auth_user.user_id), Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(applied.payment)))
}

/// Список платежей
#[utoipa::path(
    get,
    path = "/api/v1/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(PaymentsQuery),
    responses(
        (status = 200, description = "Список платежей", body = Vec<Payment>),
        (status = 401, description = "Не авторизован")
    )
)]
pub async fn list_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<PaymentsQuery>,
) -> AppResult<Json<Vec<Payment>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.page.unwrap_or(0).max(0) * limit;

    let customer_id = if is_staff(&auth_user.role) {
        query.customer_id
    } else {
        Some(auth_user.user_id)
    };

    let payments = state
        .payments()
        .list_payments(PaymentFilter {
            customer_id,
            bill_id: query.bill_id,
            limit,
            offset,
        })
        .await?;

    Ok(Json(payments))
}
