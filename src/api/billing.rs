use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{is_staff, AppState, AuthUser};
use crate::models::{
    Bill, BillFilter, BillResponse, BillsQuery, CustomerBalanceResponse, GenerateAllBillsRequest,
    GenerateAllBillsResponse, GenerateBillRequest, RecordBillPaymentRequest,
};
use crate::utils::validators::validate_request;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bills))
        .route("/generate", post(generate_bill))
        .route("/generate-all", post(generate_all_bills))
        .route("/:id", get(get_bill))
        .route("/:id/payment", put(record_bill_payment))
        .route("/:id/send", post(send_bill))
        .route("/customers/:customer_id/balance", get(customer_balance))
}

/// Сформировать счёт клиенту за месяц
#[utoipa::path(
    post,
    path = "/api/v1/billing/generate",
    tag = "billing",
    security(("bearer_auth" = [])),
    request_body = GenerateBillRequest,
    responses(
        (status = 201, description = "Счёт сформирован", body = Bill),
        (status = 400, description = "ALREADY_EXISTS или NO_BILLABLE_ACTIVITY"),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Только администратор"),
        (status = 404, description = "Клиент не найден")
    )
)]
pub async fn generate_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<GenerateBillRequest>,
) -> AppResult<(StatusCode, Json<Bill>)> {
    auth_user.require_admin()?;
    validate_request(&payload)?;

    let bill = state
        .billing()
        .generate_bill(payload.customer_id, payload.month, payload.year)
        .await?;

    Ok((StatusCode::CREATED, Json(bill)))
}

/// Сформировать счета всем активным клиентам
#[utoipa::path(
    post,
    path = "/api/v1/billing/generate-all",
    tag = "billing",
    security(("bearer_auth" = [])),
    request_body = GenerateAllBillsRequest,
    responses(
        (status = 200, description = "Итог пакетной генерации", body = GenerateAllBillsResponse),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Только администратор")
    )
)]
pub async fn generate_all_bills(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<GenerateAllBillsRequest>,
) -> AppResult<Json<GenerateAllBillsResponse>> {
    auth_user.require_admin()?;
    validate_request(&payload)?;

    let result = state
        .billing()
        .generate_all_bills(payload.month, payload.year)
        .await?;

    Ok(Json(result))
}

/// Список счетов
#[utoipa::path(
    get,
    path = "/api/v1/billing",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(BillsQuery),
    responses(
        (status = 200, description = "Список счетов", body = Vec<Bill>),
        (status = 401, description = "Не авторизован")
    )
)]
pub async fn list_bills(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<BillsQuery>,
) -> AppResult<Json<Vec<Bill>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.page.unwrap_or(0).max(0) * limit;

    // Клиент видит только свои счета
    let customer_id = if is_staff(&auth_user.role) {
        query.customer_id
    } else {
        Some(auth_user.user_id)
    };

    let bills = state
        .billing()
        .list_bills(BillFilter {
            customer_id,
            month: query.month,
            year: query.year,
            status: query.status,
            limit,
            offset,
        })
        .await?;

    Ok(Json(bills))
}

/// Счёт с позициями, историей оплат и напоминаниями
#[utoipa::path(
    get,
    path = "/api/v1/billing/{id}",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    responses(
        (status = 200, description = "Счёт", body = BillResponse),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Чужой счёт"),
        (status = 404, description = "Счёт не найден")
    )
)]
pub async fn get_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BillResponse>> {
    let bill = state.billing().bill_details(id).await?;
    auth_user.require_self_or_staff(bill.customer_id)?;
    Ok(Json(bill))
}

/// Принять оплату по счёту
#[utoipa::path(
    put,
    path = "/api/v1/billing/{id}/payment",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    request_body = RecordBillPaymentRequest,
    responses(
        (status = 200, description = "Счёт после оплаты", body = BillResponse),
        (status = 400, description = "INVALID_AMOUNT"),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Только персонал"),
        (status = 404, description = "Счёт не найден")
    )
)]
pub async fn record_bill_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordBillPaymentRequest>,
) -> AppResult<Json<BillResponse>> {
    auth_user.require_staff()?;

    state
        .payments()
        .record_bill_payment(id, payload, Some(auth_user.user_id), Utc::now())
        .await?;

    let bill = state.billing().bill_details(id).await?;
    Ok(Json(bill))
}

/// Отправить счёт клиенту
#[utoipa::path(
    post,
    path = "/api/v1/billing/{id}/send",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    responses(
        (status = 200, description = "Счёт отправлен", body = Bill),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Только администратор"),
        (status = 404, description = "Счёт не найден")
    )
)]
pub async fn send_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Bill>> {
    auth_user.require_admin()?;
    let bill = state.billing().send_bill(id, Utc::now()).await?;
    Ok(Json(bill))
}

/// Задолженность клиента
#[utoipa::path(
    get,
    path = "/api/v1/billing/customers/{customer_id}/balance",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(
        ("customer_id" = Uuid, Path, description = "ID клиента")
    ),
    responses(
        (status = 200, description = "Кэш и пересчитанная задолженность", body = CustomerBalanceResponse),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Чужой клиент"),
        (status = 404, description = "Клиент не найден")
    )
)]
pub async fn customer_balance(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(customer_id): Path<Uuid>,
) -> AppResult<Json<CustomerBalanceResponse>> {
    auth_user.require_self_or_staff(customer_id)?;
    let balance = state.billing().customer_balance(customer_id).await?;
    Ok(Json(balance))
}
