use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{is_staff, AppState, AuthUser};
use crate::models::{
    CreateDeliveryRequest, DeliverRequest, DeliveriesQuery, Delivery, DeliveryFilter,
    SkipDeliveryRequest, SkipInitiator,
};
use crate::services::DeliveryAction;
use crate::utils::validators::validate_request;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_deliveries).post(create_delivery))
        .route("/:id/confirm", put(confirm_delivery))
        .route("/:id/deliver", put(mark_delivered))
        .route("/:id/skip", put(skip_delivery))
        .route("/:id/cancel", put(cancel_delivery))
}

/// Создать разовую доставку
#[utoipa::path(
    post,
    path = "/api/v1/deliveries",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    request_body = CreateDeliveryRequest,
    responses(
        (status = 201, description = "Доставка запланирована", body = Delivery),
        (status = 401, description = "Не авторизован"),
        (status = 403, description = "Только персонал"),
        (status = 404, description = "Клиент или продукт не найден"),
        (status = 422, description = "Ошибка валидации")
    )
)]
pub async fn create_delivery(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateDeliveryRequest>,
) -> AppResult<(StatusCode, Json<Delivery>)> {
    auth_user.require_staff()?;
    let delivery = state.deliveries().create_delivery(payload).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// Список доставок по дате и/или клиенту
#[utoipa::path(
    get,
    path = "/api/v1/deliveries",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(DeliveriesQuery),
    responses(
        (status = 200, description = "Список доставок", body = Vec<Delivery>),
        (status = 401, description = "Не авторизован")
    )
)]
pub async fn list_deliveries(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<DeliveriesQuery>,
) -> AppResult<Json<Vec<Delivery>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.page.unwrap_or(0).max(0) * limit;

    let customer_id = if is_staff(&auth_user.role) {
        query.customer_id
    } else {
        Some(auth_user.user_id)
    };

    let deliveries = state
        .deliveries()
        .list(DeliveryFilter {
            customer_id,
            date: query.date,
            status: query.status,
            limit,
            offset,
        })
        .await?;

    Ok(Json(deliveries))
}

/// Подтвердить доставку (scheduled → pending)
#[utoipa::path(
    put,
    path = "/api/v1/deliveries/{id}/confirm",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID доставки")),
    responses(
        (status = 200, description = "Доставка подтверждена", body = Delivery),
        (status = 404, description = "Доставка не найдена"),
        (status = 409, description = "Статус изменился параллельно"),
        (status = 422, description = "Недопустимый переход")
    )
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Delivery>> {
    auth_user.require_staff()?;
    let delivery = state
        .deliveries()
        .apply(id, DeliveryAction::Confirm, Utc::now())
        .await?;
    Ok(Json(delivery))
}

/// Отметить доставку выполненной
#[utoipa::path(
    put,
    path = "/api/v1/deliveries/{id}/deliver",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID доставки")),
    request_body = DeliverRequest,
    responses(
        (status = 200, description = "Доставлено", body = Delivery),
        (status = 404, description = "Доставка не найдена"),
        (status = 409, description = "Статус изменился параллельно"),
        (status = 422, description = "Недопустимый переход")
    )
)]
pub async fn mark_delivered(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<DeliverRequest>>,
) -> AppResult<Json<Delivery>> {
    auth_user.require_staff()?;
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let delivery = state
        .deliveries()
        .apply(
            id,
            DeliveryAction::Deliver {
                payment_method: payload.payment_method,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(delivery))
}

/// Пропустить доставку
#[utoipa::path(
    put,
    path = "/api/v1/deliveries/{id}/skip",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID доставки")),
    request_body = SkipDeliveryRequest,
    responses(
        (status = 200, description = "Доставка пропущена", body = Delivery),
        (status = 403, description = "Чужая доставка"),
        (status = 404, description = "Доставка не найдена"),
        (status = 409, description = "Статус изменился параллельно"),
        (status = 422, description = "Недопустимый переход")
    )
)]
pub async fn skip_delivery(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SkipDeliveryRequest>,
) -> AppResult<Json<Delivery>> {
    validate_request(&payload)?;

    // Клиент может пропустить свою доставку сам
    let initiator = if is_staff(&auth_user.role) {
        payload.initiator
    } else {
        let delivery = state
            .store
            .get_delivery(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Доставка не найдена".to_string()))?;
        auth_user.require_self_or_staff(delivery.customer_id)?;
        SkipInitiator::Customer
    };

    let delivery = state
        .deliveries()
        .apply(
            id,
            DeliveryAction::Skip {
                reason: payload.reason,
                initiator,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(delivery))
}

/// Отменить доставку
#[utoipa::path(
    put,
    path = "/api/v1/deliveries/{id}/cancel",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "ID доставки")),
    responses(
        (status = 200, description = "Доставка отменена", body = Delivery),
        (status = 404, description = "Доставка не найдена"),
        (status = 409, description = "Статус изменился параллельно"),
        (status = 422, description = "Недопустимый переход")
    )
)]
pub async fn cancel_delivery(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Delivery>> {
    auth_user.require_staff()?;
    let delivery = state
        .deliveries()
        .apply(id, DeliveryAction::Cancel, Utc::now())
        .await?;
    Ok(Json(delivery))
}
