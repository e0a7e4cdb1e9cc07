use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::UserRole;
use crate::services::{
    AuthService, BillingService, DeliveryService, GatewayService, NotificationDispatcher,
    PaymentService, Scheduler,
};
use crate::storage::BillingStore;

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub gateway: Arc<GatewayService>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: Config,
    ) -> Self {
        Self {
            store,
            notifier,
            gateway: Arc::new(GatewayService::new(&config)),
            config,
        }
    }

    pub fn billing(&self) -> BillingService {
        BillingService::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.scheduler.business_offset(),
        )
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.store.clone(), self.notifier.clone(), self.gateway.clone())
    }

    pub fn deliveries(&self) -> DeliveryService {
        DeliveryService::new(self.store.clone())
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.scheduler.clone(),
        )
    }
}

// Вспомогательные функции для проверки ролей
pub fn is_admin_or_higher(role: &UserRole) -> bool {
    matches!(role, UserRole::Admin | UserRole::SuperAdmin)
}

pub fn is_staff(role: &UserRole) -> bool {
    matches!(
        role,
        UserRole::Deliverer | UserRole::Admin | UserRole::SuperAdmin
    )
}

impl AuthUser {
    pub fn require_admin(&self) -> AppResult<()> {
        if is_admin_or_higher(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_staff(&self) -> AppResult<()> {
        if is_staff(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Клиент видит только свои данные, персонал видит всё.
    pub fn require_self_or_staff(&self, customer_id: Uuid) -> AppResult<()> {
        if is_staff(&self.role) || self.user_id == customer_id {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

// Middleware для добавления AppState в extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(state);
    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "error": { "code": "UNAUTHORIZED", "message": message }
        })),
    )
        .into_response()
}

// Экстрактор для авторизованного пользователя
#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        // Получаем AppState из extensions
        let app_state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| AppError::Internal("AppState missing".to_string()).into_response())?;

        // Извлекаем токен из заголовка
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("Invalid authorization header format"))?;

        // Проверяем токен
        let auth_service = AuthService::new(app_state.config);
        let claims = auth_service
            .verify_token(token)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        if claims.token_type != "access" {
            return Err(unauthorized("Invalid token type"));
        }

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| unauthorized("Invalid user ID in token"))?;

        Ok(AuthUser {
            user_id,
            role: UserRole::parse(&claims.role),
        })
    }
}
