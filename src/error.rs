use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Не авторизован")]
    Unauthorized,

    #[error("Доступ запрещён")]
    Forbidden,

    #[error("Не найдено: {0}")]
    NotFound(String),

    #[error("Неверный запрос: {0}")]
    BadRequest(String),

    #[error("Конфликт: {0}")]
    Conflict(String),

    #[error("Ошибка валидации: {0}")]
    Validation(String),

    #[error("Счёт за этот период уже сформирован")]
    BillAlreadyExists,

    #[error("Нет доставок для выставления счёта")]
    NoBillableActivity,

    #[error("Сумма должна быть больше нуля")]
    InvalidAmount,

    #[error("Неверная подпись платежа")]
    InvalidSignature,

    #[error("Ошибка базы данных: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ошибка JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),

    #[error("Канал уведомлений недоступен: {0}")]
    Notification(String),

    #[error("Платёжный шлюз недоступен: {0}")]
    Gateway(String),
}

impl AppError {
    /// Машиночитаемый код ошибки, тот же что уходит клиенту.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BillAlreadyExists => "ALREADY_EXISTS",
            AppError::NoBillableActivity => "NO_BILLABLE_ACTIVITY",
            AppError::InvalidAmount => "INVALID_AMOUNT",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Jwt(_) => "INVALID_TOKEN",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Notification(_) => "NOTIFICATION_UNAVAILABLE",
            AppError::Gateway(_) => "GATEWAY_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::BillAlreadyExists
            | AppError::NoBillableActivity
            | AppError::InvalidAmount
            | AppError::InvalidSignature => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ошибка базы данных".to_string(),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Неверный токен".to_string()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Внутренняя ошибка".to_string(),
                )
            }
            AppError::Notification(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Платёжный шлюз недоступен".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
