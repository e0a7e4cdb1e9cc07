use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::Bill;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Upi,
    Card,
    NetBanking,
    BankTransfer,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
            PaymentMethod::NetBanking => "net_banking",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Online => "online",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub bill_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub gateway_order_id: Option<String>,
    pub received_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub customer_id: Uuid,
    pub bill_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub gateway_order_id: Option<String>,
    pub received_by: Option<Uuid>,
    pub notes: Option<String>,
}

/// Заказ в платёжном шлюзе, созданный под конкретный счёт. По нему сверяется
/// сумма и счёт при подтверждении онлайн-платежа.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatewayOrderRecord {
    pub order_id: String,
    pub bill_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Результат проводки платежа: сам платёж, обновлённый счёт и новый кэш долга клиента.
#[derive(Debug, Clone)]
pub struct AppliedPayment {
    pub payment: Payment,
    pub bill: Option<Bill>,
    pub customer_pending: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub customer_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

// DTOs
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CashPaymentRequest {
    pub customer_id: Uuid,
    pub bill_id: Option<Uuid>,
    pub amount: Decimal,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: Decimal,
    pub bill_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    /// В минимальных единицах валюты (пайсы).
    pub amount: u64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order: GatewayOrder,
    pub key_id: String,
    pub bill_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub payment_id: String,
    #[validate(length(min = 1))]
    pub signature: String,
    pub bill_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentsQuery {
    pub customer_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
