use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub is_active: bool,
    /// Кэш задолженности. Меняется только инкрементами, источник истины
    /// это сумма неоплаченных счетов.
    pub pending_amount: Decimal,
    pub sms_enabled: bool,
    pub email_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerBalanceResponse {
    pub customer_id: Uuid,
    pub cached_pending_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub unpaid_bills: i64,
}
