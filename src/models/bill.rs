use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{PaymentMethod, ProductUnit};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "bill_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Draft,
    Generated,
    Sent,
    Partial,
    Paid,
    Overdue,
}

impl Default for BillStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl BillStatus {
    /// Счета, по которым ещё идут напоминания и которые могут стать просроченными.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            BillStatus::Generated | BillStatus::Sent | BillStatus::Partial
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bill {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub bill_number: String,
    pub month: i32,
    pub year: i32,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub delivery_ids: Vec<Uuid>,
    pub total_litres: Decimal,
    pub delivered_count: i32,
    pub skipped_count: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub status: BillStatus,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BillItem {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewBillItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// Всё, что нужно хранилищу для создания счёта. Номер счёта назначает хранилище.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub customer_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub delivery_ids: Vec<Uuid>,
    pub items: Vec<NewBillItem>,
    pub total_litres: Decimal,
    pub delivered_count: i32,
    pub skipped_count: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub status: BillStatus,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "reminder_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    DueSoon,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BillReminder {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub kind: ReminderKind,
    pub days_until_due: i32,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub customer_id: Option<Uuid>,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub status: Option<BillStatus>,
    pub limit: i64,
    pub offset: i64,
}

// DTOs
#[derive(Debug, Serialize, ToSchema)]
pub struct BillResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub bill_number: String,
    pub month: i32,
    pub year: i32,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub delivery_ids: Vec<Uuid>,
    pub total_litres: Decimal,
    pub delivered_count: i32,
    pub skipped_count: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub status: BillStatus,
    pub due_date: DateTime<Utc>,
    pub items: Vec<BillItemResponse>,
    pub payments: Vec<BillPaymentEntry>,
    pub reminders: Vec<BillReminder>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

impl From<BillItem> for BillItemResponse {
    fn from(i: BillItem) -> Self {
        Self {
            product_id: i.product_id,
            product_name: i.product_name,
            unit: i.unit,
            quantity: i.quantity,
            unit_price: i.unit_price,
            amount: i.amount,
        }
    }
}

/// Запись истории оплат счёта. Строится из таблицы платежей, а не хранится в счёте.
#[derive(Debug, Serialize, ToSchema)]
pub struct BillPaymentEntry {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
    pub received_by: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBillRequest {
    pub customer_id: Uuid,
    #[validate(range(min = 1, max = 12, message = "Месяц должен быть от 1 до 12"))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateAllBillsRequest {
    #[validate(range(min = 1, max = 12, message = "Месяц должен быть от 1 до 12"))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub item_id: Uuid,
    pub error: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct GenerateAllBillsResponse {
    pub generated: usize,
    pub skipped: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordBillPaymentRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BillsQuery {
    pub customer_id: Option<Uuid>,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub status: Option<BillStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
