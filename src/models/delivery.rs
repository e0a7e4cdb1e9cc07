use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{PaymentMethod, ProductUnit};
use crate::utils::ledger;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, ToSchema,
)]
#[sqlx(type_name = "time_slot", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Evening,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Scheduled,
    Pending,
    Delivered,
    Skipped,
    Cancelled,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Skipped | DeliveryStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "skip_initiator", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SkipInitiator {
    Customer,
    Deliverer,
    Admin,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "delivery_payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Delivery {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub deliverer_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub delivery_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub amount: Decimal,
    pub status: DeliveryStatus,
    pub skip_reason: Option<String>,
    pub skipped_by: Option<SkipInitiator>,
    pub payment_status: DeliveryPaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<DeliveryItem>,
}

/// Строка доставки. Название, единица и цена фиксируются на момент доставки.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DeliveryItem {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl NewDeliveryItem {
    pub fn total(&self) -> Decimal {
        ledger::line_total(self.quantity, self.unit_price)
    }
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub customer_id: Uuid,
    pub deliverer_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub delivery_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub items: Vec<NewDeliveryItem>,
}

impl NewDelivery {
    pub fn amount(&self) -> Decimal {
        self.items.iter().map(NewDeliveryItem::total).sum()
    }
}

/// Изменения, которые вносит переход статуса доставки.
#[derive(Debug, Clone)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    pub amount: Decimal,
    pub skip_reason: Option<String>,
    pub skipped_by: Option<SkipInitiator>,
    pub payment_status: DeliveryPaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub customer_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<DeliveryStatus>,
    pub limit: i64,
    pub offset: i64,
}

// DTOs
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryRequest {
    pub customer_id: Uuid,
    pub delivery_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub deliverer_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Нужна хотя бы одна позиция"))]
    pub items: Vec<CreateDeliveryItemRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryItemRequest {
    pub product_id: Uuid,
    pub quantity: Decimal,
    /// Если не указана, берётся текущая цена продукта.
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliverRequest {
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SkipDeliveryRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub initiator: SkipInitiator,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeliveriesQuery {
    pub customer_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<DeliveryStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
