use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateDeliveryRequest, Delivery, DeliveryFilter, DeliveryPaymentStatus, DeliveryStatus,
    DeliveryUpdate, NewDelivery, NewDeliveryItem, PaymentMethod, SkipInitiator,
};
use crate::storage::BillingStore;
use crate::utils::validators;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTransition {
    Confirm,
    Deliver,
    Skip,
    Cancel,
}

impl DeliveryTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryTransition::Confirm => "confirm",
            DeliveryTransition::Deliver => "deliver",
            DeliveryTransition::Skip => "skip",
            DeliveryTransition::Cancel => "cancel",
        }
    }
}

/// Таблица переходов доставки. `delivered`, `skipped` и `cancelled` конечные.
pub fn next_status(
    current: DeliveryStatus,
    transition: DeliveryTransition,
) -> AppResult<DeliveryStatus> {
    use DeliveryStatus::*;

    match (transition, current) {
        (DeliveryTransition::Confirm, Scheduled) => Ok(Pending),
        (DeliveryTransition::Deliver, Scheduled | Pending) => Ok(Delivered),
        (DeliveryTransition::Skip, Scheduled | Pending) => Ok(Skipped),
        (DeliveryTransition::Cancel, Scheduled | Pending) => Ok(Cancelled),
        _ if current.is_terminal() => Err(AppError::Validation(format!(
            "Доставка уже в конечном статусе {:?}",
            current
        ))),
        _ => Err(AppError::Validation(format!(
            "Действие {} недопустимо для доставки в статусе {:?}",
            transition.as_str(),
            current
        ))),
    }
}

#[derive(Debug, Clone)]
pub enum DeliveryAction {
    Confirm,
    Deliver {
        payment_method: Option<PaymentMethod>,
    },
    Skip {
        reason: String,
        initiator: SkipInitiator,
    },
    Cancel,
}

impl DeliveryAction {
    pub fn transition(&self) -> DeliveryTransition {
        match self {
            DeliveryAction::Confirm => DeliveryTransition::Confirm,
            DeliveryAction::Deliver { .. } => DeliveryTransition::Deliver,
            DeliveryAction::Skip { .. } => DeliveryTransition::Skip,
            DeliveryAction::Cancel => DeliveryTransition::Cancel,
        }
    }
}

pub struct DeliveryService {
    store: Arc<dyn BillingStore>,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Разовая доставка от оператора. Цена позиции по умолчанию берётся из каталога.
    pub async fn create_delivery(&self, request: CreateDeliveryRequest) -> AppResult<Delivery> {
        validators::validate_request(&request)?;

        self.store
            .get_customer(request.customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Клиент не найден".to_string()))?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in request.items {
            if item.quantity <= Decimal::ZERO {
                return Err(AppError::Validation(
                    "Количество должно быть больше нуля".to_string(),
                ));
            }

            let product = self
                .store
                .get_product(item.product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Продукт не найден".to_string()))?;

            let unit_price = item.unit_price.unwrap_or(product.price);
            if unit_price < Decimal::ZERO {
                return Err(AppError::Validation(
                    "Цена не может быть отрицательной".to_string(),
                ));
            }

            items.push(NewDeliveryItem {
                product_id: product.id,
                product_name: product.name,
                unit: product.unit,
                quantity: item.quantity,
                unit_price,
            });
        }

        let delivery = self
            .store
            .create_delivery(NewDelivery {
                customer_id: request.customer_id,
                deliverer_id: request.deliverer_id,
                route_id: request.route_id,
                delivery_date: request.delivery_date,
                time_slot: request.time_slot,
                items,
            })
            .await?;

        tracing::info!(
            delivery_id = %delivery.id,
            customer_id = %delivery.customer_id,
            "Delivery scheduled for {}",
            delivery.delivery_date
        );
        Ok(delivery)
    }

    pub async fn apply(
        &self,
        id: Uuid,
        action: DeliveryAction,
        now: DateTime<Utc>,
    ) -> AppResult<Delivery> {
        let delivery = self
            .store
            .get_delivery(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Доставка не найдена".to_string()))?;

        let status = next_status(delivery.status, action.transition())?;
        let mut update = DeliveryUpdate {
            status,
            amount: delivery.amount,
            skip_reason: delivery.skip_reason.clone(),
            skipped_by: delivery.skipped_by,
            payment_status: delivery.payment_status,
            payment_method: delivery.payment_method,
            delivered_at: delivery.delivered_at,
        };

        match action {
            DeliveryAction::Confirm | DeliveryAction::Cancel => {}
            DeliveryAction::Deliver { payment_method } => {
                update.delivered_at = Some(now);
                if let Some(method) = payment_method {
                    update.payment_method = Some(method);
                    update.payment_status = DeliveryPaymentStatus::Paid;
                }
            }
            DeliveryAction::Skip { reason, initiator } => {
                let reason = validators::sanitize_string(&reason);
                if reason.is_empty() {
                    return Err(AppError::Validation(
                        "Укажите причину пропуска".to_string(),
                    ));
                }
                update.amount = Decimal::ZERO;
                update.skip_reason = Some(reason);
                update.skipped_by = Some(initiator);
            }
        }

        let updated = self.store.update_delivery(id, delivery.status, update).await?;
        tracing::info!(
            delivery_id = %id,
            "Delivery {:?} -> {:?}",
            delivery.status,
            updated.status
        );
        Ok(updated)
    }

    pub async fn list(&self, filter: DeliveryFilter) -> AppResult<Vec<Delivery>> {
        self.store.list_deliveries(filter).await
    }
}
