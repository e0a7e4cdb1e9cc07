use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AppliedPayment, BillStatus, CashPaymentRequest, CreateOrderRequest, CreateOrderResponse,
    GatewayOrderRecord, NewPayment, NotificationType, OutboundNotification, Payment, PaymentFilter, PaymentMethod,
    PaymentStatus, RecordBillPaymentRequest, VerifyPaymentRequest,
};
use crate::services::notification_service::{notify_best_effort, NotificationDispatcher};
use crate::services::GatewayService;
use crate::storage::BillingStore;
use crate::utils::{ledger, validators};

/// Входные данные для проводки платежа.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub customer_id: Uuid,
    pub bill_id: Option<Uuid>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub received_by: Option<Uuid>,
    pub notes: Option<String>,
}

pub struct PaymentService {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    gateway: Arc<GatewayService>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        gateway: Arc<GatewayService>,
    ) -> Self {
        Self {
            store,
            notifier,
            gateway,
        }
    }

    pub async fn record_payment(
        &self,
        command: RecordPayment,
        now: DateTime<Utc>,
    ) -> AppResult<AppliedPayment> {
        let amount = validators::validate_amount(command.amount)?;

        if let Some(bill_id) = command.bill_id {
            let bill = self
                .store
                .get_bill(bill_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?;
            if bill.customer_id != command.customer_id {
                return Err(AppError::Validation(
                    "Счёт принадлежит другому клиенту".to_string(),
                ));
            }
        }

        let customer = self
            .store
            .get_customer(command.customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Клиент не найден".to_string()))?;

        let transaction_id = match validators::sanitize_optional(command.transaction_id) {
            Some(id) if validators::validate_transaction_id(&id) => id,
            Some(_) => {
                return Err(AppError::Validation(
                    "Неверный формат номера транзакции".to_string(),
                ))
            }
            None => ledger::generate_transaction_id(),
        };

        let applied = self
            .store
            .apply_payment(
                NewPayment {
                    customer_id: command.customer_id,
                    bill_id: command.bill_id,
                    amount,
                    method: command.method,
                    status: PaymentStatus::Completed,
                    transaction_id,
                    gateway_order_id: command.gateway_order_id,
                    received_by: command.received_by,
                    notes: validators::sanitize_optional(command.notes),
                },
                now,
            )
            .await?;

        tracing::info!(
            payment_id = %applied.payment.id,
            customer_id = %customer.id,
            bill_id = ?applied.payment.bill_id,
            amount = %applied.payment.amount,
            method = applied.payment.method.as_str(),
            "Payment recorded"
        );

        let remaining = applied
            .bill
            .as_ref()
            .map(|b| b.pending_amount)
            .unwrap_or(applied.customer_pending);
        let notification = OutboundNotification::new(
            NotificationType::Payment,
            "Платёж получен",
            format!(
                "Получен платёж {} ₹. Остаток к оплате: {} ₹.",
                applied.payment.amount, remaining
            ),
        )
        .with_data(json!({
            "payment_id": applied.payment.id,
            "bill_id": applied.payment.bill_id,
            "transaction_id": applied.payment.transaction_id,
            "pending_amount": remaining,
        }));
        notify_best_effort(self.notifier.as_ref(), &customer, &notification).await;

        Ok(applied)
    }

    /// Оплата конкретного счёта. Клиент берётся из счёта.
    pub async fn record_bill_payment(
        &self,
        bill_id: Uuid,
        request: RecordBillPaymentRequest,
        received_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<AppliedPayment> {
        let amount = validators::validate_amount(request.amount)?;

        let bill = self
            .store
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?;

        self.record_payment(
            RecordPayment {
                customer_id: bill.customer_id,
                bill_id: Some(bill.id),
                amount,
                method: request.method,
                transaction_id: request.transaction_id,
                gateway_order_id: None,
                received_by,
                notes: request.notes,
            },
            now,
        )
        .await
    }

    pub async fn record_cash_payment(
        &self,
        request: CashPaymentRequest,
        received_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<AppliedPayment> {
        self.record_payment(
            RecordPayment {
                customer_id: request.customer_id,
                bill_id: request.bill_id,
                amount: request.amount,
                method: PaymentMethod::Cash,
                transaction_id: None,
                gateway_order_id: None,
                received_by,
                notes: request.notes,
            },
            now,
        )
        .await
    }

    /// Создаёт заказ в шлюзе и запоминает его сумму и счёт для последующей сверки.
    pub async fn create_order(&self, request: CreateOrderRequest) -> AppResult<CreateOrderResponse> {
        let amount = validators::validate_amount(request.amount)?;

        let bill = self
            .store
            .get_bill(request.bill_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?;

        if bill.status == BillStatus::Paid {
            return Err(AppError::BadRequest("Счёт уже оплачен".to_string()));
        }

        let key_id = self.gateway.key_id()?;
        let order = self
            .gateway
            .create_order(
                amount,
                bill.bill_number.clone(),
                json!({ "bill_id": bill.id, "customer_id": bill.customer_id }),
            )
            .await?;

        self.store
            .save_gateway_order(GatewayOrderRecord {
                order_id: order.id.clone(),
                bill_id: bill.id,
                customer_id: bill.customer_id,
                amount,
                created_at: Utc::now(),
            })
            .await?;
        tracing::info!(
            order_id = %order.id,
            bill_id = %bill.id,
            amount = %amount,
            "Gateway order created"
        );

        Ok(CreateOrderResponse {
            order,
            key_id,
            bill_id: bill.id,
        })
    }

    /// Проводит онлайн-платёж после проверки подписи. Счёт и сумма берутся из
    /// сохранённого заказа и должны совпадать с присланными. Повторный вызов с тем же
    /// `payment_id` возвращает уже проведённый платёж.
    pub async fn verify_gateway_payment(
        &self,
        request: VerifyPaymentRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Payment> {
        self.gateway
            .verify(&request.order_id, &request.payment_id, &request.signature)?;

        if let Some(existing) = self
            .store
            .find_payment_by_transaction(&request.payment_id)
            .await?
        {
            tracing::info!(payment_id = %existing.id, "Gateway payment already recorded");
            return Ok(existing);
        }

        let order = self
            .store
            .get_gateway_order(&request.order_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("Заказ не найден".to_string()))?;
        if order.bill_id != request.bill_id {
            return Err(AppError::Validation(
                "Заказ создан для другого счёта".to_string(),
            ));
        }
        if ledger::round_money(request.amount) != order.amount {
            tracing::warn!(
                order_id = %order.order_id,
                expected = %order.amount,
                claimed = %request.amount,
                "Gateway payment amount mismatch"
            );
            return Err(AppError::Validation(
                "Сумма не совпадает с суммой заказа".to_string(),
            ));
        }

        let result = self
            .record_payment(
                RecordPayment {
                    customer_id: order.customer_id,
                    bill_id: Some(order.bill_id),
                    amount: order.amount,
                    method: PaymentMethod::Online,
                    transaction_id: Some(request.payment_id.clone()),
                    gateway_order_id: Some(request.order_id.clone()),
                    received_by: None,
                    notes: None,
                },
                now,
            )
            .await;

        match result {
            Ok(applied) => Ok(applied.payment),
            // Параллельная проверка того же платежа успела провести его первой
            Err(AppError::Conflict(msg)) => self
                .store
                .find_payment_by_transaction(&request.payment_id)
                .await?
                .ok_or(AppError::Conflict(msg)),
            Err(e) => Err(e),
        }
    }

    pub async fn list_payments(&self, filter: PaymentFilter) -> AppResult<Vec<Payment>> {
        self.store.list_payments(filter).await
    }
}
