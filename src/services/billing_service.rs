use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Bill, BillFilter, BillItemResponse, BillPaymentEntry, BillResponse, BatchError,
    CustomerBalanceResponse, GenerateAllBillsResponse, NewBill, NewBillItem, NotificationType,
    OutboundNotification, PaymentFilter,
};
use crate::services::aggregator::{self, Aggregation};
use crate::services::notification_service::{notify_best_effort, NotificationDispatcher};
use crate::storage::BillingStore;
use crate::utils::{ledger, validators};

const BILL_HISTORY_LIMIT: i64 = 500;

pub struct BillingService {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    offset: FixedOffset,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            notifier,
            offset,
        }
    }

    /// Счёт клиента за месяц. Повторная генерация за тот же период запрещена,
    /// окончательно это решает уникальный ключ хранилища.
    pub async fn generate_bill(&self, customer_id: Uuid, month: u32, year: i32) -> AppResult<Bill> {
        validators::validate_billing_month(month, year)?;

        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Клиент не найден".to_string()))?;

        if self
            .store
            .find_bill_for_period(customer_id, month as i32, year)
            .await?
            .is_some()
        {
            return Err(AppError::BillAlreadyExists);
        }

        let (period_start, period_end) = ledger::billing_period(month, year)?;
        let summary = match aggregator::aggregate_for_period(
            self.store.as_ref(),
            customer_id,
            period_start.date(),
            period_end.date(),
        )
        .await?
        {
            Aggregation::Billable(summary) => summary,
            Aggregation::NoBillableDeliveries { skipped_count } => {
                tracing::debug!(
                    customer_id = %customer_id,
                    skipped_count,
                    "No delivered items for {}/{}",
                    month,
                    year
                );
                return Err(AppError::NoBillableActivity);
            }
        };

        let discount = Decimal::ZERO;
        let tax = Decimal::ZERO;
        let total_amount = ledger::round_money(summary.subtotal - discount + tax);

        let new_bill = NewBill {
            customer_id,
            month: month as i32,
            year,
            period_start,
            period_end,
            delivery_ids: summary.delivery_ids,
            items: summary
                .lines
                .into_iter()
                .map(|line| NewBillItem {
                    product_id: line.product_id,
                    product_name: line.product_name,
                    unit: line.unit,
                    quantity: line.total_quantity,
                    unit_price: line.price_per_unit,
                    amount: line.total_amount,
                })
                .collect(),
            total_litres: summary.total_litres,
            delivered_count: summary.delivered_count as i32,
            skipped_count: summary.skipped_count as i32,
            subtotal: summary.subtotal,
            discount,
            tax,
            total_amount,
            status: ledger::initial_status(total_amount),
            due_date: ledger::due_date(month, year, self.offset)?,
        };

        let bill = self.store.create_bill(new_bill).await?;
        tracing::info!(
            bill_id = %bill.id,
            customer_id = %customer_id,
            total = %bill.total_amount,
            "Bill {} generated",
            bill.bill_number
        );
        Ok(bill)
    }

    /// Счета всем активным клиентам. Ошибка по одному клиенту не прерывает пакет.
    pub async fn generate_all_bills(
        &self,
        month: u32,
        year: i32,
    ) -> AppResult<GenerateAllBillsResponse> {
        validators::validate_billing_month(month, year)?;

        let customers = self.store.list_active_customers().await?;
        let mut result = GenerateAllBillsResponse::default();

        for customer in customers {
            match self.generate_bill(customer.id, month, year).await {
                Ok(_) => result.generated += 1,
                Err(AppError::NoBillableActivity) | Err(AppError::BillAlreadyExists) => {
                    result.skipped += 1
                }
                Err(e) => {
                    tracing::error!(customer_id = %customer.id, "Bill generation failed: {}", e);
                    result.errors.push(BatchError {
                        item_id: customer.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            generated = result.generated,
            skipped = result.skipped,
            failed = result.errors.len(),
            "Bills for {}/{} generated",
            month,
            year
        );
        Ok(result)
    }

    /// `generated → sent` и уведомление клиенту. Для других статусов счёт не меняется.
    pub async fn send_bill(&self, bill_id: Uuid, now: DateTime<Utc>) -> AppResult<Bill> {
        let bill = self.store.mark_bill_sent(bill_id, now).await?;

        if let Some(customer) = self.store.get_customer(bill.customer_id).await? {
            let notification = OutboundNotification::new(
                NotificationType::Bill,
                format!("Счёт {}", bill.bill_number),
                format!(
                    "Счёт за {:02}/{} на сумму {} ₹. Оплатить до {}.",
                    bill.month,
                    bill.year,
                    bill.total_amount,
                    bill.due_date.with_timezone(&self.offset).format("%d.%m.%Y")
                ),
            )
            .with_data(json!({ "bill_id": bill.id, "bill_number": bill.bill_number }));
            notify_best_effort(self.notifier.as_ref(), &customer, &notification).await;
        }

        Ok(bill)
    }

    pub async fn bill_details(&self, bill_id: Uuid) -> AppResult<BillResponse> {
        let bill = self
            .store
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?;

        let items = self.store.bill_items(bill.id).await?;
        let payments = self
            .store
            .list_payments(PaymentFilter {
                bill_id: Some(bill.id),
                limit: BILL_HISTORY_LIMIT,
                ..Default::default()
            })
            .await?;
        let reminders = self.store.bill_reminders(bill.id).await?;

        Ok(BillResponse {
            id: bill.id,
            customer_id: bill.customer_id,
            bill_number: bill.bill_number,
            month: bill.month,
            year: bill.year,
            period_start: bill.period_start,
            period_end: bill.period_end,
            delivery_ids: bill.delivery_ids,
            total_litres: bill.total_litres,
            delivered_count: bill.delivered_count,
            skipped_count: bill.skipped_count,
            subtotal: bill.subtotal,
            discount: bill.discount,
            tax: bill.tax,
            total_amount: bill.total_amount,
            paid_amount: bill.paid_amount,
            pending_amount: bill.pending_amount,
            status: bill.status,
            due_date: bill.due_date,
            items: items.into_iter().map(BillItemResponse::from).collect(),
            payments: payments
                .into_iter()
                .map(|p| BillPaymentEntry {
                    payment_id: p.id,
                    amount: p.amount,
                    method: p.method,
                    transaction_id: p.transaction_id,
                    paid_at: p.created_at,
                    received_by: p.received_by,
                    notes: p.notes,
                })
                .collect(),
            reminders,
            created_at: bill.created_at,
        })
    }

    pub async fn list_bills(&self, filter: BillFilter) -> AppResult<Vec<Bill>> {
        self.store.list_bills(filter).await
    }

    /// Кэш долга клиента рядом с суммой, пересчитанной по неоплаченным счетам.
    pub async fn customer_balance(&self, customer_id: Uuid) -> AppResult<CustomerBalanceResponse> {
        let customer = self
            .store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Клиент не найден".to_string()))?;

        let (outstanding_amount, unpaid_bills) =
            self.store.outstanding_balance(customer_id).await?;

        if outstanding_amount != customer.pending_amount {
            tracing::warn!(
                customer_id = %customer_id,
                cached = %customer.pending_amount,
                outstanding = %outstanding_amount,
                "Cached pending amount differs from unpaid bills"
            );
        }

        Ok(CustomerBalanceResponse {
            customer_id,
            cached_pending_amount: customer.pending_amount,
            outstanding_amount,
            unpaid_bills,
        })
    }
}
