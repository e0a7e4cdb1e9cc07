use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BillingStore, STALE_JOB_RUN_MINUTES};
use crate::error::{AppError, AppResult};
use crate::models::{
    ActiveSubscription, AppliedPayment, Bill, BillFilter, BillItem, BillReminder, BillStatus,
    Customer, Delivery, DeliveryFilter, DeliveryItem, DeliveryPaymentStatus, DeliveryStatus,
    DeliveryUpdate, GatewayOrderRecord, JobRun, JobRunStatus, NewBill, NewDelivery, NewPayment, Notification,
    OutboundNotification, Payment, PaymentFilter, Product, ReminderKind, Subscription,
};
use crate::utils::ledger;

#[derive(Default)]
struct MemoryState {
    customers: HashMap<Uuid, Customer>,
    products: HashMap<Uuid, Product>,
    subscriptions: Vec<Subscription>,
    deliveries: Vec<Delivery>,
    bills: Vec<Bill>,
    bill_items: Vec<BillItem>,
    reminders: Vec<BillReminder>,
    payments: Vec<Payment>,
    gateway_orders: HashMap<String, GatewayOrderRecord>,
    notifications: Vec<Notification>,
    job_runs: Vec<JobRun>,
}

/// Хранилище в памяти процесса. Один мьютекс на всё состояние, поэтому каждая
/// операция трейта атомарна так же, как транзакция в [`super::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn page<T: Clone>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_customer(&self, customer: Customer) {
        self.state.lock().await.customers.insert(customer.id, customer);
    }

    pub async fn add_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn add_subscription(&self, subscription: Subscription) {
        self.state.lock().await.subscriptions.push(subscription);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn get_customer(&self, id: Uuid) -> AppResult<Option<Customer>> {
        Ok(self.state.lock().await.customers.get(&id).cloned())
    }

    async fn list_active_customers(&self) -> AppResult<Vec<Customer>> {
        let state = self.state.lock().await;
        let mut customers: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        customers.sort_by_key(|c| (c.created_at, c.id));
        Ok(customers)
    }

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_active_subscriptions(&self) -> AppResult<Vec<ActiveSubscription>> {
        let state = self.state.lock().await;
        let subscriptions = state
            .subscriptions
            .iter()
            .filter(|s| s.is_active)
            .filter(|s| state.customers.get(&s.customer_id).is_some_and(|c| c.is_active))
            .filter_map(|s| {
                let product = state.products.get(&s.product_id).filter(|p| p.is_active)?;
                Some(ActiveSubscription {
                    subscription: s.clone(),
                    product_name: product.name.clone(),
                    product_unit: product.unit,
                    product_price: product.price,
                })
            })
            .collect();
        Ok(subscriptions)
    }

    async fn outstanding_balance(&self, customer_id: Uuid) -> AppResult<(Decimal, i64)> {
        let state = self.state.lock().await;
        let unpaid: Vec<&Bill> = state
            .bills
            .iter()
            .filter(|b| b.customer_id == customer_id && b.pending_amount > Decimal::ZERO)
            .collect();
        let total = unpaid.iter().map(|b| b.pending_amount).sum();
        Ok((total, unpaid.len() as i64))
    }

    async fn create_delivery(&self, new: NewDelivery) -> AppResult<Delivery> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = Uuid::new_v4();

        let items = new
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| DeliveryItem {
                id: Uuid::new_v4(),
                delivery_id: id,
                position: position as i32,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                unit: item.unit,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total: item.total(),
            })
            .collect();

        let delivery = Delivery {
            id,
            customer_id: new.customer_id,
            deliverer_id: new.deliverer_id,
            route_id: new.route_id,
            delivery_date: new.delivery_date,
            time_slot: new.time_slot,
            amount: new.amount(),
            status: DeliveryStatus::Scheduled,
            skip_reason: None,
            skipped_by: None,
            payment_status: DeliveryPaymentStatus::Unpaid,
            payment_method: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            items,
        };

        state.deliveries.push(delivery.clone());
        Ok(delivery)
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<Option<Delivery>> {
        let state = self.state.lock().await;
        Ok(state.deliveries.iter().find(|d| d.id == id).cloned())
    }

    async fn list_deliveries(&self, filter: DeliveryFilter) -> AppResult<Vec<Delivery>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Delivery> = state
            .deliveries
            .iter()
            .filter(|d| filter.customer_id.map_or(true, |id| d.customer_id == id))
            .filter(|d| filter.date.map_or(true, |date| d.delivery_date == date))
            .filter(|d| filter.status.map_or(true, |status| d.status == status))
            .collect();
        matching.sort_by(|a, b| {
            b.delivery_date
                .cmp(&a.delivery_date)
                .then(a.time_slot.cmp(&b.time_slot))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(page(matching.into_iter().cloned(), filter.limit, filter.offset))
    }

    async fn delivery_exists(
        &self,
        customer_id: Uuid,
        date: NaiveDate,
        product_id: Uuid,
    ) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state.deliveries.iter().any(|d| {
            d.customer_id == customer_id
                && d.delivery_date == date
                && d.items.iter().any(|i| i.product_id == product_id)
        }))
    }

    async fn deliveries_in_range(
        &self,
        customer_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<Delivery>> {
        let state = self.state.lock().await;
        let mut deliveries: Vec<Delivery> = state
            .deliveries
            .iter()
            .filter(|d| {
                d.customer_id == customer_id && d.delivery_date >= start && d.delivery_date <= end
            })
            .cloned()
            .collect();
        deliveries.sort_by_key(|d| d.delivery_date);
        Ok(deliveries)
    }

    async fn update_delivery(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        update: DeliveryUpdate,
    ) -> AppResult<Delivery> {
        let mut state = self.state.lock().await;
        let delivery = state
            .deliveries
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound("Доставка не найдена".to_string()))?;

        if delivery.status != expected {
            return Err(AppError::Conflict(
                "Статус доставки изменился, повторите запрос".to_string(),
            ));
        }

        delivery.status = update.status;
        delivery.amount = update.amount;
        delivery.skip_reason = update.skip_reason;
        delivery.skipped_by = update.skipped_by;
        delivery.payment_status = update.payment_status;
        delivery.payment_method = update.payment_method;
        delivery.delivered_at = update.delivered_at;
        delivery.updated_at = Utc::now();

        Ok(delivery.clone())
    }

    async fn create_bill(&self, new: NewBill) -> AppResult<Bill> {
        let mut state = self.state.lock().await;

        if state.bills.iter().any(|b| {
            b.customer_id == new.customer_id && b.month == new.month && b.year == new.year
        }) {
            return Err(AppError::BillAlreadyExists);
        }
        if !state.customers.contains_key(&new.customer_id) {
            return Err(AppError::NotFound("Клиент не найден".to_string()));
        }

        let now = Utc::now();
        let sequence = state.bills.len() as i64 + 1;
        let bill = Bill {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            bill_number: ledger::bill_number(new.year, new.month as u32, sequence),
            month: new.month,
            year: new.year,
            period_start: new.period_start,
            period_end: new.period_end,
            delivery_ids: new.delivery_ids,
            total_litres: new.total_litres,
            delivered_count: new.delivered_count,
            skipped_count: new.skipped_count,
            subtotal: new.subtotal,
            discount: new.discount,
            tax: new.tax,
            total_amount: new.total_amount,
            paid_amount: Decimal::ZERO,
            pending_amount: ledger::pending_amount(new.total_amount, Decimal::ZERO),
            status: new.status,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };

        for (position, item) in new.items.into_iter().enumerate() {
            state.bill_items.push(BillItem {
                id: Uuid::new_v4(),
                bill_id: bill.id,
                position: position as i32,
                product_id: item.product_id,
                product_name: item.product_name,
                unit: item.unit,
                quantity: item.quantity,
                unit_price: item.unit_price,
                amount: item.amount,
            });
        }

        if let Some(customer) = state.customers.get_mut(&bill.customer_id) {
            customer.pending_amount = (customer.pending_amount + bill.total_amount).max(Decimal::ZERO);
        }

        state.bills.push(bill.clone());
        Ok(bill)
    }

    async fn get_bill(&self, id: Uuid) -> AppResult<Option<Bill>> {
        let state = self.state.lock().await;
        Ok(state.bills.iter().find(|b| b.id == id).cloned())
    }

    async fn find_bill_for_period(
        &self,
        customer_id: Uuid,
        month: i32,
        year: i32,
    ) -> AppResult<Option<Bill>> {
        let state = self.state.lock().await;
        Ok(state
            .bills
            .iter()
            .find(|b| b.customer_id == customer_id && b.month == month && b.year == year)
            .cloned())
    }

    async fn bill_items(&self, bill_id: Uuid) -> AppResult<Vec<BillItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<BillItem> = state
            .bill_items
            .iter()
            .filter(|i| i.bill_id == bill_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn list_bills(&self, filter: BillFilter) -> AppResult<Vec<Bill>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Bill> = state
            .bills
            .iter()
            .filter(|b| filter.customer_id.map_or(true, |id| b.customer_id == id))
            .filter(|b| filter.month.map_or(true, |m| b.month == m))
            .filter(|b| filter.year.map_or(true, |y| b.year == y))
            .filter(|b| filter.status.map_or(true, |s| b.status == s))
            .collect();
        matching.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
        Ok(page(matching.into_iter().cloned(), filter.limit, filter.offset))
    }

    async fn open_bills_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Bill>> {
        let state = self.state.lock().await;
        Ok(state
            .bills
            .iter()
            .filter(|b| b.status.is_open() && b.due_date >= from && b.due_date <= to)
            .cloned()
            .collect())
    }

    async fn open_bills_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Bill>> {
        let state = self.state.lock().await;
        Ok(state
            .bills
            .iter()
            .filter(|b| b.status.is_open() && b.due_date < now)
            .cloned()
            .collect())
    }

    async fn mark_bill_sent(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Bill> {
        let mut state = self.state.lock().await;
        let bill = state
            .bills
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?;

        if bill.status == BillStatus::Generated {
            bill.status = BillStatus::Sent;
            bill.updated_at = now;
        }
        Ok(bill.clone())
    }

    async fn mark_bill_overdue(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.bills.iter_mut().find(|b| b.id == id) {
            Some(bill) if bill.status.is_open() && bill.pending_amount > Decimal::ZERO => {
                bill.status = BillStatus::Overdue;
                bill.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_reminder(
        &self,
        bill_id: Uuid,
        kind: ReminderKind,
        days_until_due: i32,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.state.lock().await.reminders.push(BillReminder {
            id: Uuid::new_v4(),
            bill_id,
            kind,
            days_until_due,
            sent_at,
        });
        Ok(())
    }

    async fn bill_reminders(&self, bill_id: Uuid) -> AppResult<Vec<BillReminder>> {
        let state = self.state.lock().await;
        Ok(state
            .reminders
            .iter()
            .filter(|r| r.bill_id == bill_id)
            .cloned()
            .collect())
    }

    async fn apply_payment(
        &self,
        new: NewPayment,
        now: DateTime<Utc>,
    ) -> AppResult<AppliedPayment> {
        let mut state = self.state.lock().await;

        // Все проверки до первой мутации: операция либо применяется целиком, либо никак
        let bill_index = match new.bill_id {
            Some(bill_id) => Some(
                state
                    .bills
                    .iter()
                    .position(|b| b.id == bill_id)
                    .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?,
            ),
            None => None,
        };
        if !state.customers.contains_key(&new.customer_id) {
            return Err(AppError::NotFound("Клиент не найден".to_string()));
        }
        if state
            .payments
            .iter()
            .any(|p| p.transaction_id == new.transaction_id)
        {
            return Err(AppError::Conflict(format!(
                "Транзакция {} уже проведена",
                new.transaction_id
            )));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            bill_id: new.bill_id,
            amount: new.amount,
            method: new.method,
            status: new.status,
            transaction_id: new.transaction_id,
            gateway_order_id: new.gateway_order_id,
            received_by: new.received_by,
            notes: new.notes,
            created_at: now,
        };
        state.payments.push(payment.clone());

        let bill = match bill_index {
            Some(index) => {
                let bill = &mut state.bills[index];
                let settlement = ledger::settle(bill, payment.amount, now);
                bill.paid_amount = settlement.paid_amount;
                bill.pending_amount = settlement.pending_amount;
                bill.status = settlement.status;
                bill.updated_at = now;
                Some(bill.clone())
            }
            None => None,
        };

        let customer_pending = match state.customers.get_mut(&payment.customer_id) {
            Some(customer) => {
                customer.pending_amount =
                    (customer.pending_amount - payment.amount).max(Decimal::ZERO);
                customer.pending_amount
            }
            None => Decimal::ZERO,
        };

        Ok(AppliedPayment {
            payment,
            bill,
            customer_pending,
        })
    }

    async fn find_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> AppResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_payments(&self, filter: PaymentFilter) -> AppResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let matching = state
            .payments
            .iter()
            .filter(|p| filter.customer_id.map_or(true, |id| p.customer_id == id))
            .filter(|p| filter.bill_id.map_or(true, |id| p.bill_id == Some(id)))
            .cloned();
        Ok(page(matching, filter.limit, filter.offset))
    }

    async fn save_gateway_order(&self, order: GatewayOrderRecord) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.gateway_orders.contains_key(&order.order_id) {
            return Err(AppError::Conflict(format!(
                "Заказ {} уже сохранён",
                order.order_id
            )));
        }
        state.gateway_orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    async fn get_gateway_order(&self, order_id: &str) -> AppResult<Option<GatewayOrderRecord>> {
        let state = self.state.lock().await;
        Ok(state.gateway_orders.get(order_id).cloned())
    }

    async fn insert_notification(
        &self,
        user_id: Uuid,
        notification: &OutboundNotification,
    ) -> AppResult<()> {
        self.state.lock().await.notifications.push(Notification {
            id: Uuid::new_v4(),
            user_id,
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            body: Some(notification.message.clone()),
            data: notification.data.clone(),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn start_job_run(
        &self,
        job_name: &str,
        run_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<JobRun>> {
        let mut state = self.state.lock().await;
        let stale_before = now - Duration::minutes(STALE_JOB_RUN_MINUTES);

        if let Some(run) = state
            .job_runs
            .iter_mut()
            .find(|r| r.job_name == job_name && r.run_date == run_date)
        {
            let retryable = run.status == JobRunStatus::Failed
                || (run.status == JobRunStatus::Running && run.started_at < stale_before);
            if !retryable {
                return Ok(None);
            }
            run.status = JobRunStatus::Running;
            run.started_at = now;
            run.finished_at = None;
            run.processed = 0;
            run.failed = 0;
            run.error_summary = None;
            return Ok(Some(run.clone()));
        }

        let run = JobRun {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            run_date,
            status: JobRunStatus::Running,
            processed: 0,
            failed: 0,
            error_summary: None,
            started_at: now,
            finished_at: None,
        };
        state.job_runs.push(run.clone());
        Ok(Some(run))
    }

    async fn finish_job_run(
        &self,
        id: Uuid,
        status: JobRunStatus,
        processed: i32,
        failed: i32,
        error_summary: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(run) = state.job_runs.iter_mut().find(|r| r.id == id) {
            run.status = status;
            run.processed = processed;
            run.failed = failed;
            run.error_summary = error_summary;
            run.finished_at = Some(now);
        }
        Ok(())
    }

    async fn list_job_runs(&self, limit: i64) -> AppResult<Vec<JobRun>> {
        let state = self.state.lock().await;
        let mut runs = state.job_runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }
}
