use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{BillingStore, STALE_JOB_RUN_MINUTES};
use crate::error::{AppError, AppResult};
use crate::models::{
    ActiveSubscription, AppliedPayment, Bill, BillFilter, BillItem, BillReminder, Customer,
    Delivery, DeliveryFilter, DeliveryItem, DeliveryStatus, DeliveryUpdate, GatewayOrderRecord,
    JobRun, JobRunStatus, NewBill, NewDelivery, NewPayment, OutboundNotification, Payment,
    PaymentFilter, Product, ReminderKind,
};
use crate::utils::ledger;

const BILL_PERIOD_CONSTRAINT: &str = "bills_customer_period_key";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_items(&self, mut deliveries: Vec<Delivery>) -> AppResult<Vec<Delivery>> {
        if deliveries.is_empty() {
            return Ok(deliveries);
        }

        let ids: Vec<Uuid> = deliveries.iter().map(|d| d.id).collect();
        let items = sqlx::query_as::<_, DeliveryItem>(
            "SELECT * FROM delivery_items WHERE delivery_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_delivery: HashMap<Uuid, Vec<DeliveryItem>> = HashMap::new();
        for item in items {
            by_delivery.entry(item.delivery_id).or_default().push(item);
        }
        for delivery in deliveries.iter_mut() {
            delivery.items = by_delivery.remove(&delivery.id).unwrap_or_default();
        }

        Ok(deliveries)
    }
}

fn constraint_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn get_customer(&self, id: Uuid) -> AppResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    async fn list_active_customers(&self) -> AppResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE is_active = true ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(customers)
    }

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list_active_subscriptions(&self) -> AppResult<Vec<ActiveSubscription>> {
        let subscriptions = sqlx::query_as::<_, ActiveSubscription>(
            r#"
            SELECT s.*,
                   p.name AS product_name,
                   p.unit AS product_unit,
                   p.price AS product_price
            FROM subscriptions s
            JOIN customers c ON c.id = s.customer_id
            JOIN products p ON p.id = s.product_id
            WHERE s.is_active = true
              AND c.is_active = true
              AND p.is_active = true
            ORDER BY s.customer_id, s.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn outstanding_balance(&self, customer_id: Uuid) -> AppResult<(Decimal, i64)> {
        let row: (Decimal, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(pending_amount), 0), COUNT(*)
            FROM bills
            WHERE customer_id = $1 AND pending_amount > 0
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_delivery(&self, new: NewDelivery) -> AppResult<Delivery> {
        let mut tx = self.pool.begin().await?;

        let mut delivery = sqlx::query_as::<_, Delivery>(
            r#"
            INSERT INTO deliveries
                (customer_id, deliverer_id, route_id, delivery_date, time_slot, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(new.deliverer_id)
        .bind(new.route_id)
        .bind(new.delivery_date)
        .bind(new.time_slot)
        .bind(new.amount())
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in new.items.iter().enumerate() {
            let row = sqlx::query_as::<_, DeliveryItem>(
                r#"
                INSERT INTO delivery_items
                    (delivery_id, position, product_id, product_name, unit, quantity, unit_price, total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(delivery.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.unit)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total())
            .fetch_one(&mut *tx)
            .await?;
            delivery.items.push(row);
        }

        tx.commit().await?;
        Ok(delivery)
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match delivery {
            Some(d) => Ok(self.attach_items(vec![d]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_deliveries(&self, filter: DeliveryFilter) -> AppResult<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT * FROM deliveries
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::date IS NULL OR delivery_date = $2)
              AND ($3::delivery_status IS NULL OR status = $3)
            ORDER BY delivery_date DESC, time_slot, created_at
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.customer_id)
        .bind(filter.date)
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        self.attach_items(deliveries).await
    }

    async fn delivery_exists(
        &self,
        customer_id: Uuid,
        date: NaiveDate,
        product_id: Uuid,
    ) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM deliveries d
                JOIN delivery_items i ON i.delivery_id = d.id
                WHERE d.customer_id = $1
                  AND d.delivery_date = $2
                  AND i.product_id = $3
            )
            "#,
        )
        .bind(customer_id)
        .bind(date)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn deliveries_in_range(
        &self,
        customer_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT * FROM deliveries
            WHERE customer_id = $1
              AND delivery_date BETWEEN $2 AND $3
            ORDER BY delivery_date, time_slot, created_at
            "#,
        )
        .bind(customer_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        self.attach_items(deliveries).await
    }

    async fn update_delivery(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        update: DeliveryUpdate,
    ) -> AppResult<Delivery> {
        let updated = sqlx::query_as::<_, Delivery>(
            r#"
            UPDATE deliveries
            SET status = $3,
                amount = $4,
                skip_reason = $5,
                skipped_by = $6,
                payment_status = $7,
                payment_method = $8,
                delivered_at = $9,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(update.status)
        .bind(update.amount)
        .bind(&update.skip_reason)
        .bind(update.skipped_by)
        .bind(update.payment_status)
        .bind(update.payment_method)
        .bind(update.delivered_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(d) = updated {
            return self
                .attach_items(vec![d])
                .await?
                .pop()
                .ok_or_else(|| AppError::Internal("delivery vanished".to_string()));
        }

        if self.get_delivery(id).await?.is_some() {
            Err(AppError::Conflict(
                "Статус доставки изменился, повторите запрос".to_string(),
            ))
        } else {
            Err(AppError::NotFound("Доставка не найдена".to_string()))
        }
    }

    async fn create_bill(&self, new: NewBill) -> AppResult<Bill> {
        let mut tx = self.pool.begin().await?;

        let (sequence,): (i64,) = sqlx::query_as("SELECT nextval('bill_number_seq')")
            .fetch_one(&mut *tx)
            .await?;
        let bill_number = ledger::bill_number(new.year, new.month as u32, sequence);

        let inserted = sqlx::query_as::<_, Bill>(
            r#"
            INSERT INTO bills
                (customer_id, bill_number, month, year, period_start, period_end, delivery_ids,
                 total_litres, delivered_count, skipped_count, subtotal, discount, tax,
                 total_amount, paid_amount, pending_amount, status, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(&bill_number)
        .bind(new.month)
        .bind(new.year)
        .bind(new.period_start)
        .bind(new.period_end)
        .bind(&new.delivery_ids)
        .bind(new.total_litres)
        .bind(new.delivered_count)
        .bind(new.skipped_count)
        .bind(new.subtotal)
        .bind(new.discount)
        .bind(new.tax)
        .bind(new.total_amount)
        .bind(new.status)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await;

        let bill = match inserted {
            Ok(bill) => bill,
            Err(e) => {
                return Err(match constraint_violation(&e).as_deref() {
                    Some(BILL_PERIOD_CONSTRAINT) => AppError::BillAlreadyExists,
                    Some(_) => AppError::Conflict(format!(
                        "Номер счёта {} уже занят",
                        bill_number
                    )),
                    None => AppError::from(e),
                });
            }
        };

        for (position, item) in new.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO bill_items
                    (bill_id, position, product_id, product_name, unit, quantity, unit_price, amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(bill.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.unit)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.amount)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            "UPDATE customers SET pending_amount = GREATEST(0, pending_amount + $2) WHERE id = $1",
        )
        .bind(bill.customer_id)
        .bind(bill.total_amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Клиент не найден".to_string()));
        }

        tx.commit().await?;
        Ok(bill)
    }

    async fn get_bill(&self, id: Uuid) -> AppResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bill)
    }

    async fn find_bill_for_period(
        &self,
        customer_id: Uuid,
        month: i32,
        year: i32,
    ) -> AppResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(
            "SELECT * FROM bills WHERE customer_id = $1 AND month = $2 AND year = $3",
        )
        .bind(customer_id)
        .bind(month)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bill)
    }

    async fn bill_items(&self, bill_id: Uuid) -> AppResult<Vec<BillItem>> {
        let items = sqlx::query_as::<_, BillItem>(
            "SELECT * FROM bill_items WHERE bill_id = $1 ORDER BY position",
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn list_bills(&self, filter: BillFilter) -> AppResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT * FROM bills
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::int IS NULL OR month = $2)
              AND ($3::int IS NULL OR year = $3)
              AND ($4::bill_status IS NULL OR status = $4)
            ORDER BY year DESC, month DESC, created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.customer_id)
        .bind(filter.month)
        .bind(filter.year)
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    async fn open_bills_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT * FROM bills
            WHERE status IN ('generated', 'sent', 'partial')
              AND due_date BETWEEN $1 AND $2
            ORDER BY due_date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    async fn open_bills_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT * FROM bills
            WHERE status IN ('generated', 'sent', 'partial')
              AND due_date < $1
            ORDER BY due_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    async fn mark_bill_sent(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Bill> {
        let updated = sqlx::query_as::<_, Bill>(
            r#"
            UPDATE bills SET status = 'sent', updated_at = $2
            WHERE id = $1 AND status = 'generated'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(bill) => Ok(bill),
            None => self
                .get_bill(id)
                .await?
                .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string())),
        }
    }

    async fn mark_bill_overdue(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE bills SET status = 'overdue', updated_at = $2
            WHERE id = $1
              AND status IN ('generated', 'sent', 'partial')
              AND pending_amount > 0
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_reminder(
        &self,
        bill_id: Uuid,
        kind: ReminderKind,
        days_until_due: i32,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO bill_reminders (bill_id, kind, days_until_due, sent_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(bill_id)
        .bind(kind)
        .bind(days_until_due)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bill_reminders(&self, bill_id: Uuid) -> AppResult<Vec<BillReminder>> {
        let reminders = sqlx::query_as::<_, BillReminder>(
            "SELECT * FROM bill_reminders WHERE bill_id = $1 ORDER BY sent_at",
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reminders)
    }

    async fn apply_payment(
        &self,
        new: NewPayment,
        now: DateTime<Utc>,
    ) -> AppResult<AppliedPayment> {
        let mut tx = self.pool.begin().await?;

        // Блокируем счёт до конца транзакции, чтобы параллельные платежи шли по очереди
        let bill = match new.bill_id {
            Some(bill_id) => Some(
                sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1 FOR UPDATE")
                    .bind(bill_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Счёт не найден".to_string()))?,
            ),
            None => None,
        };

        let inserted = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments
                (customer_id, bill_id, amount, method, status, transaction_id,
                 gateway_order_id, received_by, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(new.customer_id)
        .bind(new.bill_id)
        .bind(new.amount)
        .bind(new.method)
        .bind(new.status)
        .bind(&new.transaction_id)
        .bind(&new.gateway_order_id)
        .bind(new.received_by)
        .bind(&new.notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        let payment = match inserted {
            Ok(payment) => payment,
            Err(e) if constraint_violation(&e).is_some() => {
                return Err(AppError::Conflict(format!(
                    "Транзакция {} уже проведена",
                    new.transaction_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let bill = match bill {
            Some(bill) => {
                let settlement = ledger::settle(&bill, new.amount, now);
                let updated = sqlx::query_as::<_, Bill>(
                    r#"
                    UPDATE bills
                    SET paid_amount = $2, pending_amount = $3, status = $4, updated_at = $5
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(bill.id)
                .bind(settlement.paid_amount)
                .bind(settlement.pending_amount)
                .bind(settlement.status)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                Some(updated)
            }
            None => None,
        };

        let (customer_pending,): (Decimal,) = sqlx::query_as(
            r#"
            UPDATE customers
            SET pending_amount = GREATEST(0, pending_amount - $2)
            WHERE id = $1
            RETURNING pending_amount
            "#,
        )
        .bind(new.customer_id)
        .bind(new.amount)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Клиент не найден".to_string()))?;

        tx.commit().await?;

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
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE transaction_id = $1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(payment)
    }

    async fn list_payments(&self, filter: PaymentFilter) -> AppResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::uuid IS NULL OR bill_id = $2)
            ORDER BY created_at, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.customer_id)
        .bind(filter.bill_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    async fn save_gateway_order(&self, order: GatewayOrderRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO gateway_orders (order_id, bill_id, customer_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&order.order_id)
        .bind(order.bill_id)
        .bind(order.customer_id)
        .bind(order.amount)
        .bind(order.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if constraint_violation(&e).is_some() => Err(AppError::Conflict(format!(
                "Заказ {} уже сохранён",
                order.order_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_gateway_order(&self, order_id: &str) -> AppResult<Option<GatewayOrderRecord>> {
        let order = sqlx::query_as::<_, GatewayOrderRecord>(
            "SELECT * FROM gateway_orders WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn insert_notification(
        &self,
        user_id: Uuid,
        notification: &OutboundNotification,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, notification_type, title, body, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn start_job_run(
        &self,
        job_name: &str,
        run_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<JobRun>> {
        let stale_before = now - Duration::minutes(STALE_JOB_RUN_MINUTES);

        let run = sqlx::query_as::<_, JobRun>(
            r#"
            INSERT INTO job_runs (job_name, run_date, status, started_at)
            VALUES ($1, $2, 'running', $3)
            ON CONFLICT (job_name, run_date) DO UPDATE
            SET status = 'running',
                started_at = EXCLUDED.started_at,
                finished_at = NULL,
                processed = 0,
                failed = 0,
                error_summary = NULL
            WHERE job_runs.status = 'failed'
               OR (job_runs.status = 'running' AND job_runs.started_at < $4)
            RETURNING *
            "#,
        )
        .bind(job_name)
        .bind(run_date)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
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
        sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $2, processed = $3, failed = $4, error_summary = $5, finished_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(processed)
        .bind(failed)
        .bind(&error_summary)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_job_runs(&self, limit: i64) -> AppResult<Vec<JobRun>> {
        let runs = sqlx::query_as::<_, JobRun>(
            "SELECT * FROM job_runs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}
