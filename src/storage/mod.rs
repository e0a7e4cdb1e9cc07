//! Хранилище биллинга.
//!
//! Сервисы работают только через [`BillingStore`]. Реализация для PostgreSQL
//! живёт в [`postgres`], реализация в памяти процесса в [`memory`] (тесты и
//! локальный запуск без базы). Операции, которые меняют несколько записей
//! (создание счёта, проводка платежа), атомарны внутри одной реализации.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ActiveSubscription, AppliedPayment, Bill, BillFilter, BillItem, BillReminder, Customer,
    Delivery, DeliveryFilter, DeliveryStatus, DeliveryUpdate, GatewayOrderRecord, JobRun, JobRunStatus, NewBill,
    NewDelivery, NewPayment, OutboundNotification, Payment, PaymentFilter, Product, ReminderKind,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait BillingStore: Send + Sync {
    // Клиенты и каталог
    async fn get_customer(&self, id: Uuid) -> AppResult<Option<Customer>>;
    async fn list_active_customers(&self) -> AppResult<Vec<Customer>>;
    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>>;
    async fn list_active_subscriptions(&self) -> AppResult<Vec<ActiveSubscription>>;

    /// Пересчёт долга клиента по неоплаченным счетам: (сумма, количество счетов).
    async fn outstanding_balance(&self, customer_id: Uuid) -> AppResult<(Decimal, i64)>;

    // Доставки
    async fn create_delivery(&self, delivery: NewDelivery) -> AppResult<Delivery>;
    async fn get_delivery(&self, id: Uuid) -> AppResult<Option<Delivery>>;
    async fn list_deliveries(&self, filter: DeliveryFilter) -> AppResult<Vec<Delivery>>;
    async fn delivery_exists(
        &self,
        customer_id: Uuid,
        date: NaiveDate,
        product_id: Uuid,
    ) -> AppResult<bool>;
    /// Доставки клиента за закрытый интервал дат, в порядке даты.
    async fn deliveries_in_range(
        &self,
        customer_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<Delivery>>;
    /// Применяет переход, только если текущий статус равен `expected`.
    async fn update_delivery(
        &self,
        id: Uuid,
        expected: DeliveryStatus,
        update: DeliveryUpdate,
    ) -> AppResult<Delivery>;

    // Счета
    /// Создаёт счёт и увеличивает кэш долга клиента. Повтор ключа
    /// (клиент, месяц, год) возвращает `AppError::BillAlreadyExists`.
    async fn create_bill(&self, bill: NewBill) -> AppResult<Bill>;
    async fn get_bill(&self, id: Uuid) -> AppResult<Option<Bill>>;
    async fn find_bill_for_period(
        &self,
        customer_id: Uuid,
        month: i32,
        year: i32,
    ) -> AppResult<Option<Bill>>;
    async fn bill_items(&self, bill_id: Uuid) -> AppResult<Vec<BillItem>>;
    async fn list_bills(&self, filter: BillFilter) -> AppResult<Vec<Bill>>;
    /// Открытые счета со сроком оплаты в `[from, to]`.
    async fn open_bills_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Bill>>;
    /// Открытые счета, срок оплаты которых уже прошёл.
    async fn open_bills_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Bill>>;
    /// `generated → sent`; для остальных статусов возвращает счёт без изменений.
    async fn mark_bill_sent(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Bill>;
    /// Переводит открытый счёт в `overdue`. `false`, если статус уже не открытый.
    async fn mark_bill_overdue(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;
    async fn record_reminder(
        &self,
        bill_id: Uuid,
        kind: ReminderKind,
        days_until_due: i32,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()>;
    async fn bill_reminders(&self, bill_id: Uuid) -> AppResult<Vec<BillReminder>>;

    // Платежи
    /// Сохраняет платёж, обновляет счёт (если указан) и кэш долга клиента
    /// одной транзакцией. Статус счёта считает `ledger::settle`.
    async fn apply_payment(
        &self,
        payment: NewPayment,
        now: DateTime<Utc>,
    ) -> AppResult<AppliedPayment>;
    async fn find_payment_by_transaction(&self, transaction_id: &str)
        -> AppResult<Option<Payment>>;
    async fn list_payments(&self, filter: PaymentFilter) -> AppResult<Vec<Payment>>;
    async fn save_gateway_order(&self, order: GatewayOrderRecord) -> AppResult<()>;
    async fn get_gateway_order(&self, order_id: &str) -> AppResult<Option<GatewayOrderRecord>>;

    // Уведомления
    async fn insert_notification(
        &self,
        user_id: Uuid,
        notification: &OutboundNotification,
    ) -> AppResult<()>;

    // Запуски фоновых задач
    /// Занимает ключ (задача, день). `None`, если за этот день задача уже
    /// выполнена или сейчас выполняется.
    async fn start_job_run(
        &self,
        job_name: &str,
        run_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Option<JobRun>>;
    async fn finish_job_run(
        &self,
        id: Uuid,
        status: JobRunStatus,
        processed: i32,
        failed: i32,
        error_summary: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()>;
    async fn list_job_runs(&self, limit: i64) -> AppResult<Vec<JobRun>>;
}

/// Запуск со статусом `running` старше этого считается зависшим и может быть перезапущен.
pub const STALE_JOB_RUN_MINUTES: i64 = 60;
