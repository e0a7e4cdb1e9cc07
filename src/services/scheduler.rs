//! Фоновые задачи: материализация доставок, напоминания об оплате, просрочка.
//!
//! Каждая задача выполняется не чаще раза в бизнес-день. Ключом служит запись
//! `JobRun` (задача, локальная дата). Упавший запуск подхватит следующий тик.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    JobKind, JobReport, JobRun, JobRunStatus, NewDelivery, NewDeliveryItem, NotificationType,
    OutboundNotification, ReminderKind,
};
use crate::services::notification_service::{notify_best_effort, NotificationDispatcher};
use crate::storage::BillingStore;
use crate::utils::ledger;

const MAX_ERROR_SUMMARY: usize = 20;

pub struct Scheduler {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    fn offset(&self) -> FixedOffset {
        self.config.business_offset()
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    fn job_hour(&self, job: JobKind) -> u32 {
        match job {
            JobKind::DeliveryMaterialization => self.config.delivery_job_hour,
            JobKind::PaymentReminders => self.config.reminder_job_hour,
            JobKind::OverdueTransition => self.config.overdue_job_hour,
        }
    }

    /// Запускает задачи, чей час на сегодня уже наступил.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<(JobKind, JobReport)> {
        let hour = now.with_timezone(&self.offset()).hour();
        let mut reports = Vec::new();

        for job in JobKind::ALL {
            if hour < self.job_hour(job) {
                continue;
            }
            match self.run_job(job, now).await {
                Ok(Some(report)) => reports.push((job, report)),
                Ok(None) => {}
                Err(e) => tracing::error!(job = job.name(), "Scheduled job failed: {}", e),
            }
        }

        reports
    }

    /// `None`, если за этот бизнес-день задача уже выполнена или выполняется.
    pub async fn run_job(&self, job: JobKind, now: DateTime<Utc>) -> AppResult<Option<JobReport>> {
        let run_date = self.local_date(now);
        let Some(run) = self.store.start_job_run(job.name(), run_date, now).await? else {
            tracing::debug!(job = job.name(), %run_date, "Job already ran today");
            return Ok(None);
        };

        tracing::info!(job = job.name(), run_id = %run.id, %run_date, "Job started");

        match self.execute(job, now).await {
            Ok(report) => {
                let summary = (!report.errors.is_empty()).then(|| {
                    report
                        .errors
                        .iter()
                        .take(MAX_ERROR_SUMMARY)
                        .map(|e| format!("{}: {}", e.item_id, e.error))
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                self.store
                    .finish_job_run(
                        run.id,
                        JobRunStatus::Completed,
                        report.processed as i32,
                        report.failed as i32,
                        summary,
                        Utc::now().max(now),
                    )
                    .await?;
                tracing::info!(
                    job = job.name(),
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Job completed"
                );
                Ok(Some(report))
            }
            Err(e) => {
                self.store
                    .finish_job_run(
                        run.id,
                        JobRunStatus::Failed,
                        0,
                        0,
                        Some(e.to_string()),
                        Utc::now().max(now),
                    )
                    .await?;
                Err(e)
            }
        }
    }

    pub async fn execute(&self, job: JobKind, now: DateTime<Utc>) -> AppResult<JobReport> {
        match job {
            JobKind::DeliveryMaterialization => self.materialize_deliveries(now).await,
            JobKind::PaymentReminders => self.send_payment_reminders(now).await,
            JobKind::OverdueTransition => self.mark_overdue_bills(now).await,
        }
    }

    /// Доставки на следующий бизнес-день по активным подпискам.
    pub async fn materialize_deliveries(&self, now: DateTime<Utc>) -> AppResult<JobReport> {
        let date = self.local_date(now) + Duration::days(1);
        let subscriptions = self.store.list_active_subscriptions().await?;
        let mut report = JobReport::default();

        for active in subscriptions {
            let subscription = &active.subscription;
            if !subscription.is_due_on(date) {
                continue;
            }

            match self
                .store
                .delivery_exists(subscription.customer_id, date, subscription.product_id)
                .await
            {
                Ok(true) => {
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(subscription_id = %subscription.id, "Delivery lookup failed: {}", e);
                    report.record_error(subscription.id, e);
                    continue;
                }
            }

            let delivery = NewDelivery {
                customer_id: subscription.customer_id,
                deliverer_id: None,
                route_id: None,
                delivery_date: date,
                time_slot: subscription.time_slot,
                items: vec![NewDeliveryItem {
                    product_id: subscription.product_id,
                    product_name: active.product_name.clone(),
                    unit: active.product_unit,
                    quantity: subscription.quantity,
                    unit_price: active.product_price,
                }],
            };

            match self.store.create_delivery(delivery).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    tracing::error!(subscription_id = %subscription.id, "Delivery not created: {}", e);
                    report.record_error(subscription.id, e);
                }
            }
        }

        Ok(report)
    }

    /// Напоминания по открытым счетам со сроком оплаты в ближайшие дни.
    pub async fn send_payment_reminders(&self, now: DateTime<Utc>) -> AppResult<JobReport> {
        let until = now + Duration::days(self.config.reminder_window_days);
        let bills = self.store.open_bills_due_between(now, until).await?;
        let mut report = JobReport::default();

        for bill in bills {
            let customer = match self.store.get_customer(bill.customer_id).await {
                Ok(Some(customer)) => customer,
                Ok(None) => {
                    report.record_error(bill.id, AppError::NotFound("Клиент не найден".to_string()));
                    continue;
                }
                Err(e) => {
                    report.record_error(bill.id, e);
                    continue;
                }
            };

            let days_until_due = ledger::days_until(bill.due_date, now);
            let notification = OutboundNotification::new(
                NotificationType::Reminder,
                "Напоминание об оплате",
                format!(
                    "По счёту {} осталось оплатить {} ₹. Срок оплаты через {} дн.",
                    bill.bill_number, bill.pending_amount, days_until_due
                ),
            )
            .with_data(json!({
                "bill_id": bill.id,
                "pending_amount": bill.pending_amount,
                "days_until_due": days_until_due,
            }));

            if let Err(e) = self.notifier.dispatch(&customer, &notification).await {
                tracing::warn!(bill_id = %bill.id, "Reminder not delivered: {}", e);
                report.record_error(bill.id, e);
                continue;
            }

            match self
                .store
                .record_reminder(bill.id, ReminderKind::DueSoon, days_until_due as i32, now)
                .await
            {
                Ok(()) => report.processed += 1,
                Err(e) => report.record_error(bill.id, e),
            }
        }

        Ok(report)
    }

    /// Перевод просроченных счетов в `overdue`. Повторный запуск ничего не меняет.
    pub async fn mark_overdue_bills(&self, now: DateTime<Utc>) -> AppResult<JobReport> {
        let bills = self.store.open_bills_past_due(now).await?;
        let mut report = JobReport::default();

        for bill in bills {
            match self.store.mark_bill_overdue(bill.id, now).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(bill_id = %bill.id, "Overdue transition failed: {}", e);
                    report.record_error(bill.id, e);
                    continue;
                }
            }

            let days_until_due = ledger::days_until(bill.due_date, now);
            if let Err(e) = self
                .store
                .record_reminder(bill.id, ReminderKind::Overdue, days_until_due as i32, now)
                .await
            {
                tracing::warn!(bill_id = %bill.id, "Overdue reminder not recorded: {}", e);
            }

            match self.store.get_customer(bill.customer_id).await {
                Ok(Some(customer)) => {
                    let notification = OutboundNotification::new(
                        NotificationType::Overdue,
                        "Счёт просрочен",
                        format!(
                            "Срок оплаты счёта {} истёк. Задолженность: {} ₹.",
                            bill.bill_number, bill.pending_amount
                        ),
                    )
                    .with_data(json!({ "bill_id": bill.id, "pending_amount": bill.pending_amount }))
                    .urgent();
                    notify_best_effort(self.notifier.as_ref(), &customer, &notification).await;
                }
                Ok(None) => tracing::warn!(bill_id = %bill.id, "Customer for overdue bill not found"),
                Err(e) => tracing::warn!(bill_id = %bill.id, "Customer lookup failed: {}", e),
            }
        }

        Ok(report)
    }

    pub async fn recent_runs(&self, limit: i64) -> AppResult<Vec<JobRun>> {
        self.store.list_job_runs(limit).await
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let tick_secs = self.config.tick_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(tick_secs));
            tracing::info!(tick_secs, "Scheduler started");

            loop {
                interval.tick().await;
                let reports = self.tick(Utc::now()).await;
                for (job, report) in reports {
                    tracing::debug!(job = job.name(), processed = report.processed, "Tick finished job");
                }
            }
        })
    }
}
