mod common;

use rust_decimal::Decimal;
use std::sync::Arc;

use common::{at, daily_subscription, date, FailingNotifier, Fixture, RecordingNotifier};
use dairy_billing::config::SchedulerConfig;
use dairy_billing::models::{
    Bill, BillStatus, DeliveryFilter, DeliveryStatus, JobKind, JobRunStatus, NotificationType,
    ReminderKind,
};
use dairy_billing::services::{NotificationDispatcher, Scheduler};
use dairy_billing::storage::BillingStore;

fn utc_config() -> SchedulerConfig {
    SchedulerConfig {
        enabled: false,
        utc_offset_minutes: 0,
        ..SchedulerConfig::default()
    }
}

fn scheduler(fx: &Fixture, notifier: Arc<dyn NotificationDispatcher>) -> Scheduler {
    Scheduler::new(fx.store.clone(), notifier, utc_config())
}

async fn march_bill(fx: &Fixture) -> Bill {
    fx.deliver(fx.customer.id, date(2025, 3, 10), 5).await;
    fx.billing(Arc::new(RecordingNotifier::default()))
        .generate_bill(fx.customer.id, 3, 2025)
        .await
        .unwrap()
}

async fn deliveries_on(fx: &Fixture, day: chrono::NaiveDate) -> usize {
    fx.store
        .list_deliveries(DeliveryFilter {
            date: Some(day),
            limit: 100,
            ..Default::default()
        })
        .await
        .unwrap()
        .len()
}

#[test]
fn test_local_date_uses_business_offset() {
    let store = Arc::new(dairy_billing::storage::MemoryStore::new());
    let ist = Scheduler::new(
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        SchedulerConfig::default(),
    );
    let utc = Scheduler::new(store, Arc::new(RecordingNotifier::default()), utc_config());

    // 20:00 UTC это уже следующий день по IST (+05:30)
    assert_eq!(ist.local_date(at(2025, 3, 10, 20)), date(2025, 3, 11));
    assert_eq!(utc.local_date(at(2025, 3, 10, 20)), date(2025, 3, 10));
}

#[tokio::test]
async fn test_materialization_runs_once_per_day() {
    let fx = Fixture::new(60).await;
    fx.memory
        .add_subscription(daily_subscription(
            fx.customer.id,
            fx.product.id,
            date(2025, 3, 1),
        ))
        .await;
    let scheduler = scheduler(&fx, Arc::new(RecordingNotifier::default()));
    let now = at(2025, 3, 10, 21);

    let report = scheduler
        .run_job(JobKind::DeliveryMaterialization, now)
        .await
        .unwrap()
        .expect("first run");
    assert_eq!(report.processed, 1);

    let again = scheduler
        .run_job(JobKind::DeliveryMaterialization, now)
        .await
        .unwrap();
    assert!(again.is_none());

    // Даже без защиты JobRun повторная материализация ничего не дублирует
    let direct = scheduler.materialize_deliveries(now).await.unwrap();
    assert_eq!(direct.processed, 0);
    assert_eq!(direct.skipped, 1);

    let tomorrow = date(2025, 3, 11);
    assert_eq!(deliveries_on(&fx, tomorrow).await, 1);
    let delivery = &fx
        .store
        .deliveries_in_range(fx.customer.id, tomorrow, tomorrow)
        .await
        .unwrap()[0];
    assert_eq!(delivery.status, DeliveryStatus::Scheduled);
    assert_eq!(delivery.amount, Decimal::from(60));
    assert_eq!(delivery.items[0].product_id, fx.product.id);

    let runs = scheduler.recent_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].job_name, "delivery_materialization");
    assert_eq!(runs[0].status, JobRunStatus::Completed);
    assert_eq!(runs[0].processed, 1);
}

#[tokio::test]
async fn test_materialization_skips_paused_subscription() {
    let fx = Fixture::new(60).await;
    let mut subscription = daily_subscription(fx.customer.id, fx.product.id, date(2025, 3, 1));
    subscription.paused_until = Some(date(2025, 3, 15));
    fx.memory.add_subscription(subscription).await;

    let report = scheduler(&fx, Arc::new(RecordingNotifier::default()))
        .materialize_deliveries(at(2025, 3, 10, 21))
        .await
        .unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(deliveries_on(&fx, date(2025, 3, 11)).await, 0);
}

#[tokio::test]
async fn test_tick_waits_for_job_hour() {
    let fx = Fixture::new(60).await;
    fx.memory
        .add_subscription(daily_subscription(
            fx.customer.id,
            fx.product.id,
            date(2025, 3, 1),
        ))
        .await;
    let scheduler = scheduler(&fx, Arc::new(RecordingNotifier::default()));

    // 10:00: напоминания (09:00) и просрочка (00:00) уже пора, доставки (20:00) ещё нет
    let morning: Vec<JobKind> = scheduler
        .tick(at(2025, 3, 10, 10))
        .await
        .into_iter()
        .map(|(job, _)| job)
        .collect();
    assert_eq!(
        morning,
        vec![JobKind::PaymentReminders, JobKind::OverdueTransition]
    );
    assert_eq!(deliveries_on(&fx, date(2025, 3, 11)).await, 0);

    let evening: Vec<JobKind> = scheduler
        .tick(at(2025, 3, 10, 20))
        .await
        .into_iter()
        .map(|(job, _)| job)
        .collect();
    assert_eq!(evening, vec![JobKind::DeliveryMaterialization]);
    assert_eq!(deliveries_on(&fx, date(2025, 3, 11)).await, 1);
}

#[tokio::test]
async fn test_overdue_transition_is_idempotent() {
    let fx = Fixture::new(60).await;
    let bill = march_bill(&fx).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&fx, notifier.clone());

    let before_due = scheduler.mark_overdue_bills(at(2025, 4, 6, 12)).await.unwrap();
    assert_eq!(before_due.processed, 0);

    let first = scheduler.mark_overdue_bills(at(2025, 4, 8, 0)).await.unwrap();
    let second = scheduler.mark_overdue_bills(at(2025, 4, 9, 0)).await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(second.processed, 0);

    let current = fx.store.get_bill(bill.id).await.unwrap().unwrap();
    assert_eq!(current.status, BillStatus::Overdue);

    let reminders = fx.store.bill_reminders(bill.id).await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].kind, ReminderKind::Overdue);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.notification_type, NotificationType::Overdue);
    assert!(sent[0].1.urgent);
}

#[tokio::test]
async fn test_overdue_notification_failure_still_transitions() {
    let fx = Fixture::new(60).await;
    let bill = march_bill(&fx).await;

    let report = scheduler(&fx, Arc::new(FailingNotifier))
        .mark_overdue_bills(at(2025, 4, 8, 0))
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    let current = fx.store.get_bill(bill.id).await.unwrap().unwrap();
    assert_eq!(current.status, BillStatus::Overdue);
}

#[tokio::test]
async fn test_reminders_for_bills_due_soon() {
    let fx = Fixture::new(60).await;
    let bill = march_bill(&fx).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = scheduler(&fx, notifier.clone());

    // До срока больше трёх дней
    let early = scheduler
        .send_payment_reminders(at(2025, 4, 1, 9))
        .await
        .unwrap();
    assert_eq!(early.processed, 0);

    let report = scheduler
        .send_payment_reminders(at(2025, 4, 5, 0))
        .await
        .unwrap();
    assert_eq!(report.processed, 1);

    let reminders = fx.store.bill_reminders(bill.id).await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].kind, ReminderKind::DueSoon);
    assert_eq!(reminders[0].days_until_due, 2);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.notification_type, NotificationType::Reminder);
}

#[tokio::test]
async fn test_failed_reminder_is_reported_and_not_recorded() {
    let fx = Fixture::new(60).await;
    let bill = march_bill(&fx).await;

    let report = scheduler(&fx, Arc::new(FailingNotifier))
        .send_payment_reminders(at(2025, 4, 5, 0))
        .await
        .unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].item_id, bill.id);
    assert!(fx.store.bill_reminders(bill.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_paid_bills_get_no_reminders() {
    let fx = Fixture::new(60).await;
    let bill = march_bill(&fx).await;
    fx.payments(Arc::new(RecordingNotifier::default()))
        .record_cash_payment(
            dairy_billing::models::CashPaymentRequest {
                customer_id: fx.customer.id,
                bill_id: Some(bill.id),
                amount: bill.total_amount,
                notes: None,
            },
            None,
            at(2025, 4, 2, 10),
        )
        .await
        .unwrap();

    let scheduler = scheduler(&fx, Arc::new(RecordingNotifier::default()));
    let reminders = scheduler
        .send_payment_reminders(at(2025, 4, 5, 0))
        .await
        .unwrap();
    let overdue = scheduler.mark_overdue_bills(at(2025, 4, 8, 0)).await.unwrap();

    assert_eq!(reminders.processed, 0);
    assert_eq!(overdue.processed, 0);
    let current = fx.store.get_bill(bill.id).await.unwrap().unwrap();
    assert_eq!(current.status, BillStatus::Paid);
}
