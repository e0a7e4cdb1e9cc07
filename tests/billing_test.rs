mod common;

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use common::{at, date, Fixture, RecordingNotifier};
use dairy_billing::config::Config;
use dairy_billing::error::AppError;
use dairy_billing::models::{
    BillFilter, BillStatus, NewBill, NewBillItem, NotificationType, PaymentMethod, ProductUnit,
    SkipInitiator,
};
use dairy_billing::services::{DeliveryAction, NotificationService, RecordPayment, Scheduler};
use dairy_billing::storage::BillingStore;
use dairy_billing::utils::ledger;
use uuid::Uuid;

fn march_bill(fx: &Fixture, total: i64) -> NewBill {
    let (period_start, period_end) = ledger::billing_period(3, 2025).unwrap();
    NewBill {
        customer_id: fx.customer.id,
        month: 3,
        year: 2025,
        period_start,
        period_end,
        delivery_ids: vec![Uuid::new_v4()],
        items: vec![NewBillItem {
            product_id: fx.product.id,
            product_name: fx.product.name.clone(),
            unit: ProductUnit::Litre,
            quantity: Decimal::from(2),
            unit_price: Decimal::from(total) / Decimal::from(2),
            amount: Decimal::from(total),
        }],
        total_litres: Decimal::from(2),
        delivered_count: 1,
        skipped_count: 0,
        subtotal: Decimal::from(total),
        discount: Decimal::ZERO,
        tax: Decimal::ZERO,
        total_amount: Decimal::from(total),
        status: ledger::initial_status(Decimal::from(total)),
        due_date: at(2025, 4, 7, 0),
    }
}

async fn bills_of(fx: &Fixture) -> usize {
    fx.store
        .list_bills(BillFilter {
            customer_id: Some(fx.customer.id),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_bill_sums_delivered_items_for_month() {
    let fx = Fixture::new(60).await;
    let notifier = Arc::new(RecordingNotifier::default());

    fx.deliver(fx.customer.id, date(2025, 3, 2), 2).await;
    fx.deliver(fx.customer.id, date(2025, 3, 3), 3).await;
    let skipped = fx.schedule(fx.customer.id, date(2025, 3, 4), 1).await;
    fx.deliveries()
        .apply(
            skipped.id,
            DeliveryAction::Skip {
                reason: "Уехали".to_string(),
                initiator: SkipInitiator::Customer,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    // Апрельская доставка не попадает в мартовский счёт
    fx.deliver(fx.customer.id, date(2025, 4, 1), 4).await;

    let bill = fx
        .billing(notifier.clone())
        .generate_bill(fx.customer.id, 3, 2025)
        .await
        .unwrap();

    assert_eq!(bill.bill_number, "MDF-202503-00001");
    assert_eq!(bill.subtotal, Decimal::from(300));
    assert_eq!(bill.total_amount, Decimal::from(300));
    assert_eq!(bill.pending_amount, Decimal::from(300));
    assert_eq!(bill.paid_amount, Decimal::ZERO);
    assert_eq!(bill.total_litres, Decimal::from(5));
    assert_eq!(bill.delivered_count, 2);
    assert_eq!(bill.skipped_count, 1);
    assert_eq!(bill.delivery_ids.len(), 2);
    assert_eq!(bill.status, BillStatus::Generated);
    assert_eq!(bill.due_date, at(2025, 4, 7, 0));

    let items = fx.store.bill_items(bill.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, Decimal::from(5));
    assert_eq!(items[0].amount, Decimal::from(300));

    assert_eq!(fx.customer_pending(fx.customer.id).await, Decimal::from(300));
    // Генерация сама не уведомляет клиента
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_second_bill_for_same_period_is_rejected() {
    let fx = Fixture::new(60).await;
    let billing = fx.billing(Arc::new(RecordingNotifier::default()));
    fx.deliver(fx.customer.id, date(2025, 3, 2), 2).await;

    billing.generate_bill(fx.customer.id, 3, 2025).await.unwrap();
    let second = billing.generate_bill(fx.customer.id, 3, 2025).await;

    assert!(matches!(second, Err(AppError::BillAlreadyExists)));
    let bills = fx
        .store
        .list_bills(BillFilter {
            customer_id: Some(fx.customer.id),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(fx.customer_pending(fx.customer.id).await, Decimal::from(120));
}

#[tokio::test]
async fn test_store_key_rejects_second_bill_for_period() {
    let fx = Fixture::new(60).await;

    fx.store.create_bill(march_bill(&fx, 120)).await.unwrap();
    // Ключ (клиент, месяц, год) срабатывает и без предварительной проверки сервиса
    let second = fx.store.create_bill(march_bill(&fx, 120)).await;

    assert!(matches!(second, Err(AppError::BillAlreadyExists)));
    assert_eq!(bills_of(&fx).await, 1);
    assert_eq!(fx.customer_pending(fx.customer.id).await, Decimal::from(120));
    let stored = fx
        .store
        .find_bill_for_period(fx.customer.id, 3, 2025)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fx.store.bill_items(stored.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_generation_creates_one_bill() {
    let fx = Fixture::new(60).await;
    let billing = fx.billing(Arc::new(RecordingNotifier::default()));
    fx.deliver(fx.customer.id, date(2025, 3, 2), 2).await;

    let (first, second) = tokio::join!(
        billing.generate_bill(fx.customer.id, 3, 2025),
        billing.generate_bill(fx.customer.id, 3, 2025)
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(AppError::BillAlreadyExists)))
            .count(),
        1
    );
    assert_eq!(bills_of(&fx).await, 1);
    assert_eq!(fx.customer_pending(fx.customer.id).await, Decimal::from(120));
}

#[tokio::test]
async fn test_zero_total_bill_is_created_paid() {
    let fx = Fixture::new(0).await;
    let billing = fx.billing(Arc::new(RecordingNotifier::default()));
    fx.deliver(fx.customer.id, date(2025, 3, 2), 1).await;

    let bill = billing.generate_bill(fx.customer.id, 3, 2025).await.unwrap();

    assert_eq!(bill.total_amount, Decimal::ZERO);
    assert_eq!(bill.pending_amount, Decimal::ZERO);
    assert_eq!(bill.status, BillStatus::Paid);
    assert_eq!(fx.customer_pending(fx.customer.id).await, Decimal::ZERO);

    // Оплаченный счёт не попадает ни в напоминания, ни в просрочку
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = Scheduler::new(
        fx.store.clone(),
        notifier.clone(),
        Config::for_tests().scheduler,
    );
    let reminders = scheduler
        .send_payment_reminders(at(2025, 4, 5, 0))
        .await
        .unwrap();
    let overdue = scheduler.mark_overdue_bills(at(2025, 4, 9, 0)).await.unwrap();
    assert_eq!(reminders.processed, 0);
    assert_eq!(overdue.processed, 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_month_without_deliveries_is_not_billable() {
    let fx = Fixture::new(60).await;
    let billing = fx.billing(Arc::new(RecordingNotifier::default()));

    let empty = billing.generate_bill(fx.customer.id, 3, 2025).await;
    assert!(matches!(empty, Err(AppError::NoBillableActivity)));

    // Только пропуски тоже не дают счёта
    let delivery = fx.schedule(fx.customer.id, date(2025, 3, 5), 1).await;
    fx.deliveries()
        .apply(
            delivery.id,
            DeliveryAction::Skip {
                reason: "Праздник".to_string(),
                initiator: SkipInitiator::Admin,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let skipped_only = billing.generate_bill(fx.customer.id, 3, 2025).await;
    assert!(matches!(skipped_only, Err(AppError::NoBillableActivity)));

    assert!(fx
        .store
        .find_bill_for_period(fx.customer.id, 3, 2025)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_invalid_month_and_unknown_customer() {
    let fx = Fixture::new(60).await;
    let billing = fx.billing(Arc::new(RecordingNotifier::default()));

    assert!(matches!(
        billing.generate_bill(fx.customer.id, 13, 2025).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        billing.generate_bill(uuid::Uuid::new_v4(), 3, 2025).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_generate_all_counts_generated_and_skipped() {
    let fx = Fixture::new(50).await;
    let billing = fx.billing(Arc::new(RecordingNotifier::default()));

    let idle = fx.add_customer("Idle").await;
    let billed = fx.add_customer("Billed").await;
    fx.deliver(fx.customer.id, date(2025, 3, 1), 1).await;
    fx.deliver(billed.id, date(2025, 3, 1), 2).await;
    billing.generate_bill(billed.id, 3, 2025).await.unwrap();

    let result = billing.generate_all_bills(3, 2025).await.unwrap();

    assert_eq!(result.generated, 1);
    assert_eq!(result.skipped, 2);
    assert!(result.errors.is_empty());
    assert!(fx
        .store
        .find_bill_for_period(idle.id, 3, 2025)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_send_bill_marks_sent_and_notifies() {
    let fx = Fixture::new(60).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let billing = fx.billing(notifier.clone());
    fx.deliver(fx.customer.id, date(2025, 3, 2), 1).await;
    let bill = billing.generate_bill(fx.customer.id, 3, 2025).await.unwrap();

    let sent = billing.send_bill(bill.id, at(2025, 4, 1, 8)).await.unwrap();

    assert_eq!(sent.status, BillStatus::Sent);
    let messages = notifier.sent();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, fx.customer.id);
    assert_eq!(messages[0].1.notification_type, NotificationType::Bill);
    assert!(messages[0].1.title.contains(&bill.bill_number));
}

#[tokio::test]
async fn test_send_bill_writes_in_app_notification() {
    let fx = Fixture::new(60).await;
    let service = NotificationService::new(fx.store.clone(), &Config::for_tests()).unwrap();
    let billing = fx.billing(Arc::new(service));
    fx.deliver(fx.customer.id, date(2025, 3, 2), 1).await;
    let bill = billing.generate_bill(fx.customer.id, 3, 2025).await.unwrap();

    billing.send_bill(bill.id, at(2025, 4, 1, 8)).await.unwrap();

    // SMS выключен в тестовой конфигурации, остаётся только запись в приложении
    let notifications = fx.memory.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, fx.customer.id);
    assert_eq!(notifications[0].notification_type, NotificationType::Bill);
}

#[tokio::test]
async fn test_bill_details_and_balance_follow_payments() {
    let fx = Fixture::new(100).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let billing = fx.billing(notifier.clone());
    fx.deliver(fx.customer.id, date(2025, 3, 2), 10).await;
    let bill = billing.generate_bill(fx.customer.id, 3, 2025).await.unwrap();

    fx.payments(notifier)
        .record_payment(
            RecordPayment {
                customer_id: fx.customer.id,
                bill_id: Some(bill.id),
                amount: Decimal::from(250),
                method: PaymentMethod::Upi,
                transaction_id: Some("UPI-778812".to_string()),
                gateway_order_id: None,
                received_by: None,
                notes: Some("  первый платёж ".to_string()),
            },
            at(2025, 4, 2, 10),
        )
        .await
        .unwrap();

    let details = billing.bill_details(bill.id).await.unwrap();
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.payments[0].transaction_id, "UPI-778812");
    assert_eq!(details.payments[0].notes.as_deref(), Some("первый платёж"));
    assert_eq!(details.paid_amount, Decimal::from(250));
    assert_eq!(details.status, BillStatus::Partial);

    let balance = billing.customer_balance(fx.customer.id).await.unwrap();
    assert_eq!(balance.cached_pending_amount, Decimal::from(750));
    assert_eq!(balance.outstanding_amount, Decimal::from(750));
    assert_eq!(balance.unpaid_bills, 1);
}
