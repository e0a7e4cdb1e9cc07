#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use dairy_billing::config::Config;
use dairy_billing::error::{AppError, AppResult};
use dairy_billing::models::{
    CreateDeliveryItemRequest, CreateDeliveryRequest, Customer, Delivery, OutboundNotification,
    Product, ProductUnit, Subscription, SubscriptionFrequency, TimeSlot,
};
use dairy_billing::services::{
    BillingService, DeliveryAction, DeliveryService, GatewayService, NotificationDispatcher,
    PaymentService,
};
use dairy_billing::storage::{BillingStore, MemoryStore};

/// Запоминает все уведомления вместо отправки.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, OutboundNotification)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Uuid, OutboundNotification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(
        &self,
        customer: &Customer,
        notification: &OutboundNotification,
    ) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((customer.id, notification.clone()));
        Ok(())
    }
}

/// Любой канал недоступен.
pub struct FailingNotifier;

#[async_trait]
impl NotificationDispatcher for FailingNotifier {
    async fn dispatch(&self, _: &Customer, _: &OutboundNotification) -> AppResult<()> {
        Err(AppError::Notification("sms: connection refused".to_string()))
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn customer(name: &str) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: "+919876543210".to_string(),
        email: None,
        is_active: true,
        pending_amount: Decimal::ZERO,
        sms_enabled: true,
        email_enabled: false,
        created_at: Utc::now(),
    }
}

pub fn milk(price: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: "Cow Milk".to_string(),
        unit: ProductUnit::Litre,
        price: Decimal::from(price),
        is_active: true,
        created_at: Utc::now(),
    }
}

pub fn daily_subscription(customer_id: Uuid, product_id: Uuid, start: NaiveDate) -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        customer_id,
        product_id,
        quantity: Decimal::ONE,
        time_slot: TimeSlot::Morning,
        frequency: SubscriptionFrequency::Daily,
        days_of_week: vec![],
        start_date: start,
        end_date: None,
        paused_until: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

/// Хранилище с одним клиентом и одним продуктом.
pub struct Fixture {
    pub memory: Arc<MemoryStore>,
    pub store: Arc<dyn BillingStore>,
    pub customer: Customer,
    pub product: Product,
}

impl Fixture {
    pub async fn new(price: i64) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let customer = customer("Asha");
        let product = milk(price);
        memory.add_customer(customer.clone()).await;
        memory.add_product(product.clone()).await;

        let store: Arc<dyn BillingStore> = memory.clone();
        Self {
            memory,
            store,
            customer,
            product,
        }
    }

    pub async fn add_customer(&self, name: &str) -> Customer {
        let customer = customer(name);
        self.memory.add_customer(customer.clone()).await;
        customer
    }

    pub fn deliveries(&self) -> DeliveryService {
        DeliveryService::new(self.store.clone())
    }

    pub fn billing(&self, notifier: Arc<dyn NotificationDispatcher>) -> BillingService {
        BillingService::new(
            self.store.clone(),
            notifier,
            Config::for_tests().scheduler.business_offset(),
        )
    }

    pub fn payments(&self, notifier: Arc<dyn NotificationDispatcher>) -> PaymentService {
        PaymentService::new(
            self.store.clone(),
            notifier,
            Arc::new(GatewayService::new(&Config::for_tests())),
        )
    }

    pub async fn schedule(&self, customer_id: Uuid, day: NaiveDate, litres: i64) -> Delivery {
        self.deliveries()
            .create_delivery(CreateDeliveryRequest {
                customer_id,
                delivery_date: day,
                time_slot: TimeSlot::Morning,
                deliverer_id: None,
                route_id: None,
                items: vec![CreateDeliveryItemRequest {
                    product_id: self.product.id,
                    quantity: Decimal::from(litres),
                    unit_price: None,
                }],
            })
            .await
            .unwrap()
    }

    /// Доставка, сразу отмеченная как выполненная.
    pub async fn deliver(&self, customer_id: Uuid, day: NaiveDate, litres: i64) -> Delivery {
        let delivery = self.schedule(customer_id, day, litres).await;
        self.deliveries()
            .apply(
                delivery.id,
                DeliveryAction::Deliver {
                    payment_method: None,
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    pub async fn customer_pending(&self, customer_id: Uuid) -> Decimal {
        self.store
            .get_customer(customer_id)
            .await
            .unwrap()
            .unwrap()
            .pending_amount
    }
}
