pub mod aggregator;
pub mod auth_service;
pub mod billing_service;
pub mod delivery_service;
pub mod email_service;
pub mod gateway_service;
pub mod notification_service;
pub mod payment_service;
pub mod scheduler;
pub mod sms_service;

pub use auth_service::AuthService;
pub use billing_service::BillingService;
pub use delivery_service::{DeliveryAction, DeliveryService, DeliveryTransition};
pub use email_service::EmailService;
pub use gateway_service::GatewayService;
pub use notification_service::{notify_best_effort, NotificationDispatcher, NotificationService};
pub use payment_service::{PaymentService, RecordPayment};
pub use scheduler::Scheduler;
pub use sms_service::SmsService;
