use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Customer, OutboundNotification};
use crate::services::{EmailService, SmsService};
use crate::storage::BillingStore;
use crate::utils::validators;

/// Доставка уведомления клиенту по всем его каналам.
///
/// Ошибка означает, что хотя бы один канал не сработал. Вызывающий код
/// никогда не откатывает из-за неё финансовые изменения.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        customer: &Customer,
        notification: &OutboundNotification,
    ) -> AppResult<()>;
}

/// Отправка без влияния на результат операции: ошибка только логируется.
pub async fn notify_best_effort(
    notifier: &dyn NotificationDispatcher,
    customer: &Customer,
    notification: &OutboundNotification,
) -> bool {
    match notifier.dispatch(customer, notification).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                customer_id = %customer.id,
                "Notification '{}' not delivered: {}",
                notification.title,
                e
            );
            false
        }
    }
}

/// In-app запись плюс SMS и email, если они включены у клиента и настроены.
pub struct NotificationService {
    store: Arc<dyn BillingStore>,
    sms: SmsService,
    email: Option<EmailService>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn BillingStore>, config: &Config) -> AppResult<Self> {
        let email = config.smtp.as_ref().map(EmailService::new).transpose()?;
        if email.is_none() {
            tracing::info!("SMTP not configured, email notifications disabled");
        }

        Ok(Self {
            store,
            sms: SmsService::new(config.clone()),
            email,
        })
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationService {
    async fn dispatch(
        &self,
        customer: &Customer,
        notification: &OutboundNotification,
    ) -> AppResult<()> {
        let mut failures = Vec::new();

        if let Err(e) = self.store.insert_notification(customer.id, notification).await {
            failures.push(format!("in_app: {}", e));
        }

        if customer.sms_enabled {
            let text = format!("{}: {}", notification.title, notification.message);
            if let Err(e) = self.sms.send_message(&customer.phone, &text).await {
                failures.push(e.to_string());
            }
        }

        if let (true, Some(address), Some(email)) =
            (customer.email_enabled, customer.email.as_deref(), &self.email)
        {
            if !validators::validate_email(address) {
                failures.push(format!("email: неверный адрес {}", address));
            } else if let Err(e) = email
                .send(address, &notification.title, &notification.message)
                .await
            {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Notification(failures.join("; ")))
        }
    }
}
