use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::utils::validators;
use serde::Deserialize;

pub struct SmsService {
    config: Config,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SmsApiResponse {
    code: i32,
    message: String,
}

impl SmsService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.sms_enabled && !self.config.sms_api_key.is_empty()
    }

    pub async fn send_message(&self, phone: &str, text: &str) -> AppResult<()> {
        if !self.is_enabled() {
            tracing::info!("SMS disabled. Message for {}: {}", phone, text);
            return Ok(());
        }

        if !validators::validate_phone(phone) {
            return Err(AppError::Notification(format!("sms: неверный номер {}", phone)));
        }

        let url = format!("{}?apiKey={}", self.config.sms_api_url, self.config.sms_api_key);

        let params = [
            ("recipient", phone),
            ("text", text),
            ("from", &self.config.sms_sender),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("sms: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Notification(format!("sms: {}", e)))?;

        if !status.is_success() {
            tracing::error!("SMS API error: {} - {}", status, body);
            return Err(AppError::Notification(format!("sms: HTTP {}", status)));
        }

        let result: SmsApiResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Notification(format!("sms: {}", e)))?;

        if result.code != 0 {
            tracing::error!("SMS send failed: {}", result.message);
            return Err(AppError::Notification(format!("sms: {}", result.message)));
        }

        tracing::info!("SMS sent to {}", phone);
        Ok(())
    }
}
