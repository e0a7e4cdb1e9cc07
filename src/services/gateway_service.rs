//! Клиент платёжного шлюза (Razorpay Orders API) и проверка подписи платежа.

use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::GatewayOrder;
use crate::utils::ledger;

type HmacSha256 = Hmac<Sha256>;

pub const CURRENCY: &str = "INR";

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: String,
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    code: String,
    description: String,
}

/// `HMAC-SHA256(secret, "{order_id}|{payment_id}")` в hex.
pub fn compute_signature(secret: &str, order_id: &str, payment_id: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid key length".to_string()))?;
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Сравнение за постоянное время. Подпись не в hex считается неверной.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Сумма в пайсах. Сумма, округлившаяся до нуля пайс, отклоняется.
pub fn to_minor_units(amount: Decimal) -> AppResult<u64> {
    let rounded = ledger::round_money(amount);
    if rounded <= Decimal::ZERO {
        return Err(AppError::InvalidAmount);
    }
    (rounded * Decimal::ONE_HUNDRED)
        .to_u64()
        .ok_or(AppError::InvalidAmount)
}

pub struct GatewayService {
    client: reqwest::Client,
    key_id: Option<String>,
    key_secret: Option<String>,
    api_url: String,
}

impl GatewayService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            api_url: config.razorpay_api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key_id.is_some() && self.key_secret.is_some()
    }

    fn credentials(&self) -> AppResult<(&str, &str)> {
        match (self.key_id.as_deref(), self.key_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(AppError::Gateway(
                "Razorpay credentials not configured".to_string(),
            )),
        }
    }

    pub fn key_id(&self) -> AppResult<String> {
        Ok(self.credentials()?.0.to_string())
    }

    pub async fn create_order(
        &self,
        amount: Decimal,
        receipt: String,
        notes: serde_json::Value,
    ) -> AppResult<GatewayOrder> {
        let (key_id, key_secret) = self.credentials()?;
        let request = OrderRequest {
            amount: to_minor_units(amount)?,
            currency: CURRENCY,
            receipt,
            notes,
        };

        let response = self
            .client
            .post(format!("{}/orders", self.api_url))
            .basic_auth(key_id, Some(key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<GatewayErrorBody>(&body)
                .map(|b| format!("{} - {}", b.error.code, b.error.description))
                .unwrap_or(body);
            tracing::error!(status = %status, "Razorpay order creation failed: {}", detail);
            return Err(AppError::Gateway(detail));
        }

        let order: GatewayOrder =
            serde_json::from_str(&body).map_err(|e| AppError::Gateway(e.to_string()))?;
        tracing::info!(order_id = %order.id, amount = order.amount, "Razorpay order created");
        Ok(order)
    }

    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> AppResult<()> {
        let (_, key_secret) = self.credentials()?;
        if verify_signature(key_secret, order_id, payment_id, signature) {
            tracing::info!(order_id, payment_id, "Payment signature verified");
            Ok(())
        } else {
            tracing::warn!(order_id, payment_id, "Payment signature verification failed");
            Err(AppError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let signature = compute_signature("secret", "order_1", "pay_1").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature("secret", "order_1", "pay_1", &signature));
        assert!(!verify_signature("other", "order_1", "pay_1", &signature));
        assert!(!verify_signature("secret", "order_1", "pay_2", &signature));
        assert!(!verify_signature("secret", "order_1", "pay_1", "not-hex"));
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(50050, 2)).unwrap(), 50050);
        assert_eq!(to_minor_units(Decimal::from(1000)).unwrap(), 100000);
        assert!(matches!(
            to_minor_units(Decimal::ZERO),
            Err(AppError::InvalidAmount)
        ));
    }

    #[test]
    fn test_verify_without_credentials() {
        let mut config = Config::for_tests();
        config.razorpay_key_secret = None;
        let gateway = GatewayService::new(&config);
        assert!(!gateway.is_configured());
        assert!(matches!(
            gateway.verify("order_1", "pay_1", "00"),
            Err(AppError::Gateway(_))
        ));
    }
}
