use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::utils::ledger;

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{10,13}$").unwrap());

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static TRANSACTION_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]{4,64}$").unwrap());

pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn validate_transaction_id(transaction_id: &str) -> bool {
    TRANSACTION_ID_REGEX.is_match(transaction_id)
}

/// Возвращает сумму, округлённую до копейки. Сумма, округлившаяся до нуля, отклоняется.
pub fn validate_amount(amount: Decimal) -> AppResult<Decimal> {
    let rounded = ledger::round_money(amount);
    if rounded <= Decimal::ZERO {
        return Err(AppError::InvalidAmount);
    }
    Ok(rounded)
}

pub fn validate_billing_month(month: u32, year: i32) -> AppResult<()> {
    if !(1..=12).contains(&month) {
        return Err(AppError::Validation(
            "Месяц должен быть от 1 до 12".to_string(),
        ));
    }
    if !(2000..=2100).contains(&year) {
        return Err(AppError::Validation(format!("Неверный год: {}", year)));
    }
    Ok(())
}

/// Проверка DTO через `validator` с переводом ошибки в `AppError`.
pub fn validate_request<T: Validate>(payload: &T) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}

/// Пустые строки после обрезки считаются отсутствующими.
pub fn sanitize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|s| sanitize_string(&s))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+919876543210"));
        assert!(validate_phone("9876543210"));
        assert!(!validate_phone("98765"));
        assert!(!validate_phone("+91-98765-43210"));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com"));
        assert!(validate_email("user.name@domain.co.in"));
        assert!(!validate_email("invalid"));
        assert!(!validate_email("@example.com"));
    }

    #[test]
    fn test_validate_transaction_id() {
        assert!(validate_transaction_id("TXN-LX2K9-4F7QZ1AB"));
        assert!(validate_transaction_id("pay_29QQoUBi66xm2f"));
        assert!(!validate_transaction_id("abc"));
        assert!(!validate_transaction_id("has space in it"));
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(Decimal::new(1, 2)).unwrap(), Decimal::new(1, 2));
        assert_eq!(validate_amount(Decimal::new(1005, 3)).unwrap(), Decimal::new(101, 2));
        assert!(matches!(
            validate_amount(Decimal::new(4, 3)),
            Err(AppError::InvalidAmount)
        ));
        assert!(matches!(
            validate_amount(Decimal::ZERO),
            Err(AppError::InvalidAmount)
        ));
        assert!(matches!(
            validate_amount(Decimal::from(-5)),
            Err(AppError::InvalidAmount)
        ));
    }

    #[test]
    fn test_validate_billing_month() {
        assert!(validate_billing_month(1, 2025).is_ok());
        assert!(validate_billing_month(12, 2025).is_ok());
        assert!(validate_billing_month(0, 2025).is_err());
        assert!(validate_billing_month(13, 2025).is_err());
        assert!(validate_billing_month(5, 1999).is_err());
    }

    #[test]
    fn test_sanitize_optional() {
        assert_eq!(sanitize_optional(Some("  note ".to_string())), Some("note".to_string()));
        assert_eq!(sanitize_optional(Some("   ".to_string())), None);
        assert_eq!(sanitize_optional(None), None);
    }
}
