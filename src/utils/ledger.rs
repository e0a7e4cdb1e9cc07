//! Денежная арифметика и правила, общие для счетов и платежей.
//!
//! Все суммы хранятся в `Decimal` с точностью до копейки (2 знака),
//! округление половины от нуля. Статус счёта вычисляется только здесь.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, AppResult};
use crate::models::{Bill, BillStatus};

pub const MONEY_SCALE: u32 = 2;
pub const BILL_NUMBER_PREFIX: &str = "MDF";
pub const DUE_DAY_OF_MONTH: u32 = 7;

const SECONDS_PER_DAY: i64 = 86_400;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round_money(quantity * unit_price)
}

pub fn pending_amount(total: Decimal, paid: Decimal) -> Decimal {
    (total - paid).max(Decimal::ZERO)
}

/// Единственное место, где статус счёта выводится из сумм и срока оплаты.
///
/// Долг погашен → `Paid`; срок прошёл при ненулевом долге → `Overdue`;
/// есть частичная оплата → `Partial`; иначе статус не меняется.
pub fn derive_status(
    total: Decimal,
    paid: Decimal,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
    current: BillStatus,
) -> BillStatus {
    if pending_amount(total, paid).is_zero() {
        return BillStatus::Paid;
    }
    if now > due_date {
        return BillStatus::Overdue;
    }
    if paid > Decimal::ZERO {
        return BillStatus::Partial;
    }
    match current {
        BillStatus::Draft | BillStatus::Generated | BillStatus::Sent => current,
        _ => BillStatus::Generated,
    }
}

/// Статус только что созданного счёта: нулевой счёт сразу оплачен.
pub fn initial_status(total: Decimal) -> BillStatus {
    if pending_amount(total, Decimal::ZERO).is_zero() {
        BillStatus::Paid
    } else {
        BillStatus::Generated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub status: BillStatus,
}

/// Новое состояние счёта после зачисления `amount`.
pub fn settle(bill: &Bill, amount: Decimal, now: DateTime<Utc>) -> Settlement {
    let paid_amount = round_money(bill.paid_amount + amount);
    Settlement {
        paid_amount,
        pending_amount: pending_amount(bill.total_amount, paid_amount),
        status: derive_status(bill.total_amount, paid_amount, bill.due_date, now, bill.status),
    }
}

fn first_of_month(month: u32, year: i32) -> AppResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::Validation(format!("Неверный период: {}/{}", month, year)))
}

fn next_month(month: u32, year: i32) -> (u32, i32) {
    if month == 12 {
        (1, year + 1)
    } else {
        (month + 1, year)
    }
}

/// Границы расчётного периода: первый день месяца 00:00:00 и последний 23:59:59.
pub fn billing_period(month: u32, year: i32) -> AppResult<(NaiveDateTime, NaiveDateTime)> {
    let first = first_of_month(month, year)?;
    let (next_m, next_y) = next_month(month, year);
    let last = first_of_month(next_m, next_y)? - Duration::days(1);

    let start = first
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::Internal("invalid period start".to_string()))?;
    let end = last
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| AppError::Internal("invalid period end".to_string()))?;

    Ok((start, end))
}

/// Срок оплаты: 7-е число следующего месяца, полночь по местному времени бизнеса.
pub fn due_date(month: u32, year: i32, offset: FixedOffset) -> AppResult<DateTime<Utc>> {
    let (next_m, next_y) = next_month(month, year);
    let local = NaiveDate::from_ymd_opt(next_y, next_m, DUE_DAY_OF_MONTH)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AppError::Validation(format!("Неверный период: {}/{}", month, year)))?;

    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::Internal("ambiguous due date".to_string()))
}

/// `ceil((due - now) / 1 день)`; отрицательно для просроченных счетов.
pub fn days_until(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (due - now).num_seconds();
    -((-seconds).div_euclid(SECONDS_PER_DAY))
}

pub fn bill_number(year: i32, month: u32, sequence: i64) -> String {
    format!("{}-{}{:02}-{:05}", BILL_NUMBER_PREFIX, year, month, sequence)
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn transaction_id(timestamp_millis: u64, random: u64) -> String {
    format!("TXN-{}-{}", to_base36(timestamp_millis), to_base36(random)).to_uppercase()
}

/// Идентификатор транзакции для наличных платежей без внешнего номера.
pub fn generate_transaction_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random = rand::thread_rng().gen_range(36u64.pow(7)..36u64.pow(8));
    transaction_id(millis, random)
}
