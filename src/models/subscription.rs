use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ProductUnit, TimeSlot};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "subscription_frequency", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionFrequency {
    Daily,
    AlternateDays,
    /// Только в дни из `days_of_week` (1 = понедельник, 7 = воскресенье).
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub time_slot: TimeSlot,
    pub frequency: SubscriptionFrequency,
    pub days_of_week: Vec<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub paused_until: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        if !self.is_active || date < self.start_date {
            return false;
        }
        if self.end_date.is_some_and(|end| date > end) {
            return false;
        }
        if self.paused_until.is_some_and(|until| date <= until) {
            return false;
        }

        match self.frequency {
            SubscriptionFrequency::Daily => true,
            SubscriptionFrequency::AlternateDays => {
                (date - self.start_date).num_days() % 2 == 0
            }
            SubscriptionFrequency::Custom => {
                let weekday = date.weekday().number_from_monday() as i16;
                self.days_of_week.contains(&weekday)
            }
        }
    }
}

/// Подписка вместе с текущими данными продукта, как её видит планировщик.
#[derive(Debug, Clone, FromRow)]
pub struct ActiveSubscription {
    #[sqlx(flatten)]
    pub subscription: Subscription,
    pub product_name: String,
    pub product_unit: ProductUnit,
    pub product_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(frequency: SubscriptionFrequency) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: Decimal::ONE,
            time_slot: TimeSlot::Morning,
            frequency,
            days_of_week: vec![],
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: None,
            paused_until: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_daily_respects_start_and_end() {
        let mut sub = subscription(SubscriptionFrequency::Daily);
        sub.end_date = Some(day(10));

        assert!(!sub.is_due_on(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()));
        assert!(sub.is_due_on(day(1)));
        assert!(sub.is_due_on(day(10)));
        assert!(!sub.is_due_on(day(11)));
    }

    #[test]
    fn test_alternate_days_counts_from_start() {
        let sub = subscription(SubscriptionFrequency::AlternateDays);

        assert!(sub.is_due_on(day(1)));
        assert!(!sub.is_due_on(day(2)));
        assert!(sub.is_due_on(day(3)));
    }

    #[test]
    fn test_custom_weekdays() {
        let mut sub = subscription(SubscriptionFrequency::Custom);
        // 2025-03-03 понедельник, 2025-03-05 среда
        sub.days_of_week = vec![1, 5];

        assert!(sub.is_due_on(day(3)));
        assert!(!sub.is_due_on(day(5)));
        assert!(sub.is_due_on(day(7)));
    }

    #[test]
    fn test_pause_and_inactive() {
        let mut sub = subscription(SubscriptionFrequency::Daily);
        sub.paused_until = Some(day(4));
        assert!(!sub.is_due_on(day(4)));
        assert!(sub.is_due_on(day(5)));

        sub.is_active = false;
        assert!(!sub.is_due_on(day(5)));
    }
}
