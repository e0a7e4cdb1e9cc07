use chrono::{FixedOffset, Offset, Utc};
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_access_expiry: i64,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub razorpay_api_url: String,
    pub sms_api_url: String,
    pub sms_api_key: String,
    pub sms_sender: String,
    pub sms_enabled: bool,
    pub smtp: Option<SmtpConfig>,
    pub scheduler: SchedulerConfig,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

/// Расписание фоновых задач. Часы указываются в локальном времени бизнеса.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_secs: u64,
    pub utc_offset_minutes: i32,
    pub delivery_job_hour: u32,
    pub reminder_job_hour: u32,
    pub overdue_job_hour: u32,
    pub reminder_window_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 60,
            utc_offset_minutes: 330,
            delivery_job_hour: 20,
            reminder_job_hour: 9,
            overdue_job_hour: 0,
            reminder_window_days: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn business_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = SchedulerConfig::default();

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.is_empty() => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587),
                user: env::var("SMTP_USER").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from: env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "Dairy Billing <billing@localhost>".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", 8080),
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_access_expiry: parse_or("JWT_ACCESS_EXPIRY", 900),
            razorpay_key_id: env::var("RAZORPAY_KEY_ID").ok().filter(|v| !v.is_empty()),
            razorpay_key_secret: env::var("RAZORPAY_KEY_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            razorpay_api_url: env::var("RAZORPAY_API_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
            sms_api_url: env::var("SMS_API_URL")
                .unwrap_or_else(|_| "https://api.mobizon.kz/service/message/sendsmsmessage".to_string()),
            sms_api_key: env::var("SMS_API_KEY").unwrap_or_default(),
            sms_sender: env::var("SMS_SENDER").unwrap_or_else(|_| "DAIRY".to_string()),
            sms_enabled: parse_or("SMS_ENABLED", false),
            smtp,
            scheduler: SchedulerConfig {
                enabled: parse_or("SCHEDULER_ENABLED", defaults.enabled),
                tick_secs: parse_or("SCHEDULER_TICK_SECS", defaults.tick_secs),
                utc_offset_minutes: parse_or(
                    "BUSINESS_UTC_OFFSET_MINUTES",
                    defaults.utc_offset_minutes,
                ),
                delivery_job_hour: parse_or("DELIVERY_JOB_HOUR", defaults.delivery_job_hour),
                reminder_job_hour: parse_or("REMINDER_JOB_HOUR", defaults.reminder_job_hour),
                overdue_job_hour: parse_or("OVERDUE_JOB_HOUR", defaults.overdue_job_hour),
                reminder_window_days: parse_or(
                    "REMINDER_WINDOW_DAYS",
                    defaults.reminder_window_days,
                ),
            },
        })
    }

    /// Конфигурация для тестов и локального запуска без окружения.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: String::new(),
            jwt_secret: "test-secret".to_string(),
            jwt_access_expiry: 900,
            razorpay_key_id: Some("rzp_test_key".to_string()),
            razorpay_key_secret: Some("rzp_test_secret".to_string()),
            razorpay_api_url: "http://127.0.0.1:9/v1".to_string(),
            sms_api_url: "http://127.0.0.1:9/sms".to_string(),
            sms_api_key: String::new(),
            sms_sender: "DAIRY".to_string(),
            sms_enabled: false,
            smtp: None,
            scheduler: SchedulerConfig {
                enabled: false,
                utc_offset_minutes: 0,
                ..SchedulerConfig::default()
            },
        }
    }
}
