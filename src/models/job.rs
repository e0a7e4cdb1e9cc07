use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::BatchError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "job_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
}

/// Запуск фоновой задачи за один бизнес-день. Пара (job_name, run_date) уникальна.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct JobRun {
    pub id: Uuid,
    pub job_name: String,
    pub run_date: NaiveDate,
    pub status: JobRunStatus,
    pub processed: i32,
    pub failed: i32,
    pub error_summary: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DeliveryMaterialization,
    PaymentReminders,
    OverdueTransition,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::DeliveryMaterialization,
        JobKind::PaymentReminders,
        JobKind::OverdueTransition,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::DeliveryMaterialization => "delivery_materialization",
            JobKind::PaymentReminders => "payment_reminders",
            JobKind::OverdueTransition => "overdue_transition",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|job| job.name() == name)
    }
}

#[derive(Debug, Default, Clone, Serialize, ToSchema)]
pub struct JobReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
}

impl JobReport {
    pub fn record_error(&mut self, item_id: Uuid, error: impl ToString) {
        self.failed += 1;
        self.errors.push(BatchError {
            item_id,
            error: error.to_string(),
        });
    }
}
