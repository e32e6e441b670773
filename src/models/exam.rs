use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    Draft,
    Published,
    Closed,
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::Draft => "DRAFT",
            ExamStatus::Published => "PUBLISHED",
            ExamStatus::Closed => "CLOSED",
        }
    }

    /// DRAFT -> PUBLISHED -> CLOSED, plus the explicit unpublish PUBLISHED -> DRAFT.
    pub fn can_transition_to(&self, next: ExamStatus) -> bool {
        matches!(
            (self, next),
            (ExamStatus::Draft, ExamStatus::Published)
                | (ExamStatus::Published, ExamStatus::Closed)
                | (ExamStatus::Published, ExamStatus::Draft)
        )
    }
}

impl TryFrom<String> for ExamStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "DRAFT" => Ok(ExamStatus::Draft),
            "PUBLISHED" => Ok(ExamStatus::Published),
            "CLOSED" => Ok(ExamStatus::Closed),
            _ => Err(UnknownVariant { kind: "exam status", value }),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub passing_grade: Decimal,
    pub max_attempts: i32,
    #[sqlx(try_from = "String")]
    pub status: ExamStatus,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
