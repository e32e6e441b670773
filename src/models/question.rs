use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    Essay,
    ShortAnswer,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionType::Essay => "ESSAY",
            QuestionType::ShortAnswer => "SHORT_ANSWER",
        }
    }
}

impl TryFrom<String> for QuestionType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "MULTIPLE_CHOICE" => Ok(QuestionType::MultipleChoice),
            "ESSAY" => Ok(QuestionType::Essay),
            "SHORT_ANSWER" => Ok(QuestionType::ShortAnswer),
            _ => Err(UnknownVariant { kind: "question type", value }),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub exam_id: Uuid,
    #[sqlx(try_from = "String")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub points: i32,
    pub position: i32,
    pub options: Option<JsonValue>,
    pub correct_answer: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Question as shown to examinees: the correct answer never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: Uuid,
    pub question_type: QuestionType,
    pub prompt: String,
    pub points: i32,
    pub position: i32,
    pub options: Option<JsonValue>,
}

impl From<Question> for PublicQuestion {
    fn from(value: Question) -> Self {
        Self {
            id: value.id,
            question_type: value.question_type,
            prompt: value.prompt,
            points: value.points,
            position: value.position,
            options: value.options,
        }
    }
}
