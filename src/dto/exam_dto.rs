use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use crate::error::{Error, Result};
use crate::models::exam::Exam;
use crate::models::question::{PublicQuestion, Question, QuestionType};
use crate::utils::validation::validate_window;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestion {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 5000))]
    pub prompt: String,
    /// Bounded by the precision of stored answer scores.
    #[validate(range(min = 0, max = 10000, message = "Points must be between 0 and 10000"))]
    pub points: i32,
    pub options: Option<JsonValue>,
    pub correct_answer: Option<JsonValue>,
}

impl CreateQuestion {
    fn check(&self) -> Result<()> {
        self.validate()?;
        if self.question_type == QuestionType::MultipleChoice {
            let has_options = self
                .options
                .as_ref()
                .and_then(JsonValue::as_array)
                .map(|opts| !opts.is_empty())
                .unwrap_or(false);
            if !has_options {
                return Err(Error::BadRequest(
                    "Multiple choice questions need a non-empty options list".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamPayload {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: i32,
    #[validate(range(min = 0.0, max = 100.0, message = "Passing grade must be between 0 and 100"))]
    pub passing_grade: f64,
    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub questions: Vec<CreateQuestion>,
}

fn default_max_attempts() -> i32 {
    1
}

impl CreateExamPayload {
    /// Field rules plus the cross-field checks `validator` cannot express.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        validate_window(self.available_from, self.available_until)?;
        self.questions.iter().try_for_each(CreateQuestion::check)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExamPayload {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<i32>,
    #[validate(range(min = 0.0, max = 100.0, message = "Passing grade must be between 0 and 100"))]
    pub passing_grade: Option<f64>,
    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    pub max_attempts: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub available_from: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub available_until: Option<Option<DateTime<Utc>>>,
    /// When present, replaces the whole question list.
    pub questions: Option<Vec<CreateQuestion>>,
}

/// Absent field is `None`, explicit `null` is `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateExamPayload {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if let Some(questions) = &self.questions {
            questions.iter().try_for_each(CreateQuestion::check)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListAttemptsQuery {
    pub status: Option<String>,
}

/// Staff view: questions carry their correct answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResponse {
    #[serde(flatten)]
    pub exam: Exam,
    pub questions: Vec<Question>,
}

/// Examinee view of an exam.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicExamResponse {
    #[serde(flatten)]
    pub exam: Exam,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExamView {
    Full(ExamResponse),
    Public(PublicExamResponse),
}

impl ExamView {
    pub fn new(exam: Exam, questions: Vec<Question>, reveal_answers: bool) -> Self {
        if reveal_answers {
            ExamView::Full(ExamResponse { exam, questions })
        } else {
            ExamView::Public(PublicExamResponse {
                exam,
                questions: questions.into_iter().map(PublicQuestion::from).collect(),
            })
        }
    }
}
