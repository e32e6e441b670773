use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::dto::exam_dto::ExamView;
use crate::models::answer::Answer;
use crate::models::attempt::ExamAttempt;
use crate::models::question::PublicQuestion;
use crate::models::user::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub answer_content: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswersRequest {
    #[validate(length(max = 500, message = "Too many answers in one request"))]
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GradeAnswerPayload {
    #[validate(range(min = 0.0, message = "Score must not be negative"))]
    pub score: f64,
    #[validate(length(max = 5000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    pub attempt: ExamAttempt,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptWithAnswers {
    #[serde(flatten)]
    pub attempt: ExamAttempt,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDetailResponse {
    #[serde(flatten)]
    pub attempt: ExamAttempt,
    pub answers: Vec<Answer>,
    pub exam: ExamView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeAnswerResponse {
    pub answer: Answer,
    pub attempt: ExamAttempt,
}

/// Row of the staff attempt listing.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttemptListItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<Decimal>,
    pub pending_answers: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAttempt {
    pub id: Uuid,
    pub user: UserSummary,
    pub score: Decimal,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAnalytics {
    pub exam_id: Uuid,
    pub total_attempts: i64,
    pub average_score: Decimal,
    pub pass_rate: Decimal,
    pub pass_count: i64,
    pub fail_count: i64,
    pub highest_score: Decimal,
    pub lowest_score: Decimal,
    pub recent_attempts: Vec<RecentAttempt>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submit_body_uses_camel_case() {
        let id = Uuid::new_v4();
        let req: SubmitAnswersRequest = serde_json::from_value(json!({
            "answers": [{"questionId": id, "answerContent": ["A"]}]
        }))
        .unwrap();
        assert_eq!(req.answers[0].question_id, id);
        assert_eq!(req.answers[0].answer_content, json!(["A"]));
    }

    #[test]
    fn negative_grade_fails_validation() {
        let payload = GradeAnswerPayload { score: -1.0, feedback: None };
        assert!(payload.validate().is_err());
        let payload = GradeAnswerPayload { score: 7.5, feedback: Some("ok".into()) };
        assert!(payload.validate().is_ok());
    }
}
