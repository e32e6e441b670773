use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::attempt_dto::{GradeAnswerPayload, GradeAnswerResponse};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::answer::{Answer, ScoredAnswer};
use crate::models::attempt::{AttemptStatus, ExamAttempt};
use crate::models::question::{Question, QuestionType};
use crate::services::attempt_service::{fetch_attempt, fetch_scored_answers};
use crate::services::audit_service::AuditService;
use crate::services::exam_service::{fetch_exam, fetch_question};
use crate::utils::validation::decimal_2dp;

/// Full points on an exact structural match, zero otherwise. Only multiple
/// choice questions with a stored correct answer are auto-graded.
pub fn auto_grade(question: &Question, content: &JsonValue) -> Option<Decimal> {
    match (question.question_type, question.correct_answer.as_ref()) {
        (QuestionType::MultipleChoice, Some(expected)) => Some(if expected == content {
            Decimal::from(question.points)
        } else {
            Decimal::ZERO
        }),
        _ => None,
    }
}

/// `earned / total * 100` rounded to two decimals; 0 when there are no points.
pub fn percentage(earned: Decimal, total_points: i64) -> Decimal {
    if total_points <= 0 {
        return Decimal::ZERO;
    }
    (earned * Decimal::ONE_HUNDRED / Decimal::from(total_points)).round_dp(2)
}

/// Score at submission time: ungraded answers count as zero against every
/// question of the exam.
pub fn submission_score<I>(exam_total_points: i64, scores: I) -> Decimal
where
    I: IntoIterator<Item = Option<Decimal>>,
{
    let earned: Decimal = scores.into_iter().flatten().sum();
    percentage(earned, exam_total_points)
}

/// Aggregate over the attempt's answers, only once every answer is scored.
/// While anything is pending the caller keeps the previous attempt score.
pub fn fully_graded_score(answers: &[ScoredAnswer]) -> Option<Decimal> {
    let mut earned = Decimal::ZERO;
    let mut total: i64 = 0;
    for answer in answers {
        earned += answer.score?;
        total += i64::from(answer.points);
    }
    Some(percentage(earned, total))
}

#[derive(Clone)]
pub struct GradingService {
    pool: PgPool,
}

impl GradingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn grade_answer(
        &self,
        user: &AuthUser,
        attempt_id: Uuid,
        question_id: Uuid,
        payload: GradeAnswerPayload,
    ) -> Result<GradeAnswerResponse> {
        let attempt = fetch_attempt(&self.pool, attempt_id).await?;
        let exam = fetch_exam(&self.pool, attempt.exam_id).await?;
        user.ensure_exam_manager(&exam)?;

        if attempt.status != AttemptStatus::Completed {
            return Err(Error::BadRequest(
                "Answers can only be graded once the attempt is submitted".to_string(),
            ));
        }

        let question = fetch_question(&self.pool, exam.id, question_id).await?;
        let score = decimal_2dp(payload.score, "score")?;
        if score.is_sign_negative() || score > Decimal::from(question.points) {
            return Err(Error::BadRequest(format!(
                "Score must be between 0 and {} for this question",
                question.points
            )));
        }

        let mut tx = self.pool.begin().await?;

        let previous: Option<Decimal> = sqlx::query_scalar(
            r#"SELECT score FROM answers WHERE attempt_id = $1 AND question_id = $2 FOR UPDATE"#,
        )
        .bind(attempt.id)
        .bind(question.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("No answer recorded for this question".to_string()))?;

        let answer = sqlx::query_as::<_, Answer>(
            r#"
            UPDATE answers
            SET score = $3, feedback = $4, graded_by = $5, graded_at = $6, updated_at = $6
            WHERE attempt_id = $1 AND question_id = $2
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(question.id)
        .bind(score)
        .bind(payload.feedback.as_deref())
        .bind(user.id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let scored = fetch_scored_answers(&mut *tx, attempt.id).await?;
        let attempt = match fully_graded_score(&scored) {
            Some(total) => {
                sqlx::query_as::<_, ExamAttempt>(
                    r#"UPDATE exam_attempts SET score = $2 WHERE id = $1 RETURNING *"#,
                )
                .bind(attempt.id)
                .bind(total)
                .fetch_one(&mut *tx)
                .await?
            }
            None => attempt,
        };

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "answer.graded",
            "answer",
            answer.id,
            Some(json!({
                "attemptId": attempt.id,
                "questionId": question.id,
                "previousScore": previous,
                "score": score,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            attempt_id = %attempt.id,
            question_id = %question.id,
            grader = %user.id,
            "Answer graded"
        );

        Ok(GradeAnswerResponse { answer, attempt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(question_type: QuestionType, points: i32, correct: Option<JsonValue>) -> Question {
        Question {
            id: Uuid::new_v4(),
            exam_id: Uuid::new_v4(),
            question_type,
            prompt: "Pick one".into(),
            points,
            position: 0,
            options: Some(json!(["A", "B"])),
            correct_answer: correct,
            created_at: Utc::now(),
        }
    }

    fn scored(points: i32, score: Option<i64>) -> ScoredAnswer {
        ScoredAnswer {
            question_id: Uuid::new_v4(),
            points,
            score: score.map(Decimal::from),
        }
    }

    #[test]
    fn multiple_choice_is_graded_by_exact_match() {
        let q = question(QuestionType::MultipleChoice, 10, Some(json!(["A"])));
        assert_eq!(auto_grade(&q, &json!(["A"])), Some(Decimal::from(10)));
        assert_eq!(auto_grade(&q, &json!(["B"])), Some(Decimal::ZERO));
        assert_eq!(auto_grade(&q, &json!(["A", "B"])), Some(Decimal::ZERO));
        assert_eq!(auto_grade(&q, &json!("A")), Some(Decimal::ZERO));
    }

    #[test]
    fn structural_equality_ignores_object_key_order() {
        let q = question(QuestionType::MultipleChoice, 4, Some(json!({"x": 1, "y": [2, 3]})));
        let submitted: JsonValue = serde_json::from_str(r#"{"y":[2,3],"x":1}"#).unwrap();
        assert_eq!(auto_grade(&q, &submitted), Some(Decimal::from(4)));
    }

    #[test]
    fn open_ended_and_keyless_questions_stay_ungraded() {
        let essay = question(QuestionType::Essay, 10, None);
        assert_eq!(auto_grade(&essay, &json!("My essay")), None);

        let short = question(QuestionType::ShortAnswer, 5, Some(json!("Paris")));
        assert_eq!(auto_grade(&short, &json!("Paris")), None);

        let keyless = question(QuestionType::MultipleChoice, 5, None);
        assert_eq!(auto_grade(&keyless, &json!(["A"])), None);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(Decimal::from(20), 30), Decimal::new(6667, 2));
        assert_eq!(percentage(Decimal::from(30), 30), Decimal::from(100));
        assert_eq!(percentage(Decimal::from(5), 0), Decimal::ZERO);
    }

    #[test]
    fn submission_counts_pending_answers_as_zero() {
        let score = submission_score(30, vec![Some(Decimal::from(10)), None]);
        assert_eq!(score, Decimal::new(3333, 2));
        assert_eq!(submission_score(0, Vec::new()), Decimal::ZERO);
    }

    #[test]
    fn aggregate_waits_for_every_answer() {
        let pending = vec![scored(10, Some(10)), scored(20, None)];
        assert_eq!(fully_graded_score(&pending), None);

        let done = vec![scored(10, Some(10)), scored(20, Some(10))];
        assert_eq!(fully_graded_score(&done), Some(Decimal::new(6667, 2)));

        assert_eq!(fully_graded_score(&[scored(0, Some(0))]), Some(Decimal::ZERO));
    }
}
