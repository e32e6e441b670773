use std::collections::HashMap;

use chrono::Utc;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::dto::attempt_dto::{
    AnswerInput, AttemptDetailResponse, AttemptListItem, AttemptWithAnswers, StartAttemptResponse,
};
use crate::dto::exam_dto::ExamView;
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::answer::{Answer, ScoredAnswer};
use crate::models::attempt::{AttemptStatus, ExamAttempt};
use crate::models::exam::ExamStatus;
use crate::models::question::{PublicQuestion, Question};
use crate::services::assignment_service::{check_eligibility, matching_assignments};
use crate::services::exam_service::{fetch_exam, fetch_questions};
use crate::services::grading_service::{auto_grade, submission_score};

pub(crate) async fn fetch_attempt<'e, E>(executor: E, attempt_id: Uuid) -> Result<ExamAttempt>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ExamAttempt>(r#"SELECT * FROM exam_attempts WHERE id = $1"#)
        .bind(attempt_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))
}

pub(crate) async fn fetch_answers<'e, E>(executor: E, attempt_id: Uuid) -> Result<Vec<Answer>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, Answer>(
        r#"
        SELECT a.* FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.attempt_id = $1
        ORDER BY q.position ASC
        "#,
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub(crate) async fn fetch_scored_answers<'e, E>(executor: E, attempt_id: Uuid) -> Result<Vec<ScoredAnswer>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ScoredAnswer>(
        r#"
        SELECT a.question_id, q.points, a.score
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.attempt_id = $1
        "#,
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Locks an attempt that the caller owns and may still write to.
async fn lock_open_attempt(conn: &mut PgConnection, user: &AuthUser, attempt_id: Uuid) -> Result<ExamAttempt> {
    let attempt = sqlx::query_as::<_, ExamAttempt>(
        r#"SELECT * FROM exam_attempts WHERE id = $1 FOR UPDATE"#,
    )
    .bind(attempt_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != user.id {
        return Err(Error::Forbidden("This attempt belongs to another user".to_string()));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(Error::BadRequest("Attempt is already completed".to_string()));
    }
    Ok(attempt)
}

fn ensure_known_questions(questions: &HashMap<Uuid, Question>, answers: &[AnswerInput]) -> Result<()> {
    match answers.iter().find(|a| !questions.contains_key(&a.question_id)) {
        Some(unknown) => Err(Error::BadRequest(format!(
            "Question {} does not belong to this exam",
            unknown.question_id
        ))),
        None => Ok(()),
    }
}

/// Upserts on (attempt, question); later entries for the same question win.
async fn upsert_answers(conn: &mut PgConnection, attempt_id: Uuid, answers: &[AnswerInput]) -> Result<()> {
    let now = Utc::now();
    for answer in answers {
        sqlx::query(
            r#"
            INSERT INTO answers (attempt_id, question_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (attempt_id, question_id)
            DO UPDATE SET content = EXCLUDED.content, score = NULL, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(attempt_id)
        .bind(answer.question_id)
        .bind(&answer.answer_content)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
}

impl AttemptService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn start_attempt(&self, user: &AuthUser, exam_id: Uuid) -> Result<StartAttemptResponse> {
        let mut tx = self.pool.begin().await?;

        // Concurrent starts by one user queue here until the first commits.
        sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(user.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::Forbidden("Unknown user".to_string()))?;

        let exam = fetch_exam(&mut *tx, exam_id).await?;
        if exam.status != ExamStatus::Published {
            return Err(Error::BadRequest("Exam is not published".to_string()));
        }

        let assignments = matching_assignments(&mut *tx, exam.id, user.id).await?;
        check_eligibility(&exam, &assignments, Utc::now())?;

        let previous: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM exam_attempts WHERE exam_id = $1 AND user_id = $2"#,
        )
        .bind(exam.id)
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await?;
        if previous >= i64::from(exam.max_attempts) {
            return Err(Error::MaxAttemptsReached(exam.max_attempts));
        }

        let attempt = sqlx::query_as::<_, ExamAttempt>(
            r#"
            INSERT INTO exam_attempts (exam_id, user_id, status, started_at)
            VALUES ($1, $2, 'IN_PROGRESS', $3)
            RETURNING *
            "#,
        )
        .bind(exam.id)
        .bind(user.id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let questions = fetch_questions(&mut *tx, exam.id).await?;
        tx.commit().await?;

        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %exam.id,
            user_id = %user.id,
            attempt_number = previous + 1,
            "Attempt started"
        );

        Ok(StartAttemptResponse {
            attempt,
            questions: questions.into_iter().map(PublicQuestion::from).collect(),
        })
    }

    /// Stores answer content without grading or completing the attempt.
    pub async fn save_answers(
        &self,
        user: &AuthUser,
        attempt_id: Uuid,
        answers: Vec<AnswerInput>,
    ) -> Result<AttemptWithAnswers> {
        let mut tx = self.pool.begin().await?;
        let attempt = lock_open_attempt(&mut tx, user, attempt_id).await?;

        let questions = questions_by_id(fetch_questions(&mut *tx, attempt.exam_id).await?);
        ensure_known_questions(&questions, &answers)?;
        upsert_answers(&mut tx, attempt.id, &answers).await?;

        let answers = fetch_answers(&mut *tx, attempt.id).await?;
        tx.commit().await?;

        tracing::debug!(attempt_id = %attempt.id, saved = answers.len(), "Answers saved");
        Ok(AttemptWithAnswers { attempt, answers })
    }

    /// Records the final answers, auto-grades every stored answer and
    /// completes the attempt in one transaction.
    pub async fn submit_answers(
        &self,
        user: &AuthUser,
        attempt_id: Uuid,
        answers: Vec<AnswerInput>,
    ) -> Result<AttemptWithAnswers> {
        let mut tx = self.pool.begin().await?;
        let attempt = lock_open_attempt(&mut tx, user, attempt_id).await?;

        let questions = questions_by_id(fetch_questions(&mut *tx, attempt.exam_id).await?);
        ensure_known_questions(&questions, &answers)?;
        upsert_answers(&mut tx, attempt.id, &answers).await?;

        let mut stored = fetch_answers(&mut *tx, attempt.id).await?;
        for answer in stored.iter_mut() {
            let Some(question) = questions.get(&answer.question_id) else {
                continue;
            };
            if let Some(score) = auto_grade(question, &answer.content) {
                sqlx::query(r#"UPDATE answers SET score = $2 WHERE id = $1"#)
                    .bind(answer.id)
                    .bind(score)
                    .execute(&mut *tx)
                    .await?;
                answer.score = Some(score);
            }
        }

        let total_points: i64 = questions.values().map(|q| i64::from(q.points)).sum();
        let score = submission_score(total_points, stored.iter().map(|a| a.score));

        let attempt = sqlx::query_as::<_, ExamAttempt>(
            r#"
            UPDATE exam_attempts
            SET status = 'COMPLETED', completed_at = $2, score = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(Utc::now())
        .bind(score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let pending = stored.iter().filter(|a| a.score.is_none()).count();
        tracing::info!(
            attempt_id = %attempt.id,
            score = %score,
            pending_manual = pending,
            "Attempt submitted"
        );

        Ok(AttemptWithAnswers { attempt, answers: stored })
    }

    pub async fn get_attempt(&self, user: &AuthUser, attempt_id: Uuid) -> Result<AttemptDetailResponse> {
        let attempt = fetch_attempt(&self.pool, attempt_id).await?;
        let exam = fetch_exam(&self.pool, attempt.exam_id).await?;

        let manager = user.can_manage_exam(&exam);
        if attempt.user_id != user.id && !manager {
            return Err(Error::Forbidden("You cannot view this attempt".to_string()));
        }

        let questions = fetch_questions(&self.pool, exam.id).await?;
        let answers = fetch_answers(&self.pool, attempt.id).await?;

        Ok(AttemptDetailResponse {
            attempt,
            answers,
            exam: ExamView::new(exam, questions, manager),
        })
    }

    pub async fn list_exam_attempts(
        &self,
        user: &AuthUser,
        exam_id: Uuid,
        status: Option<String>,
    ) -> Result<Vec<AttemptListItem>> {
        let exam = fetch_exam(&self.pool, exam_id).await?;
        user.ensure_exam_manager(&exam)?;

        let status = status
            .filter(|s| !s.trim().is_empty())
            .map(|s| AttemptStatus::try_from(s.trim().to_ascii_uppercase()))
            .transpose()
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let rows = sqlx::query_as::<_, AttemptListItem>(
            r#"
            SELECT
                t.id, t.user_id, u.name AS user_name, u.email AS user_email,
                t.status, t.started_at, t.completed_at, t.score,
                (SELECT COUNT(*) FROM answers a WHERE a.attempt_id = t.id AND a.score IS NULL) AS pending_answers
            FROM exam_attempts t
            JOIN users u ON u.id = t.user_id
            WHERE t.exam_id = $1 AND ($2::text IS NULL OR t.status = $2)
            ORDER BY t.started_at DESC
            "#,
        )
        .bind(exam.id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn questions_by_id(questions: Vec<Question>) -> HashMap<Uuid, Question> {
    questions.into_iter().map(|q| (q.id, q)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;
    use serde_json::json;

    fn question(id: Uuid) -> Question {
        Question {
            id,
            exam_id: Uuid::new_v4(),
            question_type: QuestionType::Essay,
            prompt: "Describe".into(),
            points: 5,
            position: 0,
            options: None,
            correct_answer: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn answers_must_target_exam_questions() {
        let known = Uuid::new_v4();
        let questions = questions_by_id(vec![question(known)]);

        let ok = vec![AnswerInput { question_id: known, answer_content: json!("text") }];
        assert!(ensure_known_questions(&questions, &ok).is_ok());

        let foreign = vec![
            AnswerInput { question_id: known, answer_content: json!("text") },
            AnswerInput { question_id: Uuid::new_v4(), answer_content: json!("x") },
        ];
        assert!(matches!(ensure_known_questions(&questions, &foreign), Err(Error::BadRequest(_))));
    }
}
