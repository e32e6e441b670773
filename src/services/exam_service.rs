use chrono::Utc;
use serde_json::json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::dto::exam_dto::{CreateExamPayload, CreateQuestion, ExamResponse, ExamView, UpdateExamPayload};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::exam::{Exam, ExamStatus};
use crate::models::question::Question;
use crate::services::assignment_service::{ensure_assignments_within, fetch_assignments, is_assigned};
use crate::services::audit_service::AuditService;
use crate::utils::validation::{decimal_2dp, validate_window};

pub(crate) async fn fetch_exam<'e, E>(executor: E, exam_id: Uuid) -> Result<Exam>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Exam>(r#"SELECT * FROM exams WHERE id = $1"#)
        .bind(exam_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound("Exam not found".to_string()))
}

async fn lock_exam(conn: &mut PgConnection, exam_id: Uuid) -> Result<Exam> {
    sqlx::query_as::<_, Exam>(r#"SELECT * FROM exams WHERE id = $1 FOR UPDATE"#)
        .bind(exam_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound("Exam not found".to_string()))
}

pub(crate) async fn fetch_questions<'e, E>(executor: E, exam_id: Uuid) -> Result<Vec<Question>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, Question>(
        r#"SELECT * FROM questions WHERE exam_id = $1 ORDER BY position ASC"#,
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub(crate) async fn fetch_question<'e, E>(executor: E, exam_id: Uuid, question_id: Uuid) -> Result<Question>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Question>(r#"SELECT * FROM questions WHERE id = $1 AND exam_id = $2"#)
        .bind(question_id)
        .bind(exam_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound("Question not found in this exam".to_string()))
}

async fn insert_questions(
    conn: &mut PgConnection,
    exam_id: Uuid,
    questions: &[CreateQuestion],
) -> Result<Vec<Question>> {
    let mut created = Vec::with_capacity(questions.len());
    for (position, q) in questions.iter().enumerate() {
        let row = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (exam_id, question_type, prompt, points, position, options, correct_answer)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(exam_id)
        .bind(q.question_type.as_str())
        .bind(&q.prompt)
        .bind(q.points)
        .bind(position as i32)
        .bind(&q.options)
        .bind(&q.correct_answer)
        .fetch_one(&mut *conn)
        .await?;
        created.push(row);
    }
    Ok(created)
}

#[derive(Clone)]
pub struct ExamService {
    pool: PgPool,
}

impl ExamService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_exam(&self, user: &AuthUser, payload: CreateExamPayload) -> Result<ExamResponse> {
        user.require_staff()?;
        let institution_id = user.institution()?;
        payload.check()?;
        let passing_grade = decimal_2dp(payload.passing_grade, "passingGrade")?;

        let mut tx = self.pool.begin().await?;

        let exam = sqlx::query_as::<_, Exam>(
            r#"
            INSERT INTO exams (
                institution_id, created_by, title, description, duration_minutes,
                passing_grade, max_attempts, status, available_from, available_until
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'DRAFT', $8, $9)
            RETURNING *
            "#,
        )
        .bind(institution_id)
        .bind(user.id)
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(payload.duration_minutes)
        .bind(passing_grade)
        .bind(payload.max_attempts)
        .bind(payload.available_from)
        .bind(payload.available_until)
        .fetch_one(&mut *tx)
        .await?;

        let questions = insert_questions(&mut tx, exam.id, &payload.questions).await?;

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "exam.created",
            "exam",
            exam.id,
            Some(json!({ "title": exam.title, "questions": questions.len() })),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(exam_id = %exam.id, questions = questions.len(), "Exam created");

        Ok(ExamResponse { exam, questions })
    }

    pub async fn update_exam(
        &self,
        user: &AuthUser,
        exam_id: Uuid,
        payload: UpdateExamPayload,
    ) -> Result<ExamResponse> {
        payload.check()?;
        let passing_grade = payload
            .passing_grade
            .map(|g| decimal_2dp(g, "passingGrade"))
            .transpose()?;

        let mut tx = self.pool.begin().await?;
        let exam = lock_exam(&mut tx, exam_id).await?;
        user.ensure_exam_manager(&exam)?;
        if exam.status != ExamStatus::Draft {
            return Err(Error::BadRequest("Only draft exams can be edited".to_string()));
        }

        // Explicit null clears a bound; an absent field keeps it.
        let available_from = payload.available_from.unwrap_or(exam.available_from);
        let available_until = payload.available_until.unwrap_or(exam.available_until);
        validate_window(available_from, available_until)?;
        let assignments = fetch_assignments(&mut *tx, exam.id).await?;
        ensure_assignments_within(available_from, available_until, &assignments)?;

        let exam = sqlx::query_as::<_, Exam>(
            r#"
            UPDATE exams SET
                title = $2,
                description = $3,
                duration_minutes = $4,
                passing_grade = $5,
                max_attempts = $6,
                available_from = $7,
                available_until = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(exam.id)
        .bind(payload.title.unwrap_or(exam.title))
        .bind(payload.description.unwrap_or(exam.description))
        .bind(payload.duration_minutes.unwrap_or(exam.duration_minutes))
        .bind(passing_grade.unwrap_or(exam.passing_grade))
        .bind(payload.max_attempts.unwrap_or(exam.max_attempts))
        .bind(available_from)
        .bind(available_until)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let questions = match &payload.questions {
            Some(replacement) => {
                sqlx::query(r#"DELETE FROM questions WHERE exam_id = $1"#)
                    .bind(exam.id)
                    .execute(&mut *tx)
                    .await?;
                insert_questions(&mut tx, exam.id, replacement).await?
            }
            None => fetch_questions(&mut *tx, exam.id).await?,
        };

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "exam.updated",
            "exam",
            exam.id,
            Some(json!({ "questionsReplaced": payload.questions.is_some() })),
        )
        .await?;

        tx.commit().await?;
        Ok(ExamResponse { exam, questions })
    }

    /// Staff of the owning institution see correct answers; assigned
    /// examinees get the sanitized view of published or closed exams.
    pub async fn get_exam(&self, user: &AuthUser, exam_id: Uuid) -> Result<ExamView> {
        let exam = fetch_exam(&self.pool, exam_id).await?;
        let questions = fetch_questions(&self.pool, exam.id).await?;

        if user.is_exam_staff(&exam) {
            return Ok(ExamView::new(exam, questions, true));
        }
        if exam.status != ExamStatus::Draft && is_assigned(&self.pool, exam.id, user.id).await? {
            return Ok(ExamView::new(exam, questions, false));
        }
        Err(Error::Forbidden("You do not have access to this exam".to_string()))
    }

    pub async fn list_exams(&self, user: &AuthUser) -> Result<Vec<Exam>> {
        let exams = if user.role.is_staff() {
            sqlx::query_as::<_, Exam>(
                r#"SELECT * FROM exams WHERE institution_id = $1 ORDER BY created_at DESC"#,
            )
            .bind(user.institution()?)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Exam>(
                r#"
                SELECT DISTINCT e.* FROM exams e
                JOIN exam_assignments a ON a.exam_id = e.id
                LEFT JOIN group_members gm ON gm.group_id = a.group_id
                WHERE e.status = 'PUBLISHED' AND (a.user_id = $1 OR gm.user_id = $1)
                ORDER BY e.created_at DESC
                "#,
            )
            .bind(user.id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(exams)
    }

    pub async fn delete_exam(&self, user: &AuthUser, exam_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let exam = lock_exam(&mut tx, exam_id).await?;
        user.ensure_exam_manager(&exam)?;
        if exam.status != ExamStatus::Draft {
            return Err(Error::BadRequest("Only draft exams can be deleted".to_string()));
        }

        sqlx::query(r#"DELETE FROM exams WHERE id = $1"#)
            .bind(exam.id)
            .execute(&mut *tx)
            .await?;
        AuditService::record(
            &mut *tx,
            Some(user.id),
            "exam.deleted",
            "exam",
            exam.id,
            Some(json!({ "title": exam.title })),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(exam_id = %exam.id, "Exam deleted");
        Ok(())
    }

    pub async fn publish(&self, user: &AuthUser, exam_id: Uuid) -> Result<Exam> {
        self.transition(user, exam_id, ExamStatus::Published).await
    }

    pub async fn unpublish(&self, user: &AuthUser, exam_id: Uuid) -> Result<Exam> {
        self.transition(user, exam_id, ExamStatus::Draft).await
    }

    pub async fn close(&self, user: &AuthUser, exam_id: Uuid) -> Result<Exam> {
        self.transition(user, exam_id, ExamStatus::Closed).await
    }

    async fn transition(&self, user: &AuthUser, exam_id: Uuid, next: ExamStatus) -> Result<Exam> {
        let mut tx = self.pool.begin().await?;
        let exam = lock_exam(&mut tx, exam_id).await?;
        user.ensure_exam_manager(&exam)?;

        if !exam.status.can_transition_to(next) {
            return Err(Error::BadRequest(format!(
                "Cannot move exam from {} to {}",
                exam.status.as_str(),
                next.as_str()
            )));
        }

        match next {
            ExamStatus::Published => {
                let questions: i64 =
                    sqlx::query_scalar(r#"SELECT COUNT(*) FROM questions WHERE exam_id = $1"#)
                        .bind(exam.id)
                        .fetch_one(&mut *tx)
                        .await?;
                if questions == 0 {
                    return Err(Error::BadRequest(
                        "An exam needs at least one question before publishing".to_string(),
                    ));
                }
            }
            ExamStatus::Draft => {
                let attempts: i64 =
                    sqlx::query_scalar(r#"SELECT COUNT(*) FROM exam_attempts WHERE exam_id = $1"#)
                        .bind(exam.id)
                        .fetch_one(&mut *tx)
                        .await?;
                if attempts > 0 {
                    return Err(Error::Conflict(
                        "Exam already has attempts and cannot return to draft".to_string(),
                    ));
                }
            }
            ExamStatus::Closed => {}
        }

        let updated = sqlx::query_as::<_, Exam>(
            r#"UPDATE exams SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *"#,
        )
        .bind(exam.id)
        .bind(next.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "exam.status_changed",
            "exam",
            exam.id,
            Some(json!({ "from": exam.status.as_str(), "to": next.as_str() })),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(
            exam_id = %exam.id,
            from = exam.status.as_str(),
            to = next.as_str(),
            "Exam status changed"
        );
        Ok(updated)
    }
}
