use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::dto::assignment_dto::{AssignmentTarget, CreateAssignmentPayload};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::assignment::ExamAssignment;
use crate::models::exam::Exam;
use crate::services::audit_service::AuditService;
use crate::services::exam_service::fetch_exam;
use crate::utils::validation::validate_sub_window;

/// Assignments reaching `user_id` directly or through a group, direct ones first.
pub(crate) async fn matching_assignments<'e, E>(
    executor: E,
    exam_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<ExamAssignment>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ExamAssignment>(
        r#"
        SELECT a.* FROM exam_assignments a
        WHERE a.exam_id = $1
          AND (
            a.user_id = $2
            OR a.group_id IN (SELECT gm.group_id FROM group_members gm WHERE gm.user_id = $2)
          )
        ORDER BY (a.user_id IS NULL) ASC, a.created_at ASC
        "#,
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub(crate) async fn fetch_assignments<'e, E>(executor: E, exam_id: Uuid) -> Result<Vec<ExamAssignment>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, ExamAssignment>(
        r#"SELECT * FROM exam_assignments WHERE exam_id = $1 ORDER BY created_at ASC"#,
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Every stored assignment window must stay inside the exam window.
pub fn ensure_assignments_within(
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    assignments: &[ExamAssignment],
) -> Result<()> {
    assignments.iter().try_for_each(|a| {
        validate_sub_window(from, until, a.available_from, a.available_until).map_err(|e| match e {
            Error::BadRequest(msg) => Error::BadRequest(format!("{} (assignment {})", msg, a.id)),
            other => other,
        })
    })
}

pub(crate) async fn is_assigned<'e, E>(executor: E, exam_id: Uuid, user_id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM exam_assignments a
            WHERE a.exam_id = $1
              AND (
                a.user_id = $2
                OR a.group_id IN (SELECT gm.group_id FROM group_members gm WHERE gm.user_id = $2)
              )
        )
        "#,
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

/// Each bound the assignment leaves open falls back to the exam's own bound.
pub fn effective_window(
    exam: &Exam,
    assignment: &ExamAssignment,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (
        assignment.available_from.or(exam.available_from),
        assignment.available_until.or(exam.available_until),
    )
}

pub fn check_window(
    now: DateTime<Utc>,
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<()> {
    if let Some(from) = from {
        if now < from {
            return Err(Error::NotYetAvailable(from));
        }
    }
    if let Some(until) = until {
        if now > until {
            return Err(Error::NoLongerAvailable(until));
        }
    }
    Ok(())
}

/// Eligible when the exam itself is open and any matching assignment is
/// open at `now`. Otherwise the first assignment's error is reported, or
/// Forbidden when none match.
pub fn check_eligibility(exam: &Exam, assignments: &[ExamAssignment], now: DateTime<Utc>) -> Result<()> {
    if assignments.is_empty() {
        return Err(Error::Forbidden("You are not assigned to this exam".to_string()));
    }
    check_window(now, exam.available_from, exam.available_until)?;

    let mut first_error = None;
    for assignment in assignments {
        let (from, until) = effective_window(exam, assignment);
        match check_window(now, from, until) {
            Ok(()) => return Ok(()),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| Error::Forbidden("You are not assigned to this exam".to_string())))
}

#[derive(Clone)]
pub struct AssignmentService {
    pool: PgPool,
}

impl AssignmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_assignment(
        &self,
        user: &AuthUser,
        exam_id: Uuid,
        payload: CreateAssignmentPayload,
    ) -> Result<ExamAssignment> {
        let target = payload.check()?;
        let exam = fetch_exam(&self.pool, exam_id).await?;
        user.ensure_exam_manager(&exam)?;
        validate_sub_window(
            exam.available_from,
            exam.available_until,
            payload.available_from,
            payload.available_until,
        )?;

        let in_institution: bool = match target {
            AssignmentTarget::User(user_id) => sqlx::query_scalar(
                r#"SELECT EXISTS (SELECT 1 FROM memberships WHERE user_id = $1 AND institution_id = $2)"#,
            )
            .bind(user_id)
            .bind(exam.institution_id)
            .fetch_one(&self.pool)
            .await?,
            AssignmentTarget::Group(group_id) => sqlx::query_scalar(
                r#"SELECT EXISTS (SELECT 1 FROM groups WHERE id = $1 AND institution_id = $2)"#,
            )
            .bind(group_id)
            .bind(exam.institution_id)
            .fetch_one(&self.pool)
            .await?,
        };
        if !in_institution {
            return Err(Error::BadRequest(
                "Assignment target does not belong to the exam's institution".to_string(),
            ));
        }

        let (user_id, group_id) = match target {
            AssignmentTarget::User(id) => (Some(id), None),
            AssignmentTarget::Group(id) => (None, Some(id)),
        };

        let mut tx = self.pool.begin().await?;
        let assignment = sqlx::query_as::<_, ExamAssignment>(
            r#"
            INSERT INTO exam_assignments (exam_id, user_id, group_id, available_from, available_until, assigned_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(exam.id)
        .bind(user_id)
        .bind(group_id)
        .bind(payload.available_from)
        .bind(payload.available_until)
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::Conflict("This target is already assigned to the exam".to_string()),
            other => other,
        })?;

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "exam.assigned",
            "exam_assignment",
            assignment.id,
            Some(json!({ "examId": exam.id, "userId": user_id, "groupId": group_id })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(exam_id = %exam.id, assignment_id = %assignment.id, "Exam assigned");
        Ok(assignment)
    }

    pub async fn list_assignments(&self, user: &AuthUser, exam_id: Uuid) -> Result<Vec<ExamAssignment>> {
        let exam = fetch_exam(&self.pool, exam_id).await?;
        if !user.is_exam_staff(&exam) {
            return Err(Error::Forbidden("Staff access required".to_string()));
        }
        fetch_assignments(&self.pool, exam.id).await
    }

    pub async fn remove_assignment(&self, user: &AuthUser, exam_id: Uuid, assignment_id: Uuid) -> Result<()> {
        let exam = fetch_exam(&self.pool, exam_id).await?;
        user.ensure_exam_manager(&exam)?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(r#"DELETE FROM exam_assignments WHERE id = $1 AND exam_id = $2"#)
            .bind(assignment_id)
            .bind(exam.id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(Error::NotFound("Assignment not found".to_string()));
        }
        AuditService::record(
            &mut *tx,
            Some(user.id),
            "exam.unassigned",
            "exam_assignment",
            assignment_id,
            Some(json!({ "examId": exam.id })),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    use crate::models::exam::ExamStatus;

    fn exam(from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Exam {
        Exam {
            id: Uuid::new_v4(),
            institution_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            title: "Physics".into(),
            description: None,
            duration_minutes: 60,
            passing_grade: Decimal::from(60),
            max_attempts: 1,
            status: ExamStatus::Published,
            available_from: from,
            available_until: until,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn assignment(
        exam: &Exam,
        direct: bool,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> ExamAssignment {
        ExamAssignment {
            id: Uuid::new_v4(),
            exam_id: exam.id,
            user_id: direct.then(Uuid::new_v4),
            group_id: (!direct).then(Uuid::new_v4),
            available_from: from,
            available_until: until,
            assigned_by: exam.created_by,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_assignment_is_forbidden() {
        let e = exam(None, None);
        assert!(matches!(check_eligibility(&e, &[], Utc::now()), Err(Error::Forbidden(_))));
    }

    #[test]
    fn window_bounds_are_reported() {
        let now = Utc::now();
        let later = now + Duration::hours(2);
        let earlier = now - Duration::hours(2);

        assert!(matches!(check_window(now, Some(later), None), Err(Error::NotYetAvailable(t)) if t == later));
        assert!(matches!(check_window(now, None, Some(earlier)), Err(Error::NoLongerAvailable(t)) if t == earlier));
        assert!(check_window(now, Some(earlier), Some(later)).is_ok());
        assert!(check_window(now, None, None).is_ok());
    }

    #[test]
    fn assignment_bounds_fall_back_to_exam_bounds() {
        let now = Utc::now();
        let e = exam(Some(now - Duration::days(1)), Some(now - Duration::hours(1)));

        let inherits = assignment(&e, true, None, None);
        assert!(matches!(check_eligibility(&e, &[inherits], now), Err(Error::NoLongerAvailable(_))));

        let extends_start_only = assignment(&e, true, Some(now - Duration::hours(3)), None);
        let (from, until) = effective_window(&e, &extends_start_only);
        assert_eq!(from, Some(now - Duration::hours(3)));
        assert_eq!(until, e.available_until);
    }

    #[test]
    fn assignment_window_cannot_outlive_exam_window() {
        let now = Utc::now();
        let e = exam(Some(now - Duration::days(1)), Some(now - Duration::hours(1)));
        let later_until = assignment(&e, true, None, Some(now + Duration::hours(12)));
        assert!(matches!(
            check_eligibility(&e, &[later_until], now),
            Err(Error::NoLongerAvailable(t)) if Some(t) == e.available_until
        ));

        let e = exam(Some(now + Duration::hours(1)), None);
        let early_from = assignment(&e, false, Some(now - Duration::hours(1)), None);
        assert!(matches!(check_eligibility(&e, &[early_from], now), Err(Error::NotYetAvailable(_))));
    }

    #[test]
    fn narrowed_exam_window_must_cover_assignments() {
        let now = Utc::now();
        let e = exam(Some(now - Duration::days(1)), Some(now + Duration::days(1)));
        let assignments = vec![
            assignment(&e, true, None, Some(now + Duration::hours(12))),
            assignment(&e, false, None, None),
        ];

        assert!(ensure_assignments_within(e.available_from, e.available_until, &assignments).is_ok());
        assert!(ensure_assignments_within(None, None, &assignments).is_ok());
        assert!(matches!(
            ensure_assignments_within(e.available_from, Some(now - Duration::hours(1)), &assignments),
            Err(Error::BadRequest(msg)) if msg.contains(&assignments[0].id.to_string())
        ));
    }

    #[test]
    fn any_open_assignment_grants_access() {
        let now = Utc::now();
        let e = exam(None, None);
        let closed_direct = assignment(&e, true, None, Some(now - Duration::hours(1)));
        let open_group = assignment(&e, false, Some(now - Duration::hours(1)), None);
        let future_group = assignment(&e, false, Some(now + Duration::hours(1)), None);

        assert!(check_eligibility(&e, &[closed_direct.clone(), open_group], now).is_ok());
        assert!(matches!(
            check_eligibility(&e, &[closed_direct, future_group], now),
            Err(Error::NoLongerAvailable(_))
        ));
    }
}
