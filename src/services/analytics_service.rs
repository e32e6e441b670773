use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::dto::attempt_dto::{ExamAnalytics, RecentAttempt};
use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::exam::Exam;
use crate::models::user::UserSummary;
use crate::services::exam_service::fetch_exam;

const RECENT_ATTEMPTS: usize = 10;

/// A completed, scored attempt joined with its examinee.
#[derive(Debug, Clone, FromRow)]
pub struct CompletedAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub score: Decimal,
}

/// Aggregates over `attempts`, which must be ordered newest first.
pub fn summarize(exam_id: Uuid, passing_grade: Decimal, attempts: &[CompletedAttempt]) -> ExamAnalytics {
    let total = attempts.len() as i64;
    let pass_count = attempts.iter().filter(|a| a.score >= passing_grade).count() as i64;

    let (average_score, pass_rate) = if total == 0 {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let sum: Decimal = attempts.iter().map(|a| a.score).sum();
        (
            (sum / Decimal::from(total)).round_dp(2),
            (Decimal::from(pass_count) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2),
        )
    };

    let highest_score = attempts.iter().map(|a| a.score).max().unwrap_or(Decimal::ZERO);
    let lowest_score = attempts.iter().map(|a| a.score).min().unwrap_or(Decimal::ZERO);

    let recent_attempts = attempts
        .iter()
        .take(RECENT_ATTEMPTS)
        .map(|a| RecentAttempt {
            id: a.id,
            user: UserSummary {
                id: a.user_id,
                name: a.user_name.clone(),
                email: a.user_email.clone(),
            },
            score: a.score,
            completed_at: a.completed_at,
        })
        .collect();

    ExamAnalytics {
        exam_id,
        total_attempts: total,
        average_score,
        pass_rate,
        pass_count,
        fail_count: total - pass_count,
        highest_score,
        lowest_score,
        recent_attempts,
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn completed_attempts(&self, exam_id: Uuid) -> Result<Vec<CompletedAttempt>> {
        let rows = sqlx::query_as::<_, CompletedAttempt>(
            r#"
            SELECT
                t.id, t.user_id, u.name AS user_name, u.email AS user_email,
                t.started_at, t.completed_at, t.score
            FROM exam_attempts t
            JOIN users u ON u.id = t.user_id
            WHERE t.exam_id = $1
              AND t.status = 'COMPLETED'
              AND t.score IS NOT NULL
              AND t.completed_at IS NOT NULL
            ORDER BY t.completed_at DESC
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn exam_analytics(&self, user: &AuthUser, exam_id: Uuid) -> Result<ExamAnalytics> {
        let exam = fetch_exam(&self.pool, exam_id).await?;
        user.ensure_exam_manager(&exam)?;
        let attempts = self.completed_attempts(exam.id).await?;
        Ok(summarize(exam.id, exam.passing_grade, &attempts))
    }

    /// Exam plus its completed attempts, for the results workbook.
    pub async fn results(&self, user: &AuthUser, exam_id: Uuid) -> Result<(Exam, Vec<CompletedAttempt>)> {
        let exam = fetch_exam(&self.pool, exam_id).await?;
        user.ensure_exam_manager(&exam)?;
        let attempts = self.completed_attempts(exam.id).await?;
        Ok((exam, attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attempt(score: i64, minutes_ago: i64) -> CompletedAttempt {
        let completed_at = Utc::now() - Duration::minutes(minutes_ago);
        CompletedAttempt {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: format!("Student {}", score),
            user_email: format!("s{}@school.test", score),
            started_at: completed_at - Duration::minutes(30),
            completed_at,
            score: Decimal::from(score),
        }
    }

    #[test]
    fn summarizes_pass_and_fail() {
        let attempts = vec![attempt(70, 1), attempt(50, 5)];
        let stats = summarize(Uuid::new_v4(), Decimal::from(60), &attempts);

        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.pass_count, 1);
        assert_eq!(stats.fail_count, 1);
        assert_eq!(stats.pass_rate, Decimal::from(50));
        assert_eq!(stats.average_score, Decimal::from(60));
        assert_eq!(stats.highest_score, Decimal::from(70));
        assert_eq!(stats.lowest_score, Decimal::from(50));
        assert_eq!(stats.recent_attempts.len(), 2);
        assert_eq!(stats.recent_attempts[0].score, Decimal::from(70));
    }

    #[test]
    fn score_equal_to_passing_grade_passes() {
        let stats = summarize(Uuid::new_v4(), Decimal::from(60), &[attempt(60, 1)]);
        assert_eq!(stats.pass_count, 1);
        assert_eq!(stats.pass_rate, Decimal::from(100));
    }

    #[test]
    fn empty_exam_reports_zeroes() {
        let stats = summarize(Uuid::new_v4(), Decimal::from(60), &[]);
        assert_eq!(stats.total_attempts, 0);
        assert_eq!(stats.average_score, Decimal::ZERO);
        assert_eq!(stats.pass_rate, Decimal::ZERO);
        assert_eq!(stats.highest_score, Decimal::ZERO);
        assert_eq!(stats.lowest_score, Decimal::ZERO);
        assert!(stats.recent_attempts.is_empty());
    }

    #[test]
    fn recent_attempts_are_capped() {
        let attempts: Vec<_> = (0..15).map(|i| attempt(40 + i, i)).collect();
        let stats = summarize(Uuid::new_v4(), Decimal::from(50), &attempts);
        assert_eq!(stats.total_attempts, 15);
        assert_eq!(stats.recent_attempts.len(), RECENT_ATTEMPTS);
        assert_eq!(stats.recent_attempts[0].id, attempts[0].id);
    }
}
