use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::exam::Exam;
use crate::models::user::Role;
use crate::AppState;

/// Claims minted by the identity service that shares `JWT_SECRET`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: String,
    #[serde(default)]
    pub institution_id: Option<Uuid>,
}

/// Caller identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub institution_id: Option<Uuid>,
}

impl TryFrom<Claims> for AuthUser {
    type Error = Error;

    fn try_from(claims: Claims) -> Result<Self> {
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| Error::Unauthorized("Token subject is not a user id".to_string()))?;
        let role = Role::try_from(claims.role)
            .map_err(|e| Error::Unauthorized(e.to_string()))?;
        Ok(Self {
            id,
            role,
            institution_id: claims.institution_id,
        })
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn institution(&self) -> Result<Uuid> {
        self.institution_id
            .ok_or_else(|| Error::Forbidden("Caller is not bound to an institution".to_string()))
    }

    pub fn require_staff(&self) -> Result<()> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(Error::Forbidden("Examiner or admin role required".to_string()))
        }
    }

    /// Staff member of the institution that owns the exam.
    pub fn is_exam_staff(&self, exam: &Exam) -> bool {
        self.role.is_staff() && self.institution_id == Some(exam.institution_id)
    }

    /// The exam's creator, or an admin of its institution.
    pub fn can_manage_exam(&self, exam: &Exam) -> bool {
        exam.created_by == self.id
            || (self.is_admin() && self.institution_id == Some(exam.institution_id))
    }

    pub fn ensure_exam_manager(&self, exam: &Exam) -> Result<()> {
        if self.can_manage_exam(exam) {
            Ok(())
        } else {
            Err(Error::Forbidden(
                "Only the exam's creator or an institution admin may do this".to_string(),
            ))
        }
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| Error::Unauthorized(e.to_string()))?;
    AuthUser::try_from(data.claims)
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return reject(StatusCode::UNAUTHORIZED, "missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return reject(StatusCode::UNAUTHORIZED, "bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return reject(StatusCode::UNAUTHORIZED, "unsupported_scheme");
    };

    match decode_token(token, &state.config.jwt_secret) {
        Ok(user) => {
            tracing::debug!(user_id = %user.id, role = user.role.as_str(), "Authenticated request");
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("Rejected token: {}", e);
            reject(StatusCode::UNAUTHORIZED, "invalid_token")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rust_decimal::Decimal;

    use crate::models::exam::ExamStatus;

    fn token(claims: &Claims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims(role: &str) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            exp: (Utc::now().timestamp() + 600) as usize,
            role: role.to_string(),
            institution_id: Some(Uuid::new_v4()),
        }
    }

    fn exam(created_by: Uuid, institution_id: Uuid) -> Exam {
        Exam {
            id: Uuid::new_v4(),
            institution_id,
            created_by,
            title: "Algebra".into(),
            description: None,
            duration_minutes: 30,
            passing_grade: Decimal::from(60),
            max_attempts: 1,
            status: ExamStatus::Published,
            available_from: None,
            available_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn decodes_valid_token() {
        let c = claims("EXAMINER");
        let user = decode_token(&token(&c, "secret"), "secret").unwrap();
        assert_eq!(user.id.to_string(), c.sub);
        assert_eq!(user.role, Role::Examiner);
        assert_eq!(user.institution_id, c.institution_id);
    }

    #[test]
    fn rejects_wrong_secret_and_unknown_role() {
        let c = claims("EXAMINEE");
        assert!(matches!(
            decode_token(&token(&c, "other"), "secret"),
            Err(Error::Unauthorized(_))
        ));
        let c = claims("janitor");
        assert!(matches!(
            decode_token(&token(&c, "secret"), "secret"),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn exam_management_is_limited_to_creator_and_institution_admin() {
        let institution = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let e = exam(creator, institution);

        let owner = AuthUser { id: creator, role: Role::Examiner, institution_id: Some(institution) };
        let admin = AuthUser { id: Uuid::new_v4(), role: Role::Admin, institution_id: Some(institution) };
        let foreign_admin = AuthUser { id: Uuid::new_v4(), role: Role::Admin, institution_id: Some(Uuid::new_v4()) };
        let colleague = AuthUser { id: Uuid::new_v4(), role: Role::Examiner, institution_id: Some(institution) };

        assert!(owner.can_manage_exam(&e));
        assert!(admin.can_manage_exam(&e));
        assert!(!foreign_admin.can_manage_exam(&e));
        assert!(!colleague.can_manage_exam(&e));
        assert!(colleague.is_exam_staff(&e));
        assert!(matches!(colleague.ensure_exam_manager(&e), Err(Error::Forbidden(_))));
    }
}
