use serde_json::json;
use sqlx::PgPool;

use crate::dto::institution_dto::{RegisterInstitutionPayload, RegisterInstitutionResponse};
use crate::error::{Error, Result};
use crate::models::institution::Institution;
use crate::models::user::{Role, User};
use crate::services::audit_service::AuditService;
use crate::utils::crypto::hash_password;

#[derive(Clone)]
pub struct InstitutionService {
    pool: PgPool,
}

impl InstitutionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the institution together with its first admin account.
    pub async fn register(&self, payload: RegisterInstitutionPayload) -> Result<RegisterInstitutionResponse> {
        let password_hash = hash_password(&payload.admin_password)?;
        let email = payload.admin_email.trim().to_lowercase();

        let mut tx = self.pool.begin().await?;

        let institution = sqlx::query_as::<_, Institution>(
            r#"INSERT INTO institutions (name) VALUES ($1) RETURNING *"#,
        )
        .bind(payload.name.trim())
        .fetch_one(&mut *tx)
        .await?;

        let admin = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(payload.admin_name.trim())
        .bind(&email)
        .bind(Role::Admin.as_str())
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::Conflict("An account with this email already exists".to_string()),
            other => other,
        })?;

        sqlx::query(r#"INSERT INTO memberships (user_id, institution_id) VALUES ($1, $2)"#)
            .bind(admin.id)
            .bind(institution.id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            Some(admin.id),
            "institution.registered",
            "institution",
            institution.id,
            Some(json!({ "name": institution.name, "adminEmail": admin.email })),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(institution_id = %institution.id, admin_id = %admin.id, "Institution registered");

        Ok(RegisterInstitutionResponse { institution, admin })
    }
}
