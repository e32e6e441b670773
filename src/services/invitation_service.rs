use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use url::Url;
use uuid::Uuid;

use crate::dto::invitation_dto::{
    AcceptInvitationPayload, CreateInvitationPayload, InvitationAcceptedResponse,
    InvitationCreatedResponse,
};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::invitation::Invitation;
use crate::models::user::{Role, UserSummary};
use crate::services::audit_service::AuditService;
use crate::services::mail_service::{invitation_mail, MailService};
use crate::utils::crypto::hash_password;
use crate::utils::token::{generate_access_token, token_digest};

pub const TOKEN_LENGTH: usize = 48;
pub const DEFAULT_EXPIRY_HOURS: i64 = 72;
/// Expired, unaccepted invitations are kept this long before purging.
pub const PURGE_AFTER_DAYS: i64 = 7;

/// `{base}/invitations/accept?token=...`, keeping any path prefix of `base`.
pub fn accept_url(base: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::Config(format!("Invalid APP_BASE_URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config("APP_BASE_URL cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend(["invitations", "accept"]);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Admins may invite any role; examiners only examinees.
pub fn can_invite(inviter: Role, invitee: Role) -> bool {
    match inviter {
        Role::Admin => true,
        Role::Examiner => invitee == Role::Examinee,
        Role::Examinee => false,
    }
}

#[derive(Clone)]
pub struct InvitationService {
    pool: PgPool,
    mail: MailService,
    app_base_url: String,
}

impl InvitationService {
    pub fn new(pool: PgPool, mail: MailService, app_base_url: String) -> Self {
        Self {
            pool,
            mail,
            app_base_url,
        }
    }

    pub async fn create_invitation(
        &self,
        user: &AuthUser,
        payload: CreateInvitationPayload,
    ) -> Result<InvitationCreatedResponse> {
        let institution_id = user.institution()?;
        if !can_invite(user.role, payload.role) {
            return Err(Error::Forbidden(format!(
                "{} cannot invite {} users",
                user.role.as_str(),
                payload.role.as_str()
            )));
        }

        let token = generate_access_token(TOKEN_LENGTH);
        let link = accept_url(&self.app_base_url, &token)?;
        let expires_at =
            Utc::now() + Duration::hours(payload.expires_in_hours.unwrap_or(DEFAULT_EXPIRY_HOURS));
        let email = payload.email.trim().to_lowercase();

        let mut tx = self.pool.begin().await?;
        let institution_name: String =
            sqlx::query_scalar(r#"SELECT name FROM institutions WHERE id = $1"#)
                .bind(institution_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound("Institution not found".to_string()))?;

        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (institution_id, email, role, token_hash, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(institution_id)
        .bind(&email)
        .bind(payload.role.as_str())
        .bind(token_digest(&token))
        .bind(user.id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "invitation.created",
            "invitation",
            invitation.id,
            Some(json!({ "email": email, "role": payload.role.as_str() })),
        )
        .await?;
        tx.commit().await?;

        let mail = invitation_mail(&email, &institution_name, payload.role, &link, expires_at);
        if let Err(e) = self.mail.send(&mail).await {
            tracing::warn!(invitation_id = %invitation.id, error = ?e, "Failed to send invitation mail");
        }

        tracing::info!(invitation_id = %invitation.id, role = payload.role.as_str(), "Invitation created");
        Ok(InvitationCreatedResponse {
            invitation,
            token,
            accept_url: link,
        })
    }

    pub async fn list_pending(&self, user: &AuthUser) -> Result<Vec<Invitation>> {
        user.require_staff()?;
        let rows = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT * FROM invitations
            WHERE institution_id = $1 AND accepted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user.institution()?)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn revoke(&self, user: &AuthUser, invitation_id: Uuid) -> Result<()> {
        user.require_staff()?;
        let institution_id = user.institution()?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(
            r#"DELETE FROM invitations WHERE id = $1 AND institution_id = $2 AND accepted_at IS NULL"#,
        )
        .bind(invitation_id)
        .bind(institution_id)
        .execute(&mut *tx)
        .await?;
        if removed.rows_affected() == 0 {
            return Err(Error::NotFound("Pending invitation not found".to_string()));
        }
        AuditService::record(&mut *tx, Some(user.id), "invitation.revoked", "invitation", invitation_id, None)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Redeems a token: creates the account when the email is new, otherwise
    /// reuses it unchanged, and joins it to the inviting institution.
    pub async fn accept(&self, payload: AcceptInvitationPayload) -> Result<InvitationAcceptedResponse> {
        let mut tx = self.pool.begin().await?;

        let invitation = sqlx::query_as::<_, Invitation>(
            r#"SELECT * FROM invitations WHERE token_hash = $1 FOR UPDATE"#,
        )
        .bind(token_digest(payload.token.trim()))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Invitation not found".to_string()))?;

        let now = Utc::now();
        if invitation.accepted_at.is_some() {
            return Err(Error::BadRequest("Invitation has already been accepted".to_string()));
        }
        if invitation.is_expired(now) {
            return Err(Error::BadRequest("Invitation has expired".to_string()));
        }

        let existing = sqlx::query_as::<_, UserSummary>(
            r#"SELECT id, name, email FROM users WHERE lower(email) = lower($1)"#,
        )
        .bind(&invitation.email)
        .fetch_optional(&mut *tx)
        .await?;

        let user = match existing {
            Some(user) => user,
            None => {
                let password_hash = hash_password(&payload.password)?;
                sqlx::query_as::<_, UserSummary>(
                    r#"
                    INSERT INTO users (name, email, role, password_hash)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, name, email
                    "#,
                )
                .bind(payload.name.trim())
                .bind(&invitation.email)
                .bind(invitation.role.as_str())
                .bind(password_hash)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let already_member: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM memberships WHERE user_id = $1 AND institution_id = $2)"#,
        )
        .bind(user.id)
        .bind(invitation.institution_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_member {
            return Err(Error::Conflict("User is already a member of this institution".to_string()));
        }

        sqlx::query(r#"INSERT INTO memberships (user_id, institution_id) VALUES ($1, $2)"#)
            .bind(user.id)
            .bind(invitation.institution_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"UPDATE invitations SET accepted_at = $2 WHERE id = $1"#)
            .bind(invitation.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            Some(user.id),
            "invitation.accepted",
            "invitation",
            invitation.id,
            Some(json!({ "institutionId": invitation.institution_id })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, institution_id = %invitation.institution_id, "Invitation accepted");
        Ok(InvitationAcceptedResponse {
            user,
            institution_id: invitation.institution_id,
            role: invitation.role,
        })
    }

    /// Removes unaccepted invitations that expired more than a week ago.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(PURGE_AFTER_DAYS);
        let result = sqlx::query(
            r#"DELETE FROM invitations WHERE accepted_at IS NULL AND expires_at < $1"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_url_appends_path_and_encoded_token() {
        assert_eq!(
            accept_url("https://exams.test", "abc123").unwrap(),
            "https://exams.test/invitations/accept?token=abc123"
        );
        assert_eq!(
            accept_url("https://exams.test/portal/", "a b").unwrap(),
            "https://exams.test/portal/invitations/accept?token=a+b"
        );
        assert!(matches!(accept_url("not a url", "x"), Err(Error::Config(_))));
    }

    #[test]
    fn examiners_only_invite_examinees() {
        assert!(can_invite(Role::Admin, Role::Admin));
        assert!(can_invite(Role::Admin, Role::Examiner));
        assert!(can_invite(Role::Examiner, Role::Examinee));
        assert!(!can_invite(Role::Examiner, Role::Examiner));
        assert!(!can_invite(Role::Examinee, Role::Examinee));
    }
}
