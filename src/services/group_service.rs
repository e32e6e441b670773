use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::group_dto::{CreateGroupPayload, GroupDetail};
use crate::error::{Error, Result};
use crate::middleware::auth::AuthUser;
use crate::models::group::{Group, GroupMember};

#[derive(Clone)]
pub struct GroupService {
    pool: PgPool,
}

impl GroupService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_group(&self, institution_id: Uuid, group_id: Uuid) -> Result<Group> {
        sqlx::query_as::<_, Group>(r#"SELECT * FROM groups WHERE id = $1 AND institution_id = $2"#)
            .bind(group_id)
            .bind(institution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Group not found".to_string()))
    }

    pub async fn create_group(&self, user: &AuthUser, payload: CreateGroupPayload) -> Result<Group> {
        user.require_staff()?;
        let institution_id = user.institution()?;

        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (institution_id, name, description, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(institution_id)
        .bind(payload.name.trim())
        .bind(&payload.description)
        .bind(user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::Conflict(format!("A group named '{}' already exists", payload.name.trim())),
            other => other,
        })?;

        tracing::info!(group_id = %group.id, "Group created");
        Ok(group)
    }

    pub async fn list_groups(&self, user: &AuthUser) -> Result<Vec<Group>> {
        user.require_staff()?;
        let rows = sqlx::query_as::<_, Group>(
            r#"SELECT * FROM groups WHERE institution_id = $1 ORDER BY name ASC"#,
        )
        .bind(user.institution()?)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_group(&self, user: &AuthUser, group_id: Uuid) -> Result<GroupDetail> {
        user.require_staff()?;
        let group = self.fetch_group(user.institution()?, group_id).await?;
        let members = sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT gm.user_id, u.name, u.email, gm.added_at
            FROM group_members gm
            JOIN users u ON u.id = gm.user_id
            WHERE gm.group_id = $1
            ORDER BY u.name ASC
            "#,
        )
        .bind(group.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(GroupDetail { group, members })
    }

    pub async fn delete_group(&self, user: &AuthUser, group_id: Uuid) -> Result<()> {
        user.require_staff()?;
        let removed = sqlx::query(r#"DELETE FROM groups WHERE id = $1 AND institution_id = $2"#)
            .bind(group_id)
            .bind(user.institution()?)
            .execute(&self.pool)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(Error::NotFound("Group not found".to_string()));
        }
        tracing::info!(group_id = %group_id, "Group deleted");
        Ok(())
    }

    pub async fn add_member(&self, user: &AuthUser, group_id: Uuid, member_id: Uuid) -> Result<GroupMember> {
        user.require_staff()?;
        let group = self.fetch_group(user.institution()?, group_id).await?;

        let in_institution: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM memberships WHERE user_id = $1 AND institution_id = $2)"#,
        )
        .bind(member_id)
        .bind(group.institution_id)
        .fetch_one(&self.pool)
        .await?;
        if !in_institution {
            return Err(Error::BadRequest(
                "User is not a member of this institution".to_string(),
            ));
        }

        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            WITH added AS (
                INSERT INTO group_members (group_id, user_id) VALUES ($1, $2)
                RETURNING user_id, added_at
            )
            SELECT added.user_id, u.name, u.email, added.added_at
            FROM added JOIN users u ON u.id = added.user_id
            "#,
        )
        .bind(group.id)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::Conflict("User is already in this group".to_string()),
            other => other,
        })?;

        Ok(member)
    }

    pub async fn remove_member(&self, user: &AuthUser, group_id: Uuid, member_id: Uuid) -> Result<()> {
        user.require_staff()?;
        let group = self.fetch_group(user.institution()?, group_id).await?;
        let removed = sqlx::query(r#"DELETE FROM group_members WHERE group_id = $1 AND user_id = $2"#)
            .bind(group.id)
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(Error::NotFound("User is not in this group".to_string()));
        }
        Ok(())
    }
}
