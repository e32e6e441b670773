use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
