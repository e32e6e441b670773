use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::institution::Institution;
use crate::models::user::User;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstitutionPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub admin_name: String,
    #[validate(email)]
    pub admin_email: String,
    #[validate(length(min = 8, max = 128))]
    pub admin_password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInstitutionResponse {
    pub institution: Institution,
    pub admin: User,
}
