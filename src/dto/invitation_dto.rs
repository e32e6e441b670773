use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::invitation::Invitation;
use crate::models::user::{Role, UserSummary};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationPayload {
    #[validate(email)]
    pub email: String,
    pub role: Role,
    #[validate(range(min = 1, max = 720, message = "Expiry must be between 1 and 720 hours"))]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitationPayload {
    #[validate(length(min = 16, max = 128))]
    pub token: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationCreatedResponse {
    pub invitation: Invitation,
    pub token: String,
    pub accept_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationAcceptedResponse {
    pub user: UserSummary,
    pub institution_id: uuid::Uuid,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invitation_payload_validates_email_and_expiry() {
        let ok: CreateInvitationPayload =
            serde_json::from_value(json!({"email": "a@b.test", "role": "EXAMINEE"})).unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.role, Role::Examinee);

        let bad: CreateInvitationPayload = serde_json::from_value(
            json!({"email": "not-an-email", "role": "EXAMINER", "expiresInHours": 1000}),
        )
        .unwrap();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("expires_in_hours"));
    }
}
