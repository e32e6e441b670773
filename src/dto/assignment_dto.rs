use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::utils::validation::validate_window;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentPayload {
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
}

/// Who an assignment grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentTarget {
    User(Uuid),
    Group(Uuid),
}

impl CreateAssignmentPayload {
    pub fn target(&self) -> Result<AssignmentTarget> {
        match (self.user_id, self.group_id) {
            (Some(user), None) => Ok(AssignmentTarget::User(user)),
            (None, Some(group)) => Ok(AssignmentTarget::Group(group)),
            _ => Err(Error::BadRequest(
                "Exactly one of userId or groupId must be given".to_string(),
            )),
        }
    }

    pub fn check(&self) -> Result<AssignmentTarget> {
        validate_window(self.available_from, self.available_until)?;
        self.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(user_id: Option<Uuid>, group_id: Option<Uuid>) -> CreateAssignmentPayload {
        CreateAssignmentPayload { user_id, group_id, available_from: None, available_until: None }
    }

    #[test]
    fn target_is_mutually_exclusive() {
        let id = Uuid::new_v4();
        assert_eq!(payload(Some(id), None).target().unwrap(), AssignmentTarget::User(id));
        assert_eq!(payload(None, Some(id)).target().unwrap(), AssignmentTarget::Group(id));
        assert!(payload(Some(id), Some(id)).target().is_err());
        assert!(payload(None, None).target().is_err());
    }
}
