use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;

use crate::error::Result;
use crate::models::user::Role;

/// An outgoing message as handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

pub fn invitation_mail(
    to: &str,
    institution_name: &str,
    role: Role,
    accept_url: &str,
    expires_at: DateTime<Utc>,
) -> Mail {
    let role = match role {
        Role::Admin => "an administrator",
        Role::Examiner => "an examiner",
        Role::Examinee => "an examinee",
    };
    Mail {
        to: to.to_string(),
        subject: format!("You have been invited to {}", institution_name),
        text: format!(
            "You have been invited to join {} as {}.\n\n\
             Accept the invitation here:\n{}\n\n\
             This link expires on {}.",
            institution_name,
            role,
            accept_url,
            expires_at.format("%Y-%m-%d %H:%M UTC"),
        ),
    }
}

/// Posts JSON messages to an HTTP mail relay. Without a relay the message
/// is only logged.
#[derive(Clone)]
pub struct MailService {
    client: Client,
    relay_url: Option<String>,
    from: String,
}

impl MailService {
    pub fn new(relay_url: Option<String>, from: String) -> Self {
        Self {
            client: Client::new(),
            relay_url,
            from,
        }
    }

    pub async fn send(&self, mail: &Mail) -> Result<()> {
        let Some(relay_url) = &self.relay_url else {
            tracing::info!(to = %mail.to, subject = %mail.subject, "Mail relay not configured, message not sent");
            return Ok(());
        };

        self.client
            .post(relay_url)
            .json(&json!({
                "from": self.from,
                "to": mail.to,
                "subject": mail.subject,
                "text": mail.text,
            }))
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail handed to relay");
        Ok(())
    }
}
