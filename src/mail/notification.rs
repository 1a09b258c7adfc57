//! Voicemail notification email

use super::{EmailRequest, MailConfig};

pub const VOICEMAIL_SUBJECT: &str = "Voicemail Notification";
pub const CHARSET: &str = "UTF-8";

/// Static parts of every notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub to_addresses: Vec<String>,
    pub source: String,
    pub source_arn: Option<String>,
    pub recipient_name: String,
}

impl From<&MailConfig> for NotificationSettings {
    fn from(config: &MailConfig) -> Self {
        Self {
            to_addresses: config
                .to_addresses
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            source: config.source.clone(),
            source_arn: config.source_arn.clone(),
            recipient_name: config.recipient_name.clone(),
        }
    }
}

/// Build the email announcing a new voicemail.
///
/// `caller` and `recording_url` come from the platform and are escaped before
/// they reach the HTML body.
pub fn build_voicemail_notification(
    settings: &NotificationSettings,
    caller: &str,
    recording_url: &str,
) -> EmailRequest {
    let html_body = format!(
        r#"<html>
  <head></head>
  <body>
    <h4>Hey {name},</h4>
    <h5>You received a call from {caller}. They left you this <a href="{url}">voicemail</a>.</h5>
    <br>
    <br>
    <p>This is an automated message sent from an unmonitored mailbox. Please do not respond.</p>
  </body>
</html>"#,
        name = html_escape(&settings.recipient_name),
        caller = html_escape(caller),
        url = html_escape(recording_url),
    );

    EmailRequest {
        to_addresses: settings.to_addresses.clone(),
        subject: VOICEMAIL_SUBJECT.to_string(),
        html_body,
        source: settings.source.clone(),
        source_arn: settings.source_arn.clone(),
        charset: CHARSET.to_string(),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
