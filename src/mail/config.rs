//! Mail Configuration

use serde::{Deserialize, Serialize};

/// Mail configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailConfig {
    /// Send through SES; when off, notifications are only logged
    pub enabled: bool,
    /// AWS region of the SES endpoint
    pub region: String,
    /// Sender address
    pub source: String,
    /// ARN of the verified sending identity
    pub source_arn: Option<String>,
    /// Recipients of voicemail notifications
    pub to_addresses: Vec<String>,
    /// Name used in the notification greeting
    pub recipient_name: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Override of the SES base URL
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("enabled", &self.enabled)
            .field("region", &self.region)
            .field("source", &self.source)
            .field("source_arn", &self.source_arn)
            .field("to_addresses", &self.to_addresses)
            .field("recipient_name", &self.recipient_name)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "***"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("session_token", &self.session_token.is_some())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            region: "us-east-1".to_string(),
            source: String::new(),
            source_arn: None,
            to_addresses: Vec::new(),
            recipient_name: "there".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

impl MailConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        if self.region.trim().is_empty() {
            return Err("AWS region is required".to_string());
        }

        if self.source.trim().is_empty() {
            return Err("Sender address is required".to_string());
        }

        if self.to_addresses.iter().all(|a| a.trim().is_empty()) {
            return Err("At least one notification recipient is required".to_string());
        }

        if self.access_key_id.as_deref().unwrap_or("").trim().is_empty() {
            return Err("AWS access key ID is required".to_string());
        }

        if self.secret_access_key.as_deref().unwrap_or("").trim().is_empty() {
            return Err("AWS secret access key is required".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> MailConfig {
        MailConfig {
            source: "ivr@example.com".to_string(),
            to_addresses: vec!["owner@example.com".to_string()],
            access_key_id: Some("AKID".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..MailConfig::default()
        }
    }

    #[test]
    fn test_mail_config_default() {
        let config = MailConfig::default();
        assert!(config.enabled);
        assert_eq!(config.region, "us-east-1");
        assert!(config.to_addresses.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mail_config_disabled_skips_validation() {
        let config = MailConfig {
            enabled: false,
            ..MailConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mail_config_missing_recipients() {
        let config = MailConfig {
            to_addresses: vec![],
            ..configured()
        };
        assert!(config.validate().unwrap_err().contains("recipient"));
    }

    #[test]
    fn test_mail_config_missing_secret() {
        let config = MailConfig {
            secret_access_key: None,
            ..configured()
        };
        assert!(config.validate().unwrap_err().contains("secret access key"));
    }

    #[test]
    fn test_mail_config_valid() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", configured());
        assert!(!rendered.contains("AKID"));
        assert!(!rendered.contains("secret\""));
    }
}
