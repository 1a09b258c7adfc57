//! AWS SES v2 `SendEmail` client.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::config::MailConfig;
use super::sigv4::{AwsCredentials, SigningRequest};
use super::{EmailRequest, MailError, MailSender, Result, SendReceipt};

const SEND_EMAIL_PATH: &str = "/v2/email/outbound-emails";
const SERVICE: &str = "ses";

/// SES mail sender
pub struct SesMailer {
    client: reqwest::Client,
    region: String,
    credentials: AwsCredentials,
    base_url: String,
    host: String,
}

impl std::fmt::Debug for SesMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SesMailer")
            .field("region", &self.region)
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl SesMailer {
    /// Create a mailer from validated configuration.
    pub fn new(config: &MailConfig) -> Result<Self> {
        config.validate().map_err(MailError::ConfigError)?;

        let region = config.region.trim().to_string();
        let base_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://email.{}.amazonaws.com", region));
        let base_url = base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| MailError::ConfigError(format!("invalid SES endpoint: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(MailError::ConfigError(format!(
                    "SES endpoint has no host: {base_url}"
                )))
            }
        };

        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            region,
            credentials: AwsCredentials {
                access_key_id: config.access_key_id.clone().unwrap_or_default(),
                secret_access_key: config.secret_access_key.clone().unwrap_or_default(),
                session_token: config
                    .session_token
                    .clone()
                    .filter(|t| !t.trim().is_empty()),
            },
            base_url,
            host,
        })
    }

    /// JSON body of a SES v2 `SendEmail` call
    fn build_body(request: &EmailRequest) -> Value {
        let mut body = json!({
            "FromEmailAddress": request.source,
            "Destination": {
                "ToAddresses": request.to_addresses,
            },
            "Content": {
                "Simple": {
                    "Subject": {
                        "Data": request.subject,
                        "Charset": request.charset,
                    },
                    "Body": {
                        "Html": {
                            "Data": request.html_body,
                            "Charset": request.charset,
                        }
                    }
                }
            }
        });
        if let Some(ref arn) = request.source_arn {
            body["FromEmailAddressIdentityArn"] = json!(arn);
        }
        body
    }
}

#[async_trait]
impl MailSender for SesMailer {
    async fn send(&self, request: &EmailRequest) -> Result<SendReceipt> {
        let body = serde_json::to_vec(&Self::build_body(request))?;
        let datetime = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let sig_headers = self.credentials.sign(&SigningRequest {
            method: "POST",
            host: &self.host,
            path: SEND_EMAIL_PATH,
            region: &self.region,
            service: SERVICE,
            body: &body,
            datetime: &datetime,
        });

        let mut http_request = self
            .client
            .post(format!("{}{}", self.base_url, SEND_EMAIL_PATH))
            .header("content-type", "application/json");
        for (name, value) in &sig_headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        debug!(to = ?request.to_addresses, "Sending email through SES");
        let response = http_request.body(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(MailError::Rejected { status, body });
        }

        let response_body: Value = response.json().await?;
        let message_id = response_body
            .get("MessageId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailConfig {
        MailConfig {
            source: "ivr@example.com".to_string(),
            source_arn: Some("arn:aws:ses:us-east-1:123:identity/example.com".to_string()),
            to_addresses: vec!["owner@example.com".to_string()],
            access_key_id: Some("AKID".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..MailConfig::default()
        }
    }

    fn request() -> EmailRequest {
        EmailRequest {
            to_addresses: vec!["owner@example.com".to_string()],
            subject: "Voicemail Notification".to_string(),
            html_body: "<p>hello</p>".to_string(),
            source: "ivr@example.com".to_string(),
            source_arn: Some("arn:aws:ses:us-east-1:123:identity/example.com".to_string()),
            charset: "UTF-8".to_string(),
        }
    }

    #[test]
    fn test_new_derives_regional_endpoint() {
        let mailer = SesMailer::new(&MailConfig {
            region: "eu-west-1".to_string(),
            ..config()
        })
        .unwrap();
        assert_eq!(mailer.base_url, "https://email.eu-west-1.amazonaws.com");
        assert_eq!(mailer.host, "email.eu-west-1.amazonaws.com");
    }

    #[test]
    fn test_new_honors_endpoint_override() {
        let mailer = SesMailer::new(&MailConfig {
            endpoint: Some("http://localhost:4566/".to_string()),
            ..config()
        })
        .unwrap();
        assert_eq!(mailer.base_url, "http://localhost:4566");
        assert_eq!(mailer.host, "localhost:4566");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = SesMailer::new(&MailConfig {
            access_key_id: None,
            ..config()
        });
        assert!(matches!(result, Err(MailError::ConfigError(_))));
    }

    #[test]
    fn test_build_body_shape() {
        let body = SesMailer::build_body(&request());
        assert_eq!(body["FromEmailAddress"], "ivr@example.com");
        assert_eq!(
            body["FromEmailAddressIdentityArn"],
            "arn:aws:ses:us-east-1:123:identity/example.com"
        );
        assert_eq!(body["Destination"]["ToAddresses"][0], "owner@example.com");
        assert_eq!(
            body["Content"]["Simple"]["Subject"]["Data"],
            "Voicemail Notification"
        );
        assert_eq!(
            body["Content"]["Simple"]["Body"]["Html"]["Data"],
            "<p>hello</p>"
        );
        assert_eq!(body["Content"]["Simple"]["Body"]["Html"]["Charset"], "UTF-8");
    }

    #[test]
    fn test_build_body_without_arn() {
        let body = SesMailer::build_body(&EmailRequest {
            source_arn: None,
            ..request()
        });
        assert!(body.get("FromEmailAddressIdentityArn").is_none());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let mailer = SesMailer::new(&config()).unwrap();
        let rendered = format!("{:?}", mailer);
        assert!(!rendered.contains("AKID"));
        assert!(!rendered.contains("secret\""));
    }
}
