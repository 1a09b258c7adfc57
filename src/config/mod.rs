//! Process configuration
//!
//! Loaded once at startup from an optional JSON5 file, then overridden by
//! environment variables. The result is passed down explicitly; nothing here
//! is cached in a global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ivr::IvrConfig;
use crate::mail::MailConfig;
use crate::voice::VoiceConfig;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "ATTENDANT_CONFIG";

pub const DEFAULT_PORT: u16 = 3000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendantConfig {
    pub server: ServerConfig,
    pub voice: VoiceConfig,
    pub mail: MailConfig,
    pub ivr: IvrConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace); `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl AttendantConfig {
    /// Check everything needed to take calls
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.voice
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("voice: {e}")))?;
        self.mail
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("mail: {e}")))?;
        self.ivr
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("ivr: {e}")))?;
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server: port must not be 0".to_string()));
        }
        Ok(())
    }
}

/// Resolve the config file path: `ATTENDANT_CONFIG`, else
/// `<config dir>/attendant/config.json5`.
pub fn get_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attendant")
        .join("config.json5")
}

/// Parse a config file. A missing file yields the defaults.
pub fn load_config_file(path: &Path) -> Result<AttendantConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AttendantConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if raw.trim().is_empty() {
        return Ok(AttendantConfig::default());
    }

    json5::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load the config file and apply overrides from the process environment.
pub fn load_config() -> Result<AttendantConfig, ConfigError> {
    let mut config = load_config_file(&get_config_path())?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// Apply environment overrides through `lookup`. Blank values are ignored.
pub fn apply_env_overrides(
    config: &mut AttendantConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("PROJECT_ID") {
        config.voice.project_id = v;
    }
    if let Some(v) = get("API_KEY") {
        config.voice.token = v;
    }
    if let Some(v) = get("RELAY_HOST") {
        config.voice.host = v;
    }
    if let Some(v) = get("RELAY_CONTEXTS") {
        config.voice.contexts = split_list(&v);
    }

    if let Some(v) = get("SOURCE_ARN") {
        config.mail.source_arn = Some(v);
    }
    if let Some(v) = get("MAIL_SOURCE") {
        config.mail.source = v;
    }
    if let Some(v) = get("MAIL_TO") {
        config.mail.to_addresses = split_list(&v);
    }
    if let Some(v) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
        config.mail.region = v;
    }
    if let Some(v) = get("AWS_ACCESS_KEY_ID") {
        config.mail.access_key_id = Some(v);
    }
    if let Some(v) = get("AWS_SECRET_ACCESS_KEY") {
        config.mail.secret_access_key = Some(v);
    }
    if let Some(v) = get("AWS_SESSION_TOKEN") {
        config.mail.session_token = Some(v);
    }

    if let Some(v) = get("HOST") {
        config.server.host = v;
    }
    if let Some(v) = get("PORT") {
        config.server.port = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: "PORT".to_string(),
            value: v.clone(),
        })?;
    }

    if let Some(v) = get("LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = get("LOG_FORMAT") {
        config.logging.format = v.parse().map_err(|_| ConfigError::InvalidEnv {
            name: "LOG_FORMAT".to_string(),
            value: v.clone(),
        })?;
    }

    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PROJECT_ID", "project-123"),
            ("API_KEY", "PTsecret"),
            ("SOURCE_ARN", "arn:aws:ses:us-east-1:123:identity/example.com"),
            ("MAIL_SOURCE", "ivr@example.com"),
            ("MAIL_TO", "owner@example.com"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = AttendantConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.voice.contexts, vec!["office".to_string()]);
        assert_eq!(config.mail.region, "us-east-1");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_file(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                // comments are allowed
                server: {{ port: 8080 }},
                voice: {{ projectId: "p", token: "t", contexts: ["office", "home"] }},
                ivr: {{ recordDelaySecs: 3, }},
                logging: {{ format: "text" }},
            }}"#
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.voice.contexts.len(), 2);
        assert_eq!(config.ivr.record_delay_secs, 3);
        assert_eq!(config.ivr.digit_timeout_secs, 15);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        std::fs::write(&path, "{ server: ").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AttendantConfig::default();
        let mut pairs = complete_env();
        pairs.push(("RELAY_CONTEXTS", "office, home ,"));
        pairs.push(("MAIL_TO", "a@example.com,b@example.com"));
        pairs.push(("AWS_DEFAULT_REGION", "eu-west-1"));
        pairs.push(("PORT", "8081"));
        pairs.push(("LOG_FORMAT", "text"));
        apply_env_overrides(&mut config, env(&pairs)).unwrap();

        assert_eq!(config.voice.project_id, "project-123");
        assert_eq!(config.voice.token, "PTsecret");
        assert_eq!(config.voice.contexts, vec!["office", "home"]);
        assert_eq!(config.mail.to_addresses, vec!["a@example.com", "b@example.com"]);
        assert_eq!(config.mail.region, "eu-west-1");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_aws_region_beats_default_region() {
        let mut config = AttendantConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("AWS_REGION", "us-west-2"), ("AWS_DEFAULT_REGION", "eu-west-1")]),
        )
        .unwrap();
        assert_eq!(config.mail.region, "us-west-2");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AttendantConfig::default();
        apply_env_overrides(&mut config, env(&[("PORT", " "), ("RELAY_HOST", "")])).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.voice.host, crate::voice::config::DEFAULT_RELAY_HOST);
    }

    #[test]
    fn test_invalid_port_env() {
        let mut config = AttendantConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "PORT"));
    }

    #[test]
    fn test_validate_requires_voice_credentials() {
        let err = AttendantConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("voice"));
    }

    #[test]
    fn test_validate_skips_disabled_mail() {
        let mut config = AttendantConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("PROJECT_ID", "p"), ("API_KEY", "t")]),
        )
        .unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("mail"));

        config.mail.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
