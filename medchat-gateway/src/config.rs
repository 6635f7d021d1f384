use std::str::FromStr;
use std::time::Duration;

use medchat_core::{ConfigError, TimeoutPolicy, UploadLimits};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_AI_SERVICE_URL: &str = "http://ai-service:8000";

/// Process-wide settings, read once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub port: u16,
    pub ai_service_url: String,
    pub timeouts: TimeoutPolicy,
    pub upload_limits: UploadLimits,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ai_service_url: DEFAULT_AI_SERVICE_URL.to_string(),
            timeouts: TimeoutPolicy::default(),
            upload_limits: UploadLimits::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key/value source; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(Duration::from_secs(parse_or(&lookup, name, default.as_secs())?))
        };

        let timeouts = TimeoutPolicy {
            connect: secs("AI_CONNECT_TIMEOUT_SECS", defaults.timeouts.connect)?,
            list_patients: secs("AI_LIST_TIMEOUT_SECS", defaults.timeouts.list_patients)?,
            chat: secs("AI_CHAT_TIMEOUT_SECS", defaults.timeouts.chat)?,
            generate_report: secs("AI_REPORT_TIMEOUT_SECS", defaults.timeouts.generate_report)?,
            upload_documents: secs("AI_UPLOAD_TIMEOUT_SECS", defaults.timeouts.upload_documents)?,
            health_check: secs("AI_HEALTH_TIMEOUT_SECS", defaults.timeouts.health_check)?,
        };
        timeouts.validate()?;

        let upload_limits = UploadLimits {
            max_file_bytes: parse_or(
                &lookup,
                "UPLOAD_MAX_FILE_BYTES",
                defaults.upload_limits.max_file_bytes,
            )?,
            max_files: parse_or(&lookup, "UPLOAD_MAX_FILES", defaults.upload_limits.max_files)?,
        };

        let ai_service_url = lookup("AI_SERVICE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.ai_service_url);
        if !ai_service_url.starts_with("http://") && !ai_service_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                name: "AI_SERVICE_URL".to_string(),
                value: ai_service_url,
            });
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            ai_service_url,
            timeouts,
            upload_limits,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}
