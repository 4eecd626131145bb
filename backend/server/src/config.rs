use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_EMAIL_FROM: &str = "City Sentinel <onboarding@resend.dev>";
const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(String),

    #[error("invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

pub struct Config {
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub email: EmailConfig,
}

/// Email channel settings. No API key means the channel is disabled, not misconfigured.
#[derive(Clone)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub from: String,
    pub timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let email = EmailConfig {
            api_key: read_secret("RESEND_API_KEY"),
            api_url: try_load("EMAIL_API_URL", DEFAULT_EMAIL_API_URL)?,
            from: try_load("EMAIL_FROM", DEFAULT_EMAIL_FROM)?,
            timeout: Duration::from_millis(try_load("EMAIL_TIMEOUT_MS", "10000")?),
        };

        if email.api_key.is_none() {
            warn!("RESEND_API_KEY not set, email channel disabled");
        }

        Ok(Self {
            port: try_load("RUST_PORT", "8080")?,
            supabase_url: required("SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            supabase_anon_key: read_secret("SUPABASE_ANON_KEY")
                .ok_or_else(|| ConfigError::Missing("SUPABASE_ANON_KEY".to_string()))?,
            supabase_service_key: read_secret("SUPABASE_SERVICE_ROLE_KEY")
                .ok_or_else(|| ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY".to_string()))?,
            email,
        })
    }
}

fn var(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    require(key, var(key))
}

fn require(key: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    parse_or_default(key, var(key), default)
}

fn parse_or_default<T: FromStr>(
    key: &str,
    value: Option<String>,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Environment first, then the Docker secret mount.
fn read_secret(secret_name: &str) -> Option<String> {
    secret_or_mount(secret_name, var(secret_name))
}

fn secret_or_mount(secret_name: &str, from_env: Option<String>) -> Option<String> {
    if let Some(value) = from_env {
        return Some(value.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_falls_back_to_default() {
        let port: u16 = parse_or_default("RUST_PORT", None, "8080").unwrap();
        assert_eq!(port, 8080);

        let port: u16 = parse_or_default("RUST_PORT", Some("9090".to_string()), "8080").unwrap();
        assert_eq!(port, 9090);
    }

    #[test]
    fn test_parse_rejects_unparsable_value() {
        let err = parse_or_default::<u64>("EMAIL_TIMEOUT_MS", Some("soon".to_string()), "10000")
            .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EMAIL_TIMEOUT_MS"));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = require("SUPABASE_URL", non_blank(Some("   ".to_string()))).unwrap_err();
        assert_eq!(err.to_string(), "SUPABASE_URL is not set");

        assert_eq!(
            require("SUPABASE_URL", non_blank(Some("https://db.test".to_string()))).unwrap(),
            "https://db.test"
        );
    }

    #[test]
    fn test_secret_prefers_env_and_trims() {
        assert_eq!(
            secret_or_mount("SUPABASE_ANON_KEY", Some(" key-123\n".to_string())).as_deref(),
            Some("key-123")
        );
        assert_eq!(secret_or_mount("NOTIFIER_ABSENT_SECRET", None), None);
    }
}
