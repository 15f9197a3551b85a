// config.rs
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpStoreKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTransportKind {
    Smtp,
    Local,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
    pub username: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub otp_ttl_seconds: i64,
    pub otp_max_attempts: u32,
    pub otp_demo_code: Option<String>,
    pub otp_store: OtpStoreKind,
    pub redis_url: Option<String>,
    pub mail_transport: MailTransportKind,
    pub mail_from: String,
    pub mail_outbox_dir: PathBuf,
    pub smtp: Option<SmtpConfig>,
    pub sms: Option<SmsConfig>,
    pub frontend_url: String,
    pub reset_token_ttl_seconds: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let otp_store = match optional("OTP_STORE").as_deref() {
            None | Some("memory") => OtpStoreKind::Memory,
            Some("redis") => OtpStoreKind::Redis,
            Some(other) => {
                return Err(AppError::configuration(format!("Unknown OTP_STORE: {}", other)))
            }
        };
        let redis_url = optional("REDIS_URL");
        if otp_store == OtpStoreKind::Redis && redis_url.is_none() {
            return Err(AppError::configuration("REDIS_URL must be set when OTP_STORE=redis"));
        }

        let mail_transport = match optional("MAIL_TRANSPORT").as_deref() {
            None | Some("local") => MailTransportKind::Local,
            Some("smtp") => MailTransportKind::Smtp,
            Some(other) => {
                return Err(AppError::configuration(format!("Unknown MAIL_TRANSPORT: {}", other)))
            }
        };
        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: optional("SMTP_USERNAME").unwrap_or_default(),
                password: optional("SMTP_PASSWORD").unwrap_or_default(),
            }),
            None => None,
        };
        if mail_transport == MailTransportKind::Smtp && smtp.is_none() {
            return Err(AppError::configuration("SMTP_HOST must be set when MAIL_TRANSPORT=smtp"));
        }

        let sms = optional("SMS_API_KEY").map(|api_key| SmsConfig {
            api_url: optional("SMS_API_URL")
                .unwrap_or_else(|| "https://api.africastalking.com/version1/messaging".to_string()),
            api_key,
            username: optional("SMS_USERNAME").unwrap_or_else(|| "sandbox".to_string()),
            from: optional("SMS_FROM").unwrap_or_else(|| "LibraryMate".to_string()),
        });

        Ok(AppConfig {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", 10000)?,
            database_url: required("DATABASE_URL")?,
            database_name: optional("DATABASE_NAME").unwrap_or_else(|| "librarymate".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_days: parse_in_range("JWT_TTL_DAYS", 7, 1..=365)?,
            otp_ttl_seconds: parse_in_range("OTP_TTL_SECONDS", 300, 30..=86_400)?,
            otp_max_attempts: parse_in_range("OTP_MAX_ATTEMPTS", 3, 1..=10)?,
            otp_demo_code: optional("OTP_DEMO_CODE"),
            otp_store,
            redis_url,
            mail_transport,
            mail_from: optional("MAIL_FROM")
                .unwrap_or_else(|| "LibraryMate <no-reply@librarymate.local>".to_string()),
            mail_outbox_dir: optional("MAIL_OUTBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./outbox")),
            smtp,
            sms,
            frontend_url: optional("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            reset_token_ttl_seconds: parse_in_range("RESET_TOKEN_TTL_SECONDS", 3600, 60..=604_800)?,
        })
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "port": self.port,
            "database_name": self.database_name,
            "jwt_ttl_days": self.jwt_ttl_days,
            "otp_ttl_seconds": self.otp_ttl_seconds,
            "otp_max_attempts": self.otp_max_attempts,
            "otp_demo_bypass": self.otp_demo_code.is_some(),
            "otp_store": format!("{:?}", self.otp_store).to_lowercase(),
            "mail_transport": format!("{:?}", self.mail_transport).to_lowercase(),
            "sms_enabled": self.sms.is_some(),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}

// Durations are built from these values, so anything outside `range` is
// refused at startup.
fn parse_in_range<T>(key: &str, default: T, range: RangeInclusive<T>) -> Result<T>
where
    T: FromStr + PartialOrd + Display,
{
    let value = parse_or(key, default)?;
    check_range(key, value, &range)
}

fn check_range<T: PartialOrd + Display>(key: &str, value: T, range: &RangeInclusive<T>) -> Result<T> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(AppError::configuration(format!(
            "{} must be between {} and {}, got {}",
            key,
            range.start(),
            range.end(),
            value
        )))
    }
}

#[cfg(test)]
impl AppConfig {
    /// Configuration used by unit tests; nothing here touches the network.
    pub fn for_tests() -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "mongodb://127.0.0.1:27017".to_string(),
            database_name: "librarymate_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_days: 7,
            otp_ttl_seconds: 300,
            otp_max_attempts: 3,
            otp_demo_code: None,
            otp_store: OtpStoreKind::Memory,
            redis_url: None,
            mail_transport: MailTransportKind::Local,
            mail_from: "LibraryMate <no-reply@librarymate.local>".to_string(),
            mail_outbox_dir: PathBuf::from("./tmp/test-outbox"),
            smtp: None,
            sms: None,
            frontend_url: "http://localhost:5173".to_string(),
            reset_token_ttl_seconds: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_or_uses_default_for_missing_key() {
        let value: u16 = parse_or("LIBRARYMATE_TEST_UNSET_PORT", 4242).unwrap();
        assert_eq!(value, 4242);
    }

    #[rstest]
    #[case(300, true)]
    #[case(30, true)]
    #[case(86_400, true)]
    #[case(0, false)]
    #[case(-5, false)]
    #[case(i64::MAX, false)]
    fn test_ttl_range(#[case] value: i64, #[case] accepted: bool) {
        let result = check_range("OTP_TTL_SECONDS", value, &(30..=86_400));
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(matches!(result, Err(AppError::ConfigurationError(_))));
        }
    }

    #[test]
    fn test_out_of_range_env_value_is_configuration_error() {
        env::set_var("LIBRARYMATE_TEST_HUGE_TTL", "9223372036854775807");
        let err = parse_in_range("LIBRARYMATE_TEST_HUGE_TTL", 300i64, 30..=86_400).unwrap_err();
        assert!(err.to_string().contains("LIBRARYMATE_TEST_HUGE_TTL must be between 30 and 86400"));

        env::set_var("LIBRARYMATE_TEST_SANE_TTL", " 600 ");
        let value = parse_in_range("LIBRARYMATE_TEST_SANE_TTL", 300i64, 30..=86_400).unwrap();
        assert_eq!(value, 600);
    }

    #[test]
    fn test_required_reports_missing_key() {
        let err = required("LIBRARYMATE_TEST_UNSET_SECRET").unwrap_err();
        assert!(err.to_string().contains("LIBRARYMATE_TEST_UNSET_SECRET must be set"));
    }

    #[test]
    fn test_config_info_hides_secrets() {
        let info = AppConfig::for_tests().get_config_info();
        assert_eq!(info["otp_store"], "memory");
        assert_eq!(info["mail_transport"], "local");
        assert!(info.get("jwt_secret").is_none());
    }
}
