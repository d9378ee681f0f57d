use serde::Deserialize;

/// Default email queue throughput: attempts per window.
const DEFAULT_EMAIL_RATE_LIMIT: u32 = 10;
/// Default SMS queue throughput: attempts per window.
const DEFAULT_SMS_RATE_LIMIT: u32 = 5;
/// Default rate window in milliseconds.
const DEFAULT_WINDOW_MS: u64 = 1000;

/// Rate limit settings for a single channel queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueueSettings {
    /// Maximum delivery attempts per window.
    pub rate_limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the upstream email/SMS service
    pub notification_service_url: String,

    /// Bearer token required on every `/api` route
    pub api_auth_token: String,

    /// HTTP listen port (default: 8080)
    pub port: u16,

    /// Email queue limits
    pub email_queue: QueueSettings,

    /// SMS queue limits
    pub sms_queue: QueueSettings,

    /// Optional upper bound for a single provider call, in milliseconds
    pub delivery_timeout_ms: Option<u64>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            notification_service_url: lookup("NOTIFICATION_SERVICE_URL").ok_or_else(|| {
                anyhow::anyhow!("NOTIFICATION_SERVICE_URL environment variable is required")
            })?,
            api_auth_token: lookup("API_AUTH_TOKEN")
                .filter(|token| !token.is_empty())
                .ok_or_else(|| anyhow::anyhow!("API_AUTH_TOKEN environment variable is required"))?,
            port: parse_or(&lookup, "PORT", 8080)?,
            email_queue: QueueSettings {
                rate_limit: parse_or(&lookup, "EMAIL_RATE_LIMIT", DEFAULT_EMAIL_RATE_LIMIT)?,
                window_ms: parse_or(&lookup, "EMAIL_WINDOW_MS", DEFAULT_WINDOW_MS)?,
            },
            sms_queue: QueueSettings {
                rate_limit: parse_or(&lookup, "SMS_RATE_LIMIT", DEFAULT_SMS_RATE_LIMIT)?,
                window_ms: parse_or(&lookup, "SMS_WINDOW_MS", DEFAULT_WINDOW_MS)?,
            },
            delivery_timeout_ms: lookup("DELIVERY_TIMEOUT_MS")
                .map(|raw| match raw.trim().parse::<u64>() {
                    Ok(0) => Err(anyhow::anyhow!(
                        "DELIVERY_TIMEOUT_MS must be greater than zero"
                    )),
                    Ok(ms) => Ok(ms),
                    Err(_) => Err(anyhow::anyhow!("DELIVERY_TIMEOUT_MS must be a valid u64")),
                })
                .transpose()?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>()
            )
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("NOTIFICATION_SERVICE_URL", "http://provider"),
            ("API_AUTH_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.email_queue.rate_limit, 10);
        assert_eq!(config.email_queue.window_ms, 1000);
        assert_eq!(config.sms_queue.rate_limit, 5);
        assert_eq!(config.delivery_timeout_ms, None);
    }

    #[test]
    fn test_overrides_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("NOTIFICATION_SERVICE_URL", "http://provider"),
            ("API_AUTH_TOKEN", "secret"),
            ("PORT", "9000"),
            ("SMS_RATE_LIMIT", "2"),
            ("SMS_WINDOW_MS", "60000"),
            ("DELIVERY_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.sms_queue,
            QueueSettings {
                rate_limit: 2,
                window_ms: 60000
            }
        );
        assert_eq!(config.delivery_timeout_ms, Some(2500));
    }

    #[test]
    fn test_missing_required_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("API_AUTH_TOKEN", "secret")])).is_err());
        assert!(
            AppConfig::from_lookup(lookup_from(&[(
                "NOTIFICATION_SERVICE_URL",
                "http://provider"
            )]))
            .is_err()
        );
    }

    #[test]
    fn test_non_numeric_rate_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("NOTIFICATION_SERVICE_URL", "http://provider"),
            ("API_AUTH_TOKEN", "secret"),
            ("EMAIL_RATE_LIMIT", "fast"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_delivery_timeout_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("NOTIFICATION_SERVICE_URL", "http://provider"),
            ("API_AUTH_TOKEN", "secret"),
            ("DELIVERY_TIMEOUT_MS", "0"),
        ]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
