//! Environment-sourced configuration (spec §6).
//!
//! All keys are optional with defaults; a malformed value for a recognized
//! key is a fatal startup error (spec §7 "Fatal: misconfiguration at
//! startup").

use std::env;
use std::time::Duration;

use ratings_content::{AdmissionPolicy, AnomalyPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Process-wide configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,

    /// JWT HMAC secret used to validate bearer tokens.
    pub jwt_secret: String,

    pub admission_policy: AdmissionPolicy,
    pub anomaly_policy: AnomalyPolicy,

    /// Recognized but inert: the source system's transport was Kafka; this
    /// deployment runs the event stream over `REDIS_URL` instead (see
    /// the grounding ledger). We still read and log the value so an operator
    /// migrating config doesn't get silently ignored input.
    pub kafka_bootstrap_servers: Option<String>,

    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
}

impl Config {
    /// Load configuration from the process environment, applying `.env` if
    /// present (dev convenience; a real deployment sets real env vars).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/ratings".to_string()),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: env::var("SECRET_KEY").unwrap_or_else(|_| "insecure-dev-secret".to_string()),

            admission_policy: AdmissionPolicy {
                rate_limit_per_hour: parse_env("RATE_LIMIT_PER_HOUR", 10_000)?,
            },
            anomaly_policy: AnomalyPolicy {
                min_rate_count: parse_env("MIN_RATE_COUNT", 10)?,
                anomaly_threshold: parse_env("ANOMALY_THRESHOLD", 0.8)?,
                anomaly_weight_penalty: parse_env("ANOMALY_WEIGHT_PENALTY", 0.001)?,
            },

            kafka_bootstrap_servers: env::var("KAFKA_BOOTSTRAP_SERVERS").ok(),

            access_token_lifetime: Duration::from_secs(parse_env("ACCESS_TOKEN_LIFETIME", 300u64)?),
            refresh_token_lifetime: Duration::from_secs(parse_env("REFRESH_TOKEN_LIFETIME", 86_400u64)?),
        })
    }
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "failed to parse",
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        // SAFETY: single-threaded test, no concurrent env mutation in this process.
        unsafe {
            for key in [
                "RATE_LIMIT_PER_HOUR",
                "ANOMALY_THRESHOLD",
                "ANOMALY_WEIGHT_PENALTY",
                "MIN_RATE_COUNT",
            ] {
                env::remove_var(key);
            }
        }

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.admission_policy.rate_limit_per_hour, 10_000);
        assert_eq!(cfg.anomaly_policy.min_rate_count, 10);
        assert_eq!(cfg.anomaly_policy.anomaly_threshold, 0.8);
        assert_eq!(cfg.anomaly_policy.anomaly_weight_penalty, 0.001);
    }
}
