//! Portal configuration
//!
//! Read from the environment (after `dotenvy` has loaded any `.env` file).
//! Every setting has a default so a bare `gea_portal serve` runs against the
//! in-memory store.

use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cpd::DEFAULT_REQUIRED_HOURS;
use crate::workflow::DEFAULT_MAX_UPLOAD_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

#[cfg(feature = "database")]
impl DatabaseConfig {
    /// Open the Postgres pool
    pub async fn connect(&self) -> Result<sqlx::PgPool, sqlx::Error> {
        tracing::info!(
            url = %mask_database_url(&self.database_url),
            max_connections = self.max_connections,
            "Connecting to database"
        );
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connection_timeout)
            .idle_timeout(Some(Duration::from_secs(600)))
            .max_lifetime(Some(Duration::from_secs(1800)))
            .connect(&self.database_url)
            .await
    }
}

/// Administrator accounts created at startup when missing
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub enabled: bool,
    pub admin_username: String,
    pub admin_email: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_username: "gea_admin".to_string(),
            admin_email: "admin@gea.local".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// `None` selects the in-memory store
    pub database: Option<DatabaseConfig>,
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cpd_required_hours: Decimal,
    pub reminder_interval: Duration,
    /// HTTP mail relay; emails are only logged when unset
    pub email_relay_url: Option<String>,
    pub bootstrap: BootstrapConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cpd_required_hours: Decimal::from(DEFAULT_REQUIRED_HOURS),
            reminder_interval: Duration::from_secs(86_400),
            email_relay_url: None,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                database_url: url,
                max_connections: parse(&get, "DATABASE_POOL_SIZE")?.unwrap_or(10),
                connection_timeout: Duration::from_secs(30),
            }),
            None => None,
        };

        let bootstrap = BootstrapConfig {
            enabled: match get("PORTAL_BOOTSTRAP") {
                Some(v) => parse_bool("PORTAL_BOOTSTRAP", &v)?,
                None => true,
            },
            admin_username: get("PORTAL_ADMIN_USERNAME")
                .unwrap_or(defaults.bootstrap.admin_username),
            admin_email: get("PORTAL_ADMIN_EMAIL").unwrap_or(defaults.bootstrap.admin_email),
        };

        let cpd_required_hours: Decimal =
            parse(&get, "PORTAL_CPD_REQUIRED_HOURS")?.unwrap_or(defaults.cpd_required_hours);
        if cpd_required_hours <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "PORTAL_CPD_REQUIRED_HOURS",
                value: cpd_required_hours.to_string(),
                reason: "must be positive".into(),
            });
        }

        let reminder_interval = parse::<u64>(&get, "PORTAL_REMINDER_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.reminder_interval);
        if reminder_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "PORTAL_REMINDER_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least one second".into(),
            });
        }

        Ok(Self {
            database,
            bind_addr: parse(&get, "PORTAL_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            upload_dir: get("PORTAL_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse(&get, "PORTAL_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            cpd_required_hours,
            reminder_interval,
            email_relay_url: match get("PORTAL_EMAIL_RELAY_URL") {
                Some(v) => {
                    url::Url::parse(&v).map_err(|e| ConfigError::Invalid {
                        key: "PORTAL_EMAIL_RELAY_URL",
                        reason: e.to_string(),
                        value: v.clone(),
                    })?;
                    Some(v)
                }
                None => None,
            },
            bootstrap,
        })
    }
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

/// Hide the password in a connection URL before logging it
pub fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        // Unparseable: keep only the ends
        Err(_) => {
            let chars: Vec<char> = url.chars().collect();
            if chars.len() > 20 {
                let head: String = chars[..10].iter().collect();
                let tail: String = chars[chars.len() - 10..].iter().collect();
                format!("{}***{}", head, tail)
            } else {
                "***".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<PortalConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PortalConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.database.is_none());
        assert_eq!(cfg.bind_addr.port(), 5001);
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.cpd_required_hours, Decimal::from(60));
        assert!(cfg.bootstrap.enabled);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://portal:secret@db:5432/portal"),
            ("DATABASE_POOL_SIZE", "4"),
            ("PORTAL_BOOTSTRAP", "false"),
            ("PORTAL_REMINDER_INTERVAL_SECS", "60"),
            ("PORTAL_CPD_REQUIRED_HOURS", "40.5"),
        ])
        .unwrap();
        assert_eq!(cfg.database.as_ref().unwrap().max_connections, 4);
        assert!(!cfg.bootstrap.enabled);
        assert_eq!(cfg.reminder_interval, Duration::from_secs(60));
        assert_eq!(cfg.cpd_required_hours, Decimal::new(405, 1));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = config(&[("PORTAL_MAX_UPLOAD_BYTES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("PORTAL_MAX_UPLOAD_BYTES"));
        assert!(config(&[("PORTAL_BOOTSTRAP", "maybe")]).is_err());
        assert!(config(&[("PORTAL_CPD_REQUIRED_HOURS", "0")]).is_err());
        assert!(config(&[("PORTAL_REMINDER_INTERVAL_SECS", "0")]).is_err());
        assert!(config(&[("PORTAL_EMAIL_RELAY_URL", "relay.local/send")]).is_err());
        assert!(config(&[("PORTAL_EMAIL_RELAY_URL", "http://relay.local/send")]).is_ok());
    }

    #[test]
    fn test_mask_database_url() {
        assert_eq!(
            mask_database_url("postgres://portal:secret@db:5432/portal"),
            "postgres://portal:***@db:5432/portal"
        );
        assert_eq!(
            mask_database_url("postgres://db/portal"),
            "postgres://db/portal"
        );
    }

    #[test]
    fn test_mask_database_url_keeps_query_at_sign() {
        assert_eq!(
            mask_database_url("postgres://db:5432/portal?application_name=ops@night"),
            "postgres://db:5432/portal?application_name=ops@night"
        );
        assert_eq!(
            mask_database_url("postgres://portal:s3cr3t@db:5432/portal?application_name=ops@night"),
            "postgres://portal:***@db:5432/portal?application_name=ops@night"
        );
        assert_eq!(mask_database_url("not a url"), "***");
    }
}
