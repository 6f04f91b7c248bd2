//! Harness configuration loaded from `E2E_*` environment variables.
//!
//! Every value has a default matching the local docker-compose deployment, so
//! a bare `cargo test` against a stack started with the repository's compose
//! file needs no configuration at all.

use crate::reset::{self, DEFAULT_TABLES};
use crate::stores::Store;
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";
pub const DEFAULT_DISCOVERY_URL: &str = "http://localhost:8761";
pub const DEFAULT_COMPOSE_COMMAND: &str = "docker-compose";
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DEFAULT_CONFIG_SERVER_SERVICE: &str = "config-server";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_USER: &str = "itmouser";
pub const DEFAULT_DB_PASSWORD: &str = "itmopassword";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },

    #[error("Invalid URL in {var}: {url} (expected http:// or https://)")]
    InvalidUrl { var: String, url: String },

    #[error("Invalid table name in E2E_TRUNCATE_TABLES: {0:?}")]
    InvalidTable(String),
}

/// Connection parameters for one backing store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: SecretString,
}

/// Connection parameters for all four bounded-context stores.
#[derive(Debug, Clone)]
pub struct StoreConfigs {
    pub user: StoreConfig,
    pub product: StoreConfig,
    pub order: StoreConfig,
    pub moderation: StoreConfig,
}

impl StoreConfigs {
    pub fn get(&self, store: Store) -> &StoreConfig {
        match store {
            Store::User => &self.user,
            Store::Product => &self.product,
            Store::Order => &self.order,
            Store::Moderation => &self.moderation,
        }
    }
}

/// Configuration service brought up ahead of everything else in a staged
/// bring-up.
#[derive(Debug, Clone)]
pub struct ConfigServer {
    /// Base URL, e.g. `http://localhost:8888`.
    pub url: String,
    /// Compose service name started on its own first.
    pub service: String,
}

/// Polling interval and per-probe deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimings {
    pub interval: Duration,
    pub request_timeout: Duration,
    pub config_server_deadline: Duration,
    pub discovery_deadline: Duration,
    pub gateway_deadline: Duration,
    pub service_deadline: Duration,
}

impl Default for ProbeTimings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            config_server_deadline: Duration::from_secs(180),
            discovery_deadline: Duration::from_secs(180),
            gateway_deadline: Duration::from_secs(240),
            service_deadline: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Compose program plus any leading arguments (`docker compose` splits
    /// into `["docker", "compose"]`).
    pub compose_command: Vec<String>,
    pub compose_file: PathBuf,
    pub gateway_url: String,
    pub discovery_url: String,
    pub config_server: Option<ConfigServer>,
    pub stores: StoreConfigs,
    pub probes: ProbeTimings,
    pub truncate_tables: Vec<String>,
}

impl HarnessConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let compose_command: Vec<String> = vars
            .get("E2E_COMPOSE_COMMAND")
            .map(String::as_str)
            .unwrap_or(DEFAULT_COMPOSE_COMMAND)
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if compose_command.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "E2E_COMPOSE_COMMAND".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let compose_file = PathBuf::from(
            vars.get("E2E_COMPOSE_FILE")
                .map(String::as_str)
                .unwrap_or(DEFAULT_COMPOSE_FILE),
        );

        let gateway_url = url_var(vars, "E2E_GATEWAY_URL", DEFAULT_GATEWAY_URL)?;
        let discovery_url = url_var(vars, "E2E_DISCOVERY_URL", DEFAULT_DISCOVERY_URL)?;

        let config_server = match vars.get("E2E_CONFIG_SERVER_URL") {
            Some(_) => Some(ConfigServer {
                url: url_var(vars, "E2E_CONFIG_SERVER_URL", "")?,
                service: vars
                    .get("E2E_CONFIG_SERVER_SERVICE")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_CONFIG_SERVER_SERVICE.to_string()),
            }),
            None => None,
        };

        let host = vars
            .get("E2E_DB_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DB_HOST.to_string());
        let username = vars
            .get("E2E_DB_USER")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DB_USER.to_string());
        let password = vars
            .get("E2E_DB_PASSWORD")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DB_PASSWORD.to_string());

        let store = |prefix: &str, port: u16, database: &str| -> Result<StoreConfig, ConfigError> {
            Ok(StoreConfig {
                host: host.clone(),
                port: parse_var(vars, &format!("E2E_{prefix}_DB_PORT"), port)?,
                database: vars
                    .get(&format!("E2E_{prefix}_DB_NAME"))
                    .cloned()
                    .unwrap_or_else(|| database.to_string()),
                username: username.clone(),
                password: SecretString::from(password.clone()),
            })
        };

        let stores = StoreConfigs {
            user: store("USER", 5401, "itmomarket_user")?,
            product: store("PRODUCT", 5402, "itmomarket_product")?,
            order: store("ORDER", 5403, "itmomarket_order")?,
            moderation: store("MODERATION", 5404, "itmomarket_moderation")?,
        };

        let defaults = ProbeTimings::default();
        let probes = ProbeTimings {
            interval: secs_var(vars, "E2E_PROBE_INTERVAL_SECS", defaults.interval)?,
            request_timeout: secs_var(
                vars,
                "E2E_PROBE_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            config_server_deadline: secs_var(
                vars,
                "E2E_CONFIG_SERVER_DEADLINE_SECS",
                defaults.config_server_deadline,
            )?,
            discovery_deadline: secs_var(
                vars,
                "E2E_DISCOVERY_DEADLINE_SECS",
                defaults.discovery_deadline,
            )?,
            gateway_deadline: secs_var(vars, "E2E_GATEWAY_DEADLINE_SECS", defaults.gateway_deadline)?,
            service_deadline: secs_var(vars, "E2E_SERVICE_DEADLINE_SECS", defaults.service_deadline)?,
        };

        let truncate_tables = match vars.get("E2E_TRUNCATE_TABLES") {
            Some(list) => {
                let tables: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if let Some(bad) = tables.iter().find(|t| !reset::is_valid_identifier(t)) {
                    return Err(ConfigError::InvalidTable(bad.clone()));
                }
                if tables.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        var: "E2E_TRUNCATE_TABLES".to_string(),
                        reason: "must name at least one table".to_string(),
                    });
                }
                tables
            }
            None => DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
        };

        Ok(HarnessConfig {
            compose_command,
            compose_file,
            gateway_url,
            discovery_url,
            config_server,
            stores,
            probes,
            truncate_tables,
        })
    }
}

fn url_var(
    vars: &HashMap<String, String>,
    var: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let url = vars.get(var).map(String::as_str).unwrap_or(default);

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl {
            var: var.to_string(),
            url: url.to_string(),
        });
    }

    Ok(url.trim_end_matches('/').to_string())
}

fn parse_var<T>(vars: &HashMap<String, String>, var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn secs_var(
    vars: &HashMap<String, String>,
    var: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_var(vars, var, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_local_deployment() {
        let config = HarnessConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.compose_command, vec!["docker-compose"]);
        assert_eq!(config.compose_file, PathBuf::from("docker-compose.yml"));
        assert_eq!(config.gateway_url, "http://localhost:8080");
        assert_eq!(config.discovery_url, "http://localhost:8761");
        assert!(config.config_server.is_none());

        assert_eq!(config.stores.user.port, 5401);
        assert_eq!(config.stores.product.port, 5402);
        assert_eq!(config.stores.order.port, 5403);
        assert_eq!(config.stores.moderation.port, 5404);
        assert_eq!(config.stores.order.database, "itmomarket_order");
        assert_eq!(config.stores.user.username, "itmouser");
        assert_eq!(config.stores.user.password.expose_secret(), "itmopassword");

        assert_eq!(config.probes, ProbeTimings::default());
        assert_eq!(config.truncate_tables.len(), DEFAULT_TABLES.len());
    }

    #[test]
    fn test_overrides() {
        let config = HarnessConfig::from_vars(&vars(&[
            ("E2E_COMPOSE_COMMAND", "docker compose"),
            ("E2E_GATEWAY_URL", "http://gateway:9000/"),
            ("E2E_CONFIG_SERVER_URL", "http://localhost:8888"),
            ("E2E_DB_HOST", "db.internal"),
            ("E2E_ORDER_DB_PORT", "6403"),
            ("E2E_ORDER_DB_NAME", "orders_ci"),
            ("E2E_PROBE_INTERVAL_SECS", "1"),
            ("E2E_TRUNCATE_TABLES", "cart_items, carts ,orders"),
        ]))
        .unwrap();

        assert_eq!(config.compose_command, vec!["docker", "compose"]);
        // Trailing slash is stripped so paths can be appended directly
        assert_eq!(config.gateway_url, "http://gateway:9000");

        let config_server = config.config_server.as_ref().unwrap();
        assert_eq!(config_server.url, "http://localhost:8888");
        assert_eq!(config_server.service, "config-server");

        assert_eq!(config.stores.order.host, "db.internal");
        assert_eq!(config.stores.order.port, 6403);
        assert_eq!(config.stores.order.database, "orders_ci");
        assert_eq!(config.stores.get(Store::User).host, "db.internal");

        assert_eq!(config.probes.interval, Duration::from_secs(1));
        assert_eq!(config.truncate_tables, vec!["cart_items", "carts", "orders"]);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = HarnessConfig::from_vars(&vars(&[("E2E_USER_DB_PORT", "not-a-port")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { var, .. }) if var == "E2E_USER_DB_PORT")
        );
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let result = HarnessConfig::from_vars(&vars(&[("E2E_GATEWAY_DEADLINE_SECS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = HarnessConfig::from_vars(&vars(&[("E2E_DISCOVERY_URL", "localhost:8761")]));
        assert!(matches!(result, Err(ConfigError::InvalidUrl { var, .. }) if var == "E2E_DISCOVERY_URL"));
    }

    #[test]
    fn test_truncate_table_identifiers_validated() {
        let result =
            HarnessConfig::from_vars(&vars(&[("E2E_TRUNCATE_TABLES", "orders; DROP TABLE users")]));
        assert!(matches!(result, Err(ConfigError::InvalidTable(_))));

        let result = HarnessConfig::from_vars(&vars(&[("E2E_TRUNCATE_TABLES", " , ")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_compose_command_rejected() {
        let result = HarnessConfig::from_vars(&vars(&[("E2E_COMPOSE_COMMAND", "  ")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
