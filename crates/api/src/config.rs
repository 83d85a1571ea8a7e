//! Process configuration from environment variables.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `BIND_ADDR` | `0.0.0.0:8080` | listen address |
//! | `USE_PERSISTENT_STORES` | `false` | `true` selects Postgres |
//! | `DATABASE_URL` | none | required when persistent |
//! | `DB_MAX_CONNECTIONS` | `10` | Postgres pool size |
//! | `LOG_FORMAT` | `json` | `json` or `pretty` |

use std::net::SocketAddr;

use anyhow::{Context, bail};

use forgemrp_observability::LogFormat;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreConfig::InMemory,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Malformed values are errors, never silently
    /// replaced by defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:8080")?;

        let persistent = match lookup("USE_PERSISTENT_STORES") {
            None => false,
            Some(raw) => parse_bool(&raw).context("USE_PERSISTENT_STORES must be true or false")?,
        };

        let store = if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
            let max_connections = match lookup("DB_MAX_CONNECTIONS") {
                None => DEFAULT_MAX_CONNECTIONS,
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            };
            StoreConfig::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StoreConfig::InMemory
        };

        let log_format = match lookup("LOG_FORMAT") {
            None => LogFormat::Json,
            Some(raw) => raw.parse::<LogFormat>().map_err(anyhow::Error::msg)?,
        };

        Ok(Self {
            bind_addr,
            store,
            log_format,
        })
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => bail!("not a boolean: '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory_on_8080() {
        assert_eq!(from(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn persistent_requires_database_url() {
        let err = from(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn persistent_with_pool_size() {
        let cfg = from(&[
            ("USE_PERSISTENT_STORES", "TRUE"),
            ("DATABASE_URL", "postgres://localhost/mrp"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            cfg.store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/mrp".into(),
                max_connections: 4,
            }
        );
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(from(&[("USE_PERSISTENT_STORES", "maybe")]).is_err());
        assert!(from(&[("BIND_ADDR", "nope")]).is_err());
        assert!(from(&[("LOG_FORMAT", "xml")]).is_err());
        assert!(
            from(&[
                ("USE_PERSISTENT_STORES", "true"),
                ("DATABASE_URL", "postgres://x"),
                ("DB_MAX_CONNECTIONS", "0"),
            ])
            .is_err()
        );
    }
}
