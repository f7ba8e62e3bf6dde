//! Environment-driven configuration, read once at startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Bound for acquiring a connection and for each statement.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `Some` when `USE_PERSISTENT_STORES=true`.
    pub database: Option<DatabaseConfig>,
    pub seed_catalog: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map instead of the process env).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 3000u16)?;
        let use_persistent = parse_bool_or(&lookup, "USE_PERSISTENT_STORES", false)?;
        let seed_catalog = parse_bool_or(&lookup, "SEED_CATALOG", true)?;

        let database = if use_persistent {
            let url = lookup("DATABASE_URL")
                .filter(|u| !u.trim().is_empty())
                .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
            let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10u32)?;
            if max_connections == 0 {
                bail!("DB_MAX_CONNECTIONS must be at least 1");
            }
            let timeout_secs = parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 5u64)?;
            Some(DatabaseConfig {
                url,
                max_connections,
                timeout: Duration::from_secs(timeout_secs.max(1)),
            })
        } else {
            None
        };

        Ok(Self {
            host,
            port,
            database,
            seed_catalog,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("HOST/PORT do not form a socket address: {}:{}", self.host, self.port))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> anyhow::Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(false),
        Some(v) => bail!("invalid value for {key}: {v:?} (expected true or false)"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_use_in_memory_stores() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert!(cfg.database.is_none());
        assert!(cfg.seed_catalog);
        assert_eq!(cfg.bind_addr().unwrap().port(), 3000);
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        let err = config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/lessons"),
            ("DB_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        let db = cfg.database.unwrap();
        assert_eq!(db.max_connections, 4);
        assert_eq!(db.timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = config(&[("SEED_CATALOG", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("SEED_CATALOG"));
    }
}
