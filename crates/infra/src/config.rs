//! Process configuration, read from the environment.

use anyhow::{Context, Result};

use guardian_observability::LogFormat;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_AUDIT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianConfig {
    /// Postgres DSN. `None` means the caller runs on in-memory adapters.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub audit_channel_capacity: usize,
    pub log_format: LogFormat,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            audit_channel_capacity: DEFAULT_AUDIT_CHANNEL_CAPACITY,
            log_format: LogFormat::default(),
        }
    }
}

impl GuardianConfig {
    /// Read `GUARDIAN_*` variables (falling back to `DATABASE_URL`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("GUARDIAN_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|url| !url.trim().is_empty());

        let db_max_connections = match lookup("GUARDIAN_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("GUARDIAN_DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'"))?,
            None => defaults.db_max_connections,
        };

        let audit_channel_capacity = match lookup("GUARDIAN_AUDIT_CHANNEL_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| {
                    format!("GUARDIAN_AUDIT_CHANNEL_CAPACITY must be a positive integer, got '{raw}'")
                })?,
            None => defaults.audit_channel_capacity,
        };

        let log_format = match lookup("GUARDIAN_LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(anyhow::Error::msg)
                .context("invalid GUARDIAN_LOG_FORMAT")?,
            None => defaults.log_format,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            audit_channel_capacity,
            log_format,
        })
    }

    /// Log the effective settings. Call once tracing is initialised.
    pub fn log_summary(&self) {
        if self.database_url.is_none() {
            tracing::warn!("GUARDIAN_DATABASE_URL not set; only in-memory adapters are available");
        }
        tracing::info!(
            db_max_connections = self.db_max_connections,
            audit_channel_capacity = self.audit_channel_capacity,
            log_format = ?self.log_format,
            "configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = GuardianConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GuardianConfig::default());
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn database_url_falls_back_to_generic_name() {
        let config = GuardianConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/app")])).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));

        let config = GuardianConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("GUARDIAN_DATABASE_URL", "postgres://localhost/guardian"),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/guardian"));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = GuardianConfig::from_lookup(lookup(&[("GUARDIAN_DB_MAX_CONNECTIONS", "zero")])).unwrap_err();
        assert!(err.to_string().contains("GUARDIAN_DB_MAX_CONNECTIONS"));

        let err = GuardianConfig::from_lookup(lookup(&[("GUARDIAN_LOG_FORMAT", "xml")])).unwrap_err();
        assert!(err.to_string().contains("GUARDIAN_LOG_FORMAT"));
    }

    #[test]
    fn pretty_logs_can_be_selected() {
        let config = GuardianConfig::from_lookup(lookup(&[("GUARDIAN_LOG_FORMAT", "pretty")])).unwrap();
        assert_eq!(config.log_format, LogFormat::Pretty);
    }
}
