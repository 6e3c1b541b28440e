//! Configuration loading and representation.
//!
//! Everything comes from environment variables; invalid values are errors, not
//! silent defaults.

use thiserror::Error;

use clinic_inventory::StockPolicy;
use clinic_records::DailySequence;

pub const ENV_STOCK_POLICY: &str = "CLINIC_STOCK_POLICY";
pub const ENV_CONFLICT_RETRIES: &str = "CLINIC_CONFLICT_RETRIES";
pub const ENV_RX_PREFIX: &str = "CLINIC_RX_PREFIX";
pub const ENV_MR_PREFIX: &str = "CLINIC_MR_PREFIX";
pub const ENV_USE_PERSISTENT_STORES: &str = "USE_PERSISTENT_STORES";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which storage backend the service should run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

/// Runtime configuration for the ledger service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub stock_policy: StockPolicy,
    /// How many times a change set that lost a version race is rebuilt and retried.
    pub conflict_retries: u32,
    pub prescription_codes: DailySequence,
    pub record_codes: DailySequence,
    pub backend: StoreBackend,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            stock_policy: StockPolicy::default(),
            conflict_retries: 3,
            prescription_codes: DailySequence::prescriptions(),
            record_codes: DailySequence::medical_records(),
            backend: StoreBackend::InMemory,
        }
    }
}

impl LedgerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = LedgerConfig::default();

        if let Some(value) = lookup(ENV_STOCK_POLICY) {
            config.stock_policy = value.parse().map_err(|e| ConfigError::Invalid {
                key: ENV_STOCK_POLICY,
                value: value.clone(),
                reason: format!("{e}"),
            })?;
        }

        if let Some(value) = lookup(ENV_CONFLICT_RETRIES) {
            config.conflict_retries = value.trim().parse().map_err(|e| ConfigError::Invalid {
                key: ENV_CONFLICT_RETRIES,
                value: value.clone(),
                reason: format!("{e}"),
            })?;
        }

        if let Some(value) = lookup(ENV_RX_PREFIX) {
            config.prescription_codes = sequence(ENV_RX_PREFIX, value)?;
        }
        if let Some(value) = lookup(ENV_MR_PREFIX) {
            config.record_codes = sequence(ENV_MR_PREFIX, value)?;
        }
        if config.prescription_codes == config.record_codes {
            return Err(ConfigError::Invalid {
                key: ENV_MR_PREFIX,
                value: config.record_codes.prefix().to_string(),
                reason: "prescription and record prefixes must differ".to_string(),
            });
        }

        let persistent = lookup(ENV_USE_PERSISTENT_STORES)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        if persistent {
            let database_url = lookup(ENV_DATABASE_URL).ok_or(ConfigError::Missing {
                key: ENV_DATABASE_URL,
            })?;
            config.backend = StoreBackend::Postgres { database_url };
        }

        Ok(config)
    }
}

fn sequence(key: &'static str, value: String) -> Result<DailySequence, ConfigError> {
    DailySequence::new(value.trim()).map_err(|e| ConfigError::Invalid {
        key,
        value,
        reason: format!("{e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.stock_policy, StockPolicy::RejectNegative);
        assert_eq!(config.backend, StoreBackend::InMemory);
    }

    #[test]
    fn reads_every_key() {
        let config = load(&[
            (ENV_STOCK_POLICY, "allow-negative"),
            (ENV_CONFLICT_RETRIES, "7"),
            (ENV_RX_PREFIX, "RSP"),
            (ENV_MR_PREFIX, "RM"),
            (ENV_USE_PERSISTENT_STORES, "true"),
            (ENV_DATABASE_URL, "postgres://clinic@localhost/clinic"),
        ])
        .unwrap();

        assert_eq!(config.stock_policy, StockPolicy::AllowNegative);
        assert_eq!(config.conflict_retries, 7);
        assert_eq!(config.prescription_codes.prefix(), "RSP");
        assert_eq!(config.record_codes.prefix(), "RM");
        assert_eq!(
            config.backend,
            StoreBackend::Postgres {
                database_url: "postgres://clinic@localhost/clinic".to_string()
            }
        );
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            load(&[(ENV_STOCK_POLICY, "maybe")]),
            Err(ConfigError::Invalid { key: ENV_STOCK_POLICY, .. })
        ));
        assert!(matches!(
            load(&[(ENV_CONFLICT_RETRIES, "-1")]),
            Err(ConfigError::Invalid { key: ENV_CONFLICT_RETRIES, .. })
        ));
        assert!(load(&[(ENV_RX_PREFIX, "R-X")]).is_err());
        assert!(load(&[(ENV_RX_PREFIX, "MR")]).is_err());
        assert_eq!(
            load(&[(ENV_USE_PERSISTENT_STORES, "true")]),
            Err(ConfigError::Missing { key: ENV_DATABASE_URL })
        );
    }
}
