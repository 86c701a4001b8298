use std::time::Duration;

use serde::Deserialize;

use crate::storage::MAX_ITEMS;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Postgres-backed store when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    /// Percent of quota above which oversized lists are trimmed.
    pub warning_threshold: f64,
    pub max_items_per_user: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12 * 60 * 60),
            warning_threshold: 80.0,
            max_items_per_user: MAX_ITEMS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub timeout: Duration,
}

pub const DEFAULT_TRANSLATOR_ENDPOINT: &str =
    "https://api.cognitive.microsofttranslator.com/translate?api-version=3.0";

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TRANSLATOR_ENDPOINT.into(),
            api_key: None,
            region: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub maintenance: MaintenanceConfig,
    pub translator: TranslatorConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage = StorageConfig {
            database_url: non_empty_var("DATABASE_URL"),
            quota_bytes: parsed_var("STORAGE_QUOTA_BYTES"),
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "clipkeep".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "clipkeep-users".into()),
            ttl_minutes: parsed_var("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: parsed_var("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };

        let defaults = MaintenanceConfig::default();
        let maintenance = MaintenanceConfig {
            interval: parsed_var("MAINTENANCE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            warning_threshold: parsed_var("STORAGE_WARNING_THRESHOLD")
                .unwrap_or(defaults.warning_threshold),
            max_items_per_user: parsed_var("MAX_ITEMS_PER_USER")
                .unwrap_or(defaults.max_items_per_user),
        };
        anyhow::ensure!(
            !maintenance.interval.is_zero(),
            "MAINTENANCE_INTERVAL_SECS must be positive"
        );
        anyhow::ensure!(
            maintenance.max_items_per_user > 0,
            "MAX_ITEMS_PER_USER must be positive"
        );

        let translator = TranslatorConfig {
            endpoint: non_empty_var("TRANSLATOR_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_TRANSLATOR_ENDPOINT.into()),
            api_key: non_empty_var("TRANSLATOR_API_KEY"),
            region: non_empty_var("TRANSLATOR_REGION"),
            timeout: parsed_var("TRANSLATOR_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or_else(|| TranslatorConfig::default().timeout),
        };

        Ok(Self {
            storage,
            jwt,
            maintenance,
            translator,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_defaults() {
        let cfg = MaintenanceConfig::default();
        assert_eq!(cfg.interval, Duration::from_secs(43_200));
        assert_eq!(cfg.warning_threshold, 80.0);
        assert_eq!(cfg.max_items_per_user, 1000);
    }

    #[test]
    fn translator_defaults_have_no_credentials() {
        let cfg = TranslatorConfig::default();
        assert!(cfg.api_key.is_none());
        assert!(cfg.region.is_none());
        assert!(cfg.endpoint.starts_with("https://"));
    }

    #[test]
    fn parsed_var_ignores_garbage() {
        std::env::set_var("CLIPKEEP_TEST_PARSED_VAR", "not-a-number");
        assert_eq!(parsed_var::<u64>("CLIPKEEP_TEST_PARSED_VAR"), None);
        std::env::set_var("CLIPKEEP_TEST_PARSED_VAR", " 42 ");
        assert_eq!(parsed_var::<u64>("CLIPKEEP_TEST_PARSED_VAR"), Some(42));
    }
}
