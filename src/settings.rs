//! Service settings read from the environment.
//!
//! `main` loads a `.env` file with `dotenv` first, so every value can come
//! from either place.

use std::env;

use anyhow::{Context, Result};

use crate::api_config::{ApiConfig, DEFAULT_BASE_URL, DEFAULT_DATASETS_PER_PAGE};

pub const DEFAULT_CHECK_INTERVAL_HOURS: u64 = 2;

#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram_bot_token: String,
    pub database_url: String,
    pub jcyl_api_base_url: String,
    pub alerts_enabled: bool,
    pub alerts_check_interval_hours: u64,
    pub datasets_per_page: usize,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{key} must be set"))
        };

        Ok(Self {
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            jcyl_api_base_url: lookup("JCYL_API_BASE_URL")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            alerts_enabled: match lookup("ALERTS_ENABLED") {
                Some(value) => parse_bool(&value)
                    .with_context(|| format!("ALERTS_ENABLED is not a boolean: {value}"))?,
                None => true,
            },
            alerts_check_interval_hours: parse_or(
                &lookup,
                "ALERTS_CHECK_INTERVAL_HOURS",
                DEFAULT_CHECK_INTERVAL_HOURS,
            )?,
            datasets_per_page: parse_or(&lookup, "DATASETS_PER_PAGE", DEFAULT_DATASETS_PER_PAGE)?,
        })
    }

    /// Catalog client configuration for these settings
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            datasets_per_page: self.datasets_per_page.max(1),
            ..ApiConfig::with_base_url(self.jcyl_api_base_url.clone())
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {value}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let settings = Settings::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("DATABASE_URL", "postgres://localhost/jcyl"),
        ]))?;

        assert_eq!(settings.jcyl_api_base_url, DEFAULT_BASE_URL);
        assert!(settings.alerts_enabled);
        assert_eq!(settings.alerts_check_interval_hours, 2);
        assert_eq!(settings.datasets_per_page, 10);
        assert_eq!(settings.api_config().base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.api_config().datasets_per_page, 10);
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<()> {
        let settings = Settings::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("DATABASE_URL", "postgres://localhost/jcyl"),
            ("JCYL_API_BASE_URL", "http://localhost:8080"),
            ("ALERTS_ENABLED", "false"),
            ("ALERTS_CHECK_INTERVAL_HOURS", "6"),
            ("DATASETS_PER_PAGE", " 5 "),
        ]))?;

        assert_eq!(settings.jcyl_api_base_url, "http://localhost:8080");
        assert!(!settings.alerts_enabled);
        assert_eq!(settings.alerts_check_interval_hours, 6);
        assert_eq!(settings.datasets_per_page, 5);
        assert_eq!(settings.api_config().datasets_per_page, 5);
        assert_eq!(settings.api_config().base_url, "http://localhost:8080");
        Ok(())
    }

    #[test]
    fn test_missing_or_invalid_values() {
        let err = Settings::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")]))
            .unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));

        let err = Settings::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DATABASE_URL", "postgres://x"),
            ("ALERTS_CHECK_INTERVAL_HOURS", "often"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ALERTS_CHECK_INTERVAL_HOURS"));

        assert!(Settings::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DATABASE_URL", "postgres://x"),
            ("ALERTS_ENABLED", "maybe"),
        ]))
        .is_err());
    }
}
