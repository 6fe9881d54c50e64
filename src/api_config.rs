//! # Catalog API Configuration Module
//!
//! This module defines configuration structures for talking to the catalog
//! API, including recovery settings and the limits that bound a filtered scan.

use std::time::Duration;

// Constants for catalog API configuration
pub const DEFAULT_BASE_URL: &str = "https://analisis.datosabiertos.jcyl.es";
pub const DEFAULT_LANGUAGE: &str = "es";
pub const DEFAULT_ORDER_BY: &str = "-metadata_processed";
pub const DEFAULT_USER_AGENT: &str = concat!("jcyl-bot/", env!("CARGO_PKG_VERSION"));
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Largest page size the upstream listing serves reliably
pub const UPSTREAM_PAGE_SIZE: usize = 100;
/// Upstream offset at which a filtered scan gives up
pub const SCAN_SAFETY_CEILING: usize = 1000;
/// Datasets shown per page when the caller does not choose a size
pub const DEFAULT_DATASETS_PER_PAGE: usize = 10;
/// Identifiers longer than this are dropped at ingestion
pub const MAX_DATASET_ID_LEN: usize = 200;

/// Recovery configuration for upstream error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts after the first request
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 500,  // 0.5 seconds
            max_retry_delay_ms: 8000,  // 8 seconds
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

impl RecoveryConfig {
    /// Exponential backoff for the given attempt (0-based), capped, before jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }
}

/// Bounds for the client-side filtered scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Records requested per upstream call
    pub page_size: usize,
    /// Upstream offset at which scanning stops regardless of demand
    pub safety_ceiling: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            page_size: UPSTREAM_PAGE_SIZE,
            safety_ceiling: SCAN_SAFETY_CEILING,
        }
    }
}

/// Configuration structure for the catalog client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Scheme and host of the catalog, without a trailing path
    pub base_url: String,
    /// Language passed as `lang` on every request
    pub language: String,
    /// Connection-level timeout
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Page size of listings built with `SearchAggregator::query`
    pub datasets_per_page: usize,
    pub scan: ScanLimits,
    pub recovery: RecoveryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout_secs: REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            datasets_per_page: DEFAULT_DATASETS_PER_PAGE,
            scan: ScanLimits::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}
