//! Catalog API client.
//!
//! Typed operations over the Explore API v2.1 endpoints. Every public
//! operation absorbs upstream failures: the error is logged with context and
//! the caller gets an empty or absent result.

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::api_config::ApiConfig;
use crate::api_errors::ApiError;
use crate::dataset_model::{
    parse_attachments, parse_exports, parse_facets, Attachment, Dataset, ExportFormat, Facet,
};

use super::transport::{CatalogTransport, HttpTransport, QueryParams};

/// Path prefix of every catalog endpoint
pub const CATALOG_PATH: &str = "/api/explore/v2.1/catalog";
pub const THEME_FACET: &str = "default.theme";
pub const KEYWORD_FACET: &str = "default.keyword";

/// One raw page of the upstream dataset listing
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    /// Records that parsed and passed the identifier check, in upstream order
    pub datasets: Vec<Dataset>,
    /// Number of records upstream returned, before any filtering
    pub raw_len: usize,
    /// Upstream `total_count` for the (unfiltered) listing
    pub total_count: u64,
}

/// Client for the catalog API
pub struct CatalogClient<T> {
    transport: T,
    config: ApiConfig,
}

impl CatalogClient<HttpTransport> {
    /// Client over the real HTTP transport
    pub fn from_config(config: ApiConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: CatalogTransport> CatalogClient<T> {
    pub fn new(transport: T, config: ApiConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn lang_param(&self) -> (String, String) {
        ("lang".to_string(), self.config.language.clone())
    }

    /// Fetch one page of the dataset listing
    ///
    /// Records that fail to parse are skipped with a warning; records with an
    /// empty or over-long identifier are dropped silently.
    pub async fn fetch_dataset_batch(
        &self,
        limit: usize,
        offset: usize,
        order_by: &str,
        keyword: Option<&str>,
    ) -> Result<RawBatch, ApiError> {
        let mut params: QueryParams = vec![
            self.lang_param(),
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
            ("order_by".to_string(), order_by.to_string()),
        ];
        if let Some(keyword) = keyword {
            params.push(("refine.default.keyword".to_string(), keyword.to_string()));
        }

        let data = self
            .transport
            .get_json(&format!("{CATALOG_PATH}/datasets"), &params)
            .await?;
        if !data.is_object() {
            return Err(ApiError::parse("dataset listing is not an object"));
        }

        let total_count = data.get("total_count").and_then(Value::as_u64).unwrap_or(0);
        let results = data
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut datasets = Vec::with_capacity(results.len());
        for raw in results {
            match Dataset::from_api(raw) {
                Ok(dataset) if dataset.has_valid_id() => datasets.push(dataset),
                Ok(dataset) => {
                    debug!(dataset_id = %dataset.dataset_id, "Dropping dataset with invalid identifier");
                }
                Err(e) => warn!(error = %e, offset, "Skipping dataset due to parsing error"),
            }
        }

        Ok(RawBatch {
            datasets,
            raw_len: results.len(),
            total_count,
        })
    }

    /// Values of one catalog facet, optionally refined by other facets
    pub async fn get_catalog_facets(&self, facet: &str, refine: &[(&str, &str)]) -> Vec<Facet> {
        let mut params: QueryParams = vec![("facet".to_string(), facet.to_string()), self.lang_param()];
        for (key, value) in refine {
            params.push((format!("refine.{key}"), value.to_string()));
        }

        match self
            .transport
            .get_json(&format!("{CATALOG_PATH}/facets"), &params)
            .await
        {
            Ok(data) => parse_facets(&data, facet),
            Err(e) => {
                error!(facet = %facet, error = %e, "Error getting facets");
                Vec::new()
            }
        }
    }

    /// Theme facets with the counts upstream reports
    pub async fn get_themes(&self) -> Vec<Facet> {
        self.get_catalog_facets(THEME_FACET, &[]).await
    }

    pub async fn get_keywords(&self, theme: Option<&str>) -> Vec<Facet> {
        match theme {
            Some(theme) => self.get_catalog_facets(KEYWORD_FACET, &[(THEME_FACET, theme)]).await,
            None => self.get_catalog_facets(KEYWORD_FACET, &[]).await,
        }
    }

    /// Full metadata of one dataset, `None` when missing or unreachable
    pub async fn get_dataset_info(&self, dataset_id: &str) -> Option<Dataset> {
        let params = vec![self.lang_param()];
        let result = self
            .transport
            .get_json(&format!("{CATALOG_PATH}/datasets/{dataset_id}"), &params)
            .await
            .and_then(|data| Dataset::from_api(&data));

        match result {
            Ok(dataset) if dataset.has_valid_id() => Some(dataset),
            Ok(_) => {
                warn!(dataset_id = %dataset_id, "Dataset detail has an invalid identifier");
                None
            }
            Err(ApiError::NotFound(_)) => {
                warn!(dataset_id = %dataset_id, "Dataset not found");
                None
            }
            Err(e) => {
                error!(dataset_id = %dataset_id, error = %e, "Error getting dataset");
                None
            }
        }
    }

    /// Export formats of a dataset, in upstream order, duplicates kept
    pub async fn get_dataset_exports(&self, dataset_id: &str) -> Vec<ExportFormat> {
        match self
            .transport
            .get_json(&format!("{CATALOG_PATH}/datasets/{dataset_id}/exports"), &QueryParams::new())
            .await
        {
            Ok(data) => parse_exports(&data),
            Err(e) => {
                error!(dataset_id = %dataset_id, error = %e, "Error getting exports");
                Vec::new()
            }
        }
    }

    pub async fn get_dataset_attachments(&self, dataset_id: &str) -> Vec<Attachment> {
        match self
            .transport
            .get_json(
                &format!("{CATALOG_PATH}/datasets/{dataset_id}/attachments"),
                &QueryParams::new(),
            )
            .await
        {
            Ok(data) => parse_attachments(&data),
            Err(e) => {
                error!(dataset_id = %dataset_id, error = %e, "Error getting attachments");
                Vec::new()
            }
        }
    }

    /// Live record count from the records endpoint, 0 on failure
    pub async fn get_dataset_records_count(&self, dataset_id: &str) -> u64 {
        let params = vec![
            ("limit".to_string(), "0".to_string()),
            ("select".to_string(), "count(*)".to_string()),
        ];
        match self
            .transport
            .get_json(&format!("{CATALOG_PATH}/datasets/{dataset_id}/records"), &params)
            .await
        {
            Ok(data) => data.get("total_count").and_then(Value::as_u64).unwrap_or(0),
            Err(e) => {
                error!(dataset_id = %dataset_id, error = %e, "Error getting records count");
                0
            }
        }
    }

    /// Public catalog page of a dataset
    pub fn dataset_web_url(&self, dataset_id: &str) -> String {
        format!(
            "{}/explore/dataset/{}",
            self.config.base_url.trim_end_matches('/'),
            dataset_id
        )
    }

    /// Download an export into a temporary file
    pub async fn download_export(&self, export: &ExportFormat) -> Option<NamedTempFile> {
        match self.transport.download(&export.url).await {
            Ok(file) => Some(file),
            Err(e) => {
                error!(format = %export.format, url = %export.url, error = %e, "Failed to download export");
                None
            }
        }
    }
}
