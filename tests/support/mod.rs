//! In-memory stand-ins for the catalog API and the chat notifier.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jcyl_bot::alerts::{Notifier, NotifyReport, SubscriptionKind, SubscriptionSource};
use jcyl_bot::api_config::ApiConfig;
use jcyl_bot::api_errors::ApiError;
use jcyl_bot::catalog::{
    CatalogClient, CatalogTransport, QueryParams, SearchAggregator, TotalCache, CATALOG_PATH,
};
use serde_json::{json, Value};
use tempfile::NamedTempFile;

#[derive(Default)]
struct CatalogState {
    datasets: Vec<Value>,
    documents: HashMap<String, Value>,
    downloads: HashMap<String, Vec<u8>>,
    fail_listing_from: Option<usize>,
    requests: Vec<(String, QueryParams)>,
}

/// Fake catalog serving a fixed list of dataset documents
///
/// The listing endpoint pages over the corpus in insertion order and
/// honours `refine.default.keyword`. Other paths are served from explicitly
/// registered documents; a dataset detail falls back to the corpus entry.
#[derive(Clone, Default)]
pub struct FakeCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datasets(datasets: Vec<Value>) -> Self {
        let catalog = Self::new();
        catalog.state.lock().unwrap().datasets = datasets;
        catalog
    }

    pub fn push_dataset(&self, dataset: Value) {
        self.state.lock().unwrap().datasets.push(dataset);
    }

    pub fn replace_dataset(&self, dataset: Value) {
        let mut state = self.state.lock().unwrap();
        let id = dataset["dataset_id"].clone();
        if let Some(slot) = state.datasets.iter_mut().find(|d| d["dataset_id"] == id) {
            *slot = dataset;
        }
    }

    /// Serve `document` for `path` below the catalog prefix
    pub fn insert_document(&self, path: &str, document: Value) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(format!("{CATALOG_PATH}{path}"), document);
    }

    pub fn insert_download(&self, url: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .downloads
            .insert(url.to_string(), bytes.to_vec());
    }

    /// Make listing requests at or past `offset` fail with a 503
    pub fn fail_listing_from(&self, offset: usize) {
        self.state.lock().unwrap().fail_listing_from = Some(offset);
    }

    pub fn clear_listing_failure(&self) {
        self.state.lock().unwrap().fail_listing_from = None;
    }

    pub fn listing_offsets(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(path, _)| path == &format!("{CATALOG_PATH}/datasets"))
            .filter_map(|(_, params)| param(params, "offset").and_then(|o| o.parse().ok()))
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

fn param<'a>(params: &'a QueryParams, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn has_keyword(dataset: &Value, keyword: &str) -> bool {
    dataset["metas"]["default"]["keyword"]
        .as_array()
        .is_some_and(|keywords| keywords.iter().any(|k| k.as_str() == Some(keyword)))
}

#[async_trait]
impl CatalogTransport for FakeCatalog {
    async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((path.to_string(), params.clone()));

        if path == format!("{CATALOG_PATH}/datasets") {
            let limit: usize = param(params, "limit").and_then(|v| v.parse().ok()).unwrap_or(10);
            let offset: usize = param(params, "offset").and_then(|v| v.parse().ok()).unwrap_or(0);
            if state.fail_listing_from.is_some_and(|from| offset >= from) {
                return Err(ApiError::Status {
                    status: 503,
                    url: path.to_string(),
                });
            }

            let matching: Vec<&Value> = match param(params, "refine.default.keyword") {
                Some(keyword) => state
                    .datasets
                    .iter()
                    .filter(|d| has_keyword(d, keyword))
                    .collect(),
                None => state.datasets.iter().collect(),
            };
            let results: Vec<Value> = matching
                .iter()
                .skip(offset)
                .take(limit)
                .map(|d| (*d).clone())
                .collect();
            return Ok(json!({"total_count": matching.len(), "results": results}));
        }

        if let Some(document) = state.documents.get(path) {
            return Ok(document.clone());
        }

        let detail_prefix = format!("{CATALOG_PATH}/datasets/");
        if let Some(id) = path.strip_prefix(&detail_prefix) {
            if let Some(dataset) = state.datasets.iter().find(|d| d["dataset_id"] == id) {
                return Ok(dataset.clone());
            }
        }

        Err(ApiError::NotFound(path.to_string()))
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile, ApiError> {
        let bytes = self
            .state
            .lock()
            .unwrap()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(url.to_string()))?;
        let mut file = NamedTempFile::new().map_err(|e| ApiError::transport(url, e))?;
        file.write_all(&bytes).map_err(|e| ApiError::transport(url, e))?;
        Ok(file)
    }
}

/// Dataset document in the catalog's wire shape
pub fn dataset_doc(id: &str, title: &str, themes: &[&str]) -> Value {
    json!({
        "dataset_id": id,
        "metas": {
            "default": {
                "title": title,
                "description": format!("<p>Descripción de {title}</p>"),
                "publisher": "Junta de Castilla y León",
                "license": "CC BY 4.0",
                "modified": "2024-03-01T10:00:00+00:00",
                "data_processed": "2024-03-01T10:00:00+00:00",
                "metadata_processed": "2024-03-01T10:00:00+00:00",
                "records_count": 100,
                "theme": themes,
                "keyword": []
            }
        }
    })
}

pub fn client_for(catalog: &FakeCatalog) -> CatalogClient<FakeCatalog> {
    CatalogClient::new(catalog.clone(), ApiConfig::default())
}

pub fn aggregator_for(catalog: &FakeCatalog) -> SearchAggregator<FakeCatalog> {
    SearchAggregator::new(Arc::new(client_for(catalog)), Arc::new(TotalCache::new()))
}

/// Notifier that records every payload instead of sending it
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(Vec<i64>, String)>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Vec<i64>, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, chat_ids: &[i64], payload: &str) -> NotifyReport {
        self.sent
            .lock()
            .unwrap()
            .push((chat_ids.to_vec(), payload.to_string()));
        NotifyReport {
            delivered: chat_ids.len(),
            failed: 0,
        }
    }
}

/// Subscription table held in memory
#[derive(Clone, Default)]
pub struct StaticSubscriptions {
    entries: Arc<Mutex<Vec<(SubscriptionKind, String, i64)>>>,
}

impl StaticSubscriptions {
    pub fn subscribe(&self, kind: SubscriptionKind, target: &str, chat_id: i64) {
        self.entries
            .lock()
            .unwrap()
            .push((kind, target.to_string(), chat_id));
    }
}

#[async_trait]
impl SubscriptionSource for StaticSubscriptions {
    async fn active_targets(&self, kind: SubscriptionKind) -> anyhow::Result<Vec<String>> {
        let mut targets: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, target, _)| target.clone())
            .collect();
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    async fn subscriber_chat_ids(&self, kind: SubscriptionKind, target: &str) -> anyhow::Result<Vec<i64>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, t, _)| *k == kind && t == target)
            .map(|(_, _, chat_id)| *chat_id)
            .collect())
    }
}
