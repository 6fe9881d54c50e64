//! # Snapshot Log
//!
//! Append-only history of observed dataset and theme state. Snapshots are
//! never mutated; "current" state is always the latest snapshot for the
//! entity. [`SnapshotStore`] is the storage seam: [`MemorySnapshotLog`] keeps
//! the log in memory and the Postgres store in [`crate::db`] persists it.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset_model::Dataset;

/// Comparable state of one dataset at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub dataset_id: String,
    pub modified: String,
    pub data_processed: String,
    pub metadata_processed: String,
    pub records_count: u64,
    pub themes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DatasetSnapshot {
    /// Capture a dataset as observed now
    pub fn capture(dataset: &Dataset) -> Self {
        Self {
            dataset_id: dataset.dataset_id.clone(),
            modified: dataset.modified.clone(),
            data_processed: dataset.data_processed.clone(),
            metadata_processed: dataset.metadata_processed.clone(),
            records_count: dataset.records_count,
            themes: dataset.themes.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Member dataset identifiers of one theme at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSnapshot {
    pub theme_name: String,
    pub dataset_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl ThemeSnapshot {
    pub fn capture(theme_name: &str, dataset_ids: BTreeSet<String>) -> Self {
        Self {
            theme_name: theme_name.to_string(),
            dataset_ids,
            created_at: Utc::now(),
        }
    }
}

/// Append-only snapshot storage with latest-by-time reads
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_dataset_snapshot(&self, snapshot: &DatasetSnapshot) -> Result<()>;

    async fn latest_dataset_snapshot(&self, dataset_id: &str) -> Result<Option<DatasetSnapshot>>;

    async fn save_theme_snapshot(&self, snapshot: &ThemeSnapshot) -> Result<()>;

    async fn latest_theme_snapshot(&self, theme_name: &str) -> Result<Option<ThemeSnapshot>>;
}

#[derive(Debug, Default)]
struct LogInner {
    datasets: Vec<DatasetSnapshot>,
    dataset_index: HashMap<String, Vec<usize>>,
    themes: Vec<ThemeSnapshot>,
    theme_index: HashMap<String, Vec<usize>>,
}

/// In-memory snapshot log
///
/// Snapshots live in one arena per entity kind; a per-entity index holds
/// arena positions in append order, so the newest snapshot is the last one.
#[derive(Debug, Default)]
pub struct MemorySnapshotLog {
    inner: Mutex<LogInner>,
}

impl MemorySnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot of a dataset, newest first
    pub fn dataset_history(&self, dataset_id: &str) -> Vec<DatasetSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .dataset_index
            .get(dataset_id)
            .map(|positions| {
                positions
                    .iter()
                    .rev()
                    .map(|&pos| inner.datasets[pos].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every snapshot of a theme, newest first
    pub fn theme_history(&self, theme_name: &str) -> Vec<ThemeSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .theme_index
            .get(theme_name)
            .map(|positions| {
                positions
                    .iter()
                    .rev()
                    .map(|&pos| inner.themes[pos].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotLog {
    async fn save_dataset_snapshot(&self, snapshot: &DatasetSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = inner.datasets.len();
        inner.datasets.push(snapshot.clone());
        inner
            .dataset_index
            .entry(snapshot.dataset_id.clone())
            .or_default()
            .push(pos);
        Ok(())
    }

    async fn latest_dataset_snapshot(&self, dataset_id: &str) -> Result<Option<DatasetSnapshot>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .dataset_index
            .get(dataset_id)
            .and_then(|positions| positions.last())
            .map(|&pos| inner.datasets[pos].clone()))
    }

    async fn save_theme_snapshot(&self, snapshot: &ThemeSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = inner.themes.len();
        inner.themes.push(snapshot.clone());
        inner
            .theme_index
            .entry(snapshot.theme_name.clone())
            .or_default()
            .push(pos);
        Ok(())
    }

    async fn latest_theme_snapshot(&self, theme_name: &str) -> Result<Option<ThemeSnapshot>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .theme_index
            .get(theme_name)
            .and_then(|positions| positions.last())
            .map(|&pos| inner.themes[pos].clone()))
    }
}
