//! # Change Detection
//!
//! Compares fresh catalog observations against the latest snapshot of each
//! tracked entity. Every dataset and theme has its own independent history:
//!
//! - **Unseen**: the observation becomes the first snapshot, nothing to report
//! - **Seen, unchanged**: nothing is written, nothing reported
//! - **Seen, changed**: a new snapshot is appended and the changes reported
//!
//! For datasets only a change in `data_processed` or `records_count` counts.
//! A re-saved catalog page moves `metadata_processed` alone; that is logged
//! and otherwise ignored.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::dataset_model::{is_available, Dataset};

use super::snapshot_store::{DatasetSnapshot, SnapshotStore, ThemeSnapshot};

/// Most recent datasets a keyword check looks at
pub const KEYWORD_SCAN_WINDOW: usize = 100;
/// How recently a dataset must have been modified to count for a keyword alert
pub const KEYWORD_RECENCY_DAYS: i64 = 7;
/// Listing order for the keyword scan
pub const KEYWORD_SCAN_ORDER: &str = "-modified";

/// Dataset field compared between snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedField {
    DataProcessed,
    MetadataProcessed,
    RecordsCount,
}

impl TrackedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::DataProcessed => "data_processed",
            TrackedField::MetadataProcessed => "metadata_processed",
            TrackedField::RecordsCount => "records_count",
        }
    }

    /// Whether a change in this field is worth telling subscribers about
    pub fn is_notifying(&self) -> bool {
        !matches!(self, TrackedField::MetadataProcessed)
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field that differs from the latest snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: TrackedField,
    pub previous: String,
    pub current: String,
}

/// Outcome of checking one dataset observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetCheck {
    /// No earlier snapshot; this observation was stored as the first one
    FirstSeen,
    Unchanged,
    /// Only non-notifying fields moved; no snapshot written
    Suppressed(Vec<FieldChange>),
    /// A notifying field moved; a new snapshot was appended
    Changed(Vec<FieldChange>),
}

impl DatasetCheck {
    pub fn has_changed(&self) -> bool {
        matches!(self, DatasetCheck::Changed(_))
    }

    pub fn changes(&self) -> &[FieldChange] {
        match self {
            DatasetCheck::Suppressed(changes) | DatasetCheck::Changed(changes) => changes,
            DatasetCheck::FirstSeen | DatasetCheck::Unchanged => &[],
        }
    }
}

/// Outcome of checking one theme's member set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeCheck {
    pub first_seen: bool,
    /// Members absent from the latest snapshot
    pub new_ids: BTreeSet<String>,
    /// Members present both now and in the latest snapshot
    pub retained_ids: BTreeSet<String>,
}

/// Fields of `current` that differ from `previous`
///
/// A timestamp that is unavailable on the new observation never counts as
/// a difference.
pub fn compare_dataset(previous: &DatasetSnapshot, current: &Dataset) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    let timestamps = [
        (
            TrackedField::DataProcessed,
            &previous.data_processed,
            &current.data_processed,
        ),
        (
            TrackedField::MetadataProcessed,
            &previous.metadata_processed,
            &current.metadata_processed,
        ),
    ];
    for (field, before, now) in timestamps {
        if before != now && is_available(now) {
            changes.push(FieldChange {
                field,
                previous: before.clone(),
                current: now.clone(),
            });
        }
    }

    if previous.records_count != current.records_count {
        changes.push(FieldChange {
            field: TrackedField::RecordsCount,
            previous: previous.records_count.to_string(),
            current: current.records_count.to_string(),
        });
    }

    changes
}

/// Datasets from a recent-first listing that look like new keyword hits
///
/// Title or description must contain the keyword (case-insensitive) and the
/// dataset must have been modified within the trailing window ending at `now`.
/// Datasets with an unparseable `modified` never match.
pub fn keyword_matches(keyword: &str, datasets: &[Dataset], now: DateTime<Utc>) -> Vec<Dataset> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let since = now - Duration::days(KEYWORD_RECENCY_DAYS);

    datasets
        .iter()
        .filter(|dataset| {
            [&dataset.title, &dataset.description]
                .into_iter()
                .any(|text| is_available(text) && text.to_lowercase().contains(&needle))
        })
        .filter(|dataset| {
            dataset
                .modified_at()
                .is_some_and(|modified| modified >= since)
        })
        .cloned()
        .collect()
}

/// Snapshot-diffing change detector
pub struct ChangeDetector {
    store: Arc<dyn SnapshotStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Diff a dataset observation against its latest snapshot
    pub async fn check_dataset(&self, dataset: &Dataset) -> Result<DatasetCheck> {
        let dataset_id = &dataset.dataset_id;
        let latest = self
            .store
            .latest_dataset_snapshot(dataset_id)
            .await
            .with_context(|| format!("Failed to load snapshot for dataset {dataset_id}"))?;

        let Some(previous) = latest else {
            debug!(dataset_id = %dataset_id, "First observation, storing snapshot");
            self.save_dataset(dataset).await?;
            return Ok(DatasetCheck::FirstSeen);
        };

        let changes = compare_dataset(&previous, dataset);
        if changes.is_empty() {
            return Ok(DatasetCheck::Unchanged);
        }

        for change in &changes {
            info!(
                dataset_id = %dataset_id,
                field = %change.field,
                previous = %change.previous,
                current = %change.current,
                "Dataset field changed"
            );
        }

        if !changes.iter().any(|change| change.field.is_notifying()) {
            info!(dataset_id = %dataset_id, "Only metadata changed, not notifying");
            return Ok(DatasetCheck::Suppressed(changes));
        }

        self.save_dataset(dataset).await?;
        Ok(DatasetCheck::Changed(changes))
    }

    /// Whether the dataset changed in a way subscribers should hear about
    pub async fn has_changed(&self, dataset: &Dataset) -> Result<bool> {
        Ok(self.check_dataset(dataset).await?.has_changed())
    }

    async fn save_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.store
            .save_dataset_snapshot(&DatasetSnapshot::capture(dataset))
            .await
            .with_context(|| format!("Failed to save snapshot for dataset {}", dataset.dataset_id))
    }

    /// Diff a theme's current members against its latest snapshot
    ///
    /// Removed members are not reported. A snapshot is appended when the
    /// theme is unseen or its member set differs from the latest one.
    pub async fn check_theme(&self, theme_name: &str, current_ids: &[String]) -> Result<ThemeCheck> {
        let current: BTreeSet<String> = current_ids.iter().cloned().collect();
        let latest = self
            .store
            .latest_theme_snapshot(theme_name)
            .await
            .with_context(|| format!("Failed to load snapshot for theme {theme_name}"))?;

        let check = match &latest {
            None => ThemeCheck {
                first_seen: true,
                ..Default::default()
            },
            Some(previous) => ThemeCheck {
                first_seen: false,
                new_ids: current.difference(&previous.dataset_ids).cloned().collect(),
                retained_ids: current.intersection(&previous.dataset_ids).cloned().collect(),
            },
        };

        let unchanged = latest
            .as_ref()
            .is_some_and(|previous| previous.dataset_ids == current);
        if !unchanged {
            debug!(theme = %theme_name, members = current.len(), new = check.new_ids.len(), "Storing theme snapshot");
            self.store
                .save_theme_snapshot(&ThemeSnapshot::capture(theme_name, current))
                .await
                .with_context(|| format!("Failed to save snapshot for theme {theme_name}"))?;
        }

        Ok(check)
    }
}
