//! # Alert Service
//!
//! One alert run walks every active subscription target, asks the
//! [`ChangeDetector`] what changed and hands the resulting events to the
//! [`Notifier`]. Failures are contained per entity: a theme or dataset that
//! cannot be checked is logged and skipped, the run carries on.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::catalog::{CatalogTransport, SearchAggregator};
use crate::dataset_model::Dataset;

use super::detector::{keyword_matches, ChangeDetector, DatasetCheck, KEYWORD_SCAN_ORDER, KEYWORD_SCAN_WINDOW};
use super::notifier::{AlertEvent, Notifier, MAX_NEW_LISTED};
use super::snapshot_store::SnapshotStore;

/// What a subscription follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionKind {
    Theme,
    Dataset,
    Keyword,
}

impl SubscriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Theme => "theme",
            SubscriptionKind::Dataset => "dataset",
            SubscriptionKind::Keyword => "keyword",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "theme" => Ok(SubscriptionKind::Theme),
            "dataset" => Ok(SubscriptionKind::Dataset),
            "keyword" => Ok(SubscriptionKind::Keyword),
            other => Err(anyhow!("Unknown subscription type: {other}")),
        }
    }
}

/// Read side of the subscription table
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    /// Distinct targets with at least one active subscription
    async fn active_targets(&self, kind: SubscriptionKind) -> Result<Vec<String>>;

    /// Chat ids of users actively subscribed to a target
    async fn subscriber_chat_ids(&self, kind: SubscriptionKind, target: &str) -> Result<Vec<i64>>;
}

/// Counters for one alert run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertRunSummary {
    pub themes_checked: usize,
    pub datasets_checked: usize,
    pub keywords_checked: usize,
    pub notifications: usize,
    pub errors: usize,
}

/// Per-run memo of dataset checks
///
/// The first check of a dataset appends its snapshot, so a second check in
/// the same run would always see "unchanged". Theme and dataset subscribers
/// of the same dataset share the first result instead.
#[derive(Debug, Default)]
struct RunState {
    dataset_checks: HashMap<String, DatasetCheck>,
    summary: AlertRunSummary,
}

pub struct AlertService<T> {
    search: Arc<SearchAggregator<T>>,
    detector: ChangeDetector,
    subscriptions: Arc<dyn SubscriptionSource>,
    notifier: Arc<dyn Notifier>,
    enabled: bool,
}

impl<T: CatalogTransport> AlertService<T> {
    pub fn new(
        search: Arc<SearchAggregator<T>>,
        store: Arc<dyn SnapshotStore>,
        subscriptions: Arc<dyn SubscriptionSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            search,
            detector: ChangeDetector::new(store),
            subscriptions,
            notifier,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Run every check once and notify subscribers
    pub async fn check_and_notify_changes(&self) -> AlertRunSummary {
        if !self.enabled {
            info!("Alerts are disabled");
            return AlertRunSummary::default();
        }

        info!("Starting change detection check");
        let mut state = RunState::default();

        self.check_theme_changes(&mut state).await;
        self.check_dataset_changes(&mut state).await;
        self.check_keyword_matches(&mut state, Utc::now()).await;

        let summary = state.summary;
        info!(
            themes = summary.themes_checked,
            datasets = summary.datasets_checked,
            keywords = summary.keywords_checked,
            notifications = summary.notifications,
            errors = summary.errors,
            "Change detection check finished"
        );
        summary
    }

    async fn targets(&self, kind: SubscriptionKind, state: &mut RunState) -> Vec<String> {
        match self.subscriptions.active_targets(kind).await {
            Ok(targets) => {
                if targets.is_empty() {
                    info!(kind = %kind, "No active subscriptions");
                }
                targets
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Error loading subscriptions");
                state.summary.errors += 1;
                Vec::new()
            }
        }
    }

    async fn check_theme_changes(&self, state: &mut RunState) {
        info!("Checking theme changes...");
        for theme in self.targets(SubscriptionKind::Theme, state).await {
            state.summary.themes_checked += 1;
            match self.check_single_theme(&theme, state).await {
                Ok(events) => {
                    for event in events {
                        self.deliver(SubscriptionKind::Theme, &theme, &event, state).await;
                    }
                }
                Err(e) => {
                    error!(theme = %theme, error = %e, "Error checking theme");
                    state.summary.errors += 1;
                }
            }
        }
    }

    async fn check_single_theme(&self, theme: &str, state: &mut RunState) -> Result<Vec<AlertEvent>> {
        let listing = self.search.all_datasets_in_theme(theme).await;
        if listing.upstream_error {
            // A partial member list would show up as removals now and as
            // "new" datasets on the next run
            warn!(theme = %theme, "Theme listing incomplete, skipping");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = listing
            .datasets
            .iter()
            .map(|dataset| dataset.dataset_id.clone())
            .collect();
        let check = self.detector.check_theme(theme, &ids).await?;
        if check.first_seen {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        if !check.new_ids.is_empty() {
            let datasets: Vec<Dataset> = listing
                .datasets
                .iter()
                .filter(|dataset| check.new_ids.contains(&dataset.dataset_id))
                .take(MAX_NEW_LISTED)
                .cloned()
                .collect();
            info!(theme = %theme, new = check.new_ids.len(), "New datasets in theme");
            events.push(AlertEvent::NewInTheme {
                theme: theme.to_string(),
                datasets,
                total_new: check.new_ids.len(),
            });
        }

        let mut changed = Vec::new();
        for dataset in listing
            .datasets
            .iter()
            .filter(|dataset| check.retained_ids.contains(&dataset.dataset_id))
        {
            match self.dataset_check(dataset, state).await {
                Ok(result) if result.has_changed() => changed.push(dataset.clone()),
                Ok(_) => {}
                Err(e) => {
                    error!(dataset_id = %dataset.dataset_id, error = %e, "Error checking dataset");
                    state.summary.errors += 1;
                }
            }
        }
        if !changed.is_empty() {
            info!(theme = %theme, changed = changed.len(), "Changed datasets in theme");
            events.push(AlertEvent::ChangedInTheme {
                theme: theme.to_string(),
                datasets: changed,
            });
        }

        Ok(events)
    }

    async fn dataset_check(&self, dataset: &Dataset, state: &mut RunState) -> Result<DatasetCheck> {
        if let Some(check) = state.dataset_checks.get(&dataset.dataset_id) {
            return Ok(check.clone());
        }
        let check = self.detector.check_dataset(dataset).await?;
        state
            .dataset_checks
            .insert(dataset.dataset_id.clone(), check.clone());
        Ok(check)
    }

    async fn check_dataset_changes(&self, state: &mut RunState) {
        info!("Checking dataset changes...");
        for dataset_id in self.targets(SubscriptionKind::Dataset, state).await {
            state.summary.datasets_checked += 1;

            let Some(dataset) = self.search.client().get_dataset_info(&dataset_id).await else {
                warn!(dataset_id = %dataset_id, "Dataset not found");
                continue;
            };

            match self.dataset_check(&dataset, state).await {
                Ok(DatasetCheck::Changed(changes)) => {
                    let event = AlertEvent::DatasetChanged { dataset, changes };
                    self.deliver(SubscriptionKind::Dataset, &dataset_id, &event, state)
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(dataset_id = %dataset_id, error = %e, "Error checking dataset");
                    state.summary.errors += 1;
                }
            }
        }
    }

    async fn check_keyword_matches(&self, state: &mut RunState, now: DateTime<Utc>) {
        let keywords = self.targets(SubscriptionKind::Keyword, state).await;
        if keywords.is_empty() {
            return;
        }

        info!("Checking keyword subscriptions...");
        let recent = match self
            .search
            .client()
            .fetch_dataset_batch(KEYWORD_SCAN_WINDOW, 0, KEYWORD_SCAN_ORDER, None)
            .await
        {
            Ok(batch) => batch.datasets,
            Err(e) => {
                error!(error = %e, "Error fetching recent datasets");
                state.summary.errors += 1;
                return;
            }
        };

        for keyword in keywords {
            state.summary.keywords_checked += 1;
            let datasets = keyword_matches(&keyword, &recent, now);
            if datasets.is_empty() {
                continue;
            }
            info!(keyword = %keyword, matches = datasets.len(), "Recent datasets match keyword");
            let event = AlertEvent::KeywordMatches {
                keyword: keyword.clone(),
                datasets,
            };
            self.deliver(SubscriptionKind::Keyword, &keyword, &event, state)
                .await;
        }
    }

    async fn deliver(&self, kind: SubscriptionKind, target: &str, event: &AlertEvent, state: &mut RunState) {
        let chat_ids = match self.subscriptions.subscriber_chat_ids(kind, target).await {
            Ok(chat_ids) => chat_ids,
            Err(e) => {
                error!(kind = %kind, target = %target, error = %e, "Error loading subscribers");
                state.summary.errors += 1;
                return;
            }
        };
        if chat_ids.is_empty() {
            return;
        }

        info!(kind = %kind, target = %target, subscribers = chat_ids.len(), "Notifying subscribers");
        let report = self.notifier.notify(&chat_ids, &event.render()).await;
        state.summary.notifications += report.delivered;
    }
}
