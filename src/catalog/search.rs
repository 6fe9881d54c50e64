//! # Dataset Search Aggregation
//!
//! Listing, theme browsing and free-text search over the catalog.
//!
//! Unfiltered listings are a straight pass-through: upstream paging and
//! `total_count` are trustworthy. Theme and search filters are not, so a
//! filtered listing scans raw upstream pages from the start, filters them
//! locally and pages over the filtered matches.
//!
//! ## Totals
//!
//! A scan stops as soon as it has enough matches for the requested page, so
//! the total is exact only when the scan ran out of upstream data or hit the
//! safety ceiling. Otherwise it is a deliberately pessimistic estimate. The
//! first total reported for a [`QuerySignature`] is cached and reused for
//! every later page of that query.

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::api_config::{ScanLimits, DEFAULT_DATASETS_PER_PAGE, DEFAULT_ORDER_BY};
use crate::dataset_model::{CountSource, Dataset, Facet};

use super::client::CatalogClient;
use super::matching::{matches_search, matches_theme};
use super::total_cache::{QuerySignature, TotalCache};
use super::transport::CatalogTransport;

/// Fraction of all matches a partial scan is assumed to have seen at least
const MIN_SEEN_FRACTION: f64 = 0.6;
/// Damping applied to the upstream-proportional estimate
const UPSTREAM_ESTIMATE_DAMPING: f64 = 0.9;

/// Parameters of one listing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetQuery {
    pub theme: Option<String>,
    pub keyword: Option<String>,
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub order_by: String,
}

impl Default for DatasetQuery {
    fn default() -> Self {
        Self {
            theme: None,
            keyword: None,
            search: None,
            limit: DEFAULT_DATASETS_PER_PAGE,
            offset: 0,
            order_by: DEFAULT_ORDER_BY.to_string(),
        }
    }
}

impl DatasetQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    fn signature(&self) -> QuerySignature {
        QuerySignature::new(
            self.theme.as_deref(),
            self.search.as_deref(),
            self.keyword.as_deref(),
        )
    }
}

/// How the reported total was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TotalSource {
    /// Upstream `total_count` of an unfiltered listing
    Upstream,
    /// Count of matches from a scan that saw every candidate
    Exact,
    /// Pessimistic estimate from a partial scan
    Estimated,
    /// Reused from an earlier request with the same signature
    Cached,
}

/// One page of datasets plus the total used for page counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetListing {
    pub datasets: Vec<Dataset>,
    pub total: u64,
    pub total_source: TotalSource,
    /// The scan enumerated the whole filtered set (or hit the safety ceiling)
    pub reached_end: bool,
    /// An upstream failure cut this request short
    pub upstream_error: bool,
}

impl DatasetListing {
    fn empty_after_error() -> Self {
        Self {
            datasets: Vec::new(),
            total: 0,
            total_source: TotalSource::Upstream,
            reached_end: false,
            upstream_error: true,
        }
    }
}

/// Why a filtered scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    /// Enough matches for the requested page
    Demand,
    /// Upstream returned a short page
    Exhausted,
    /// Scanned offset reached the ceiling
    SafetyCeiling,
    /// An upstream call failed; treated as "no more data"
    UpstreamError,
}

#[derive(Debug)]
struct ScanOutcome {
    matches: Vec<Dataset>,
    scanned: usize,
    upstream_total: u64,
    end: ScanEnd,
}

/// Conservative total for a scan that stopped early
///
/// `max(found / 0.6, upstream_total * (found / scanned) * 0.9, found)`,
/// each term truncated. With nothing scanned the only evidence is `found`.
pub fn estimate_total(found: usize, scanned: usize, upstream_total: u64) -> u64 {
    if scanned == 0 {
        return found as u64;
    }
    let found_f = found as f64;
    let min_total_estimate = (found_f / MIN_SEEN_FRACTION) as u64;
    let upstream_estimate =
        (upstream_total as f64 * (found_f / scanned as f64) * UPSTREAM_ESTIMATE_DAMPING) as u64;

    min_total_estimate
        .max(upstream_estimate)
        .max(found as u64)
}

/// Listing and search engine over the catalog client
pub struct SearchAggregator<T> {
    client: Arc<CatalogClient<T>>,
    totals: Arc<TotalCache>,
    limits: ScanLimits,
}

impl<T: CatalogTransport> SearchAggregator<T> {
    /// Aggregator using the client's configured scan limits
    pub fn new(client: Arc<CatalogClient<T>>, totals: Arc<TotalCache>) -> Self {
        let limits = client.config().scan;
        Self {
            client,
            totals,
            limits,
        }
    }

    /// Override the scan limits; a zero page size is raised to one
    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = ScanLimits {
            page_size: limits.page_size.max(1),
            ..limits
        };
        self
    }

    pub fn client(&self) -> &Arc<CatalogClient<T>> {
        &self.client
    }

    pub fn limits(&self) -> ScanLimits {
        self.limits
    }

    /// First page of an unfiltered query at the configured page size
    pub fn query(&self) -> DatasetQuery {
        DatasetQuery::new().page(self.client.config().datasets_per_page, 0)
    }

    /// One page of datasets plus a total that stays stable across pages
    pub async fn list_datasets(&self, query: &DatasetQuery) -> DatasetListing {
        let signature = query.signature();
        if signature.theme.is_none() && signature.search.is_none() {
            self.list_unfiltered(query).await
        } else {
            self.list_filtered(query, signature).await
        }
    }

    async fn list_unfiltered(&self, query: &DatasetQuery) -> DatasetListing {
        debug!(limit = query.limit, offset = query.offset, keyword = ?query.keyword, "Unfiltered listing");

        match self
            .client
            .fetch_dataset_batch(
                query.limit,
                query.offset,
                &query.order_by,
                query.keyword.as_deref(),
            )
            .await
        {
            Ok(batch) => {
                info!(
                    total = batch.total_count,
                    page = batch.raw_len,
                    "Upstream listing returned"
                );
                DatasetListing {
                    datasets: batch.datasets,
                    total: batch.total_count,
                    total_source: TotalSource::Upstream,
                    reached_end: query.offset + batch.raw_len >= batch.total_count as usize,
                    upstream_error: false,
                }
            }
            Err(e) => {
                error!(error = %e, "Error getting datasets");
                DatasetListing::empty_after_error()
            }
        }
    }

    async fn list_filtered(&self, query: &DatasetQuery, signature: QuerySignature) -> DatasetListing {
        let outcome = self.scan(query, &signature).await;
        let found = outcome.matches.len();
        let reached_end = matches!(outcome.end, ScanEnd::Exhausted | ScanEnd::SafetyCeiling);

        let (total, total_source) = match self.totals.get(&signature) {
            Some(cached) => {
                debug!(?signature, total = cached, "Using cached total");
                (cached, TotalSource::Cached)
            }
            None if reached_end => {
                info!(?signature, total = found, "Complete scan finished, using exact count");
                self.totals.insert(signature.clone(), found as u64);
                (found as u64, TotalSource::Exact)
            }
            None => {
                let estimate = estimate_total(found, outcome.scanned, outcome.upstream_total);
                info!(
                    ?signature,
                    found,
                    scanned = outcome.scanned,
                    estimate,
                    "Partial scan, using conservative estimate"
                );
                self.totals.insert(signature.clone(), estimate);
                (estimate, TotalSource::Estimated)
            }
        };

        let start = query.offset.min(found);
        let end = query.offset.saturating_add(query.limit).min(found);
        let mut matches = outcome.matches;
        let datasets: Vec<Dataset> = matches.drain(start..end).collect();

        info!(
            returned = datasets.len(),
            total,
            "Filtered search complete"
        );

        DatasetListing {
            datasets,
            total,
            total_source,
            reached_end,
            upstream_error: outcome.end == ScanEnd::UpstreamError,
        }
    }

    fn accepts(signature: &QuerySignature, dataset: &Dataset) -> bool {
        if let Some(theme) = &signature.theme {
            if !matches_theme(theme, &dataset.themes) {
                return false;
            }
        }
        if let Some(search) = &signature.search {
            if !matches_search(search, dataset) {
                return false;
            }
        }
        true
    }

    /// Scan raw upstream pages from offset 0, collecting filtered matches
    async fn scan(&self, query: &DatasetQuery, signature: &QuerySignature) -> ScanOutcome {
        let page_size = self.limits.page_size.max(1);
        let target = query.offset.saturating_add(query.limit).max(1);
        let mut matches = Vec::new();
        let mut scanned = 0;
        let mut upstream_total = 0;

        let end = loop {
            if scanned >= self.limits.safety_ceiling {
                break ScanEnd::SafetyCeiling;
            }

            debug!(offset = scanned, limit = page_size, "Fetching batch");
            let batch = match self
                .client
                .fetch_dataset_batch(page_size, scanned, &query.order_by, query.keyword.as_deref())
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(offset = scanned, error = %e, "Error in batch fetch");
                    break ScanEnd::UpstreamError;
                }
            };

            upstream_total = batch.total_count;
            let before = matches.len();
            matches.extend(
                batch
                    .datasets
                    .into_iter()
                    .filter(|dataset| Self::accepts(signature, dataset)),
            );
            scanned += page_size;

            debug!(
                batch_matches = matches.len() - before,
                matches = matches.len(),
                scanned,
                "Batch complete"
            );

            if batch.raw_len < page_size {
                break ScanEnd::Exhausted;
            }
            if scanned >= self.limits.safety_ceiling {
                break ScanEnd::SafetyCeiling;
            }
            if matches.len() >= target {
                break ScanEnd::Demand;
            }
        };

        ScanOutcome {
            matches,
            scanned,
            upstream_total,
            end,
        }
    }

    /// Theme facets with counts recomputed through the client-side filter
    ///
    /// Upstream facet counts disagree with what browsing a theme actually
    /// shows. A theme whose recount hit an upstream error keeps its upstream
    /// count. Sorted by count, largest first.
    pub async fn get_themes_with_real_counts(&self) -> Vec<Facet> {
        let mut themes = Vec::new();

        for facet in self.client.get_themes().await {
            let listing = self
                .list_datasets(&DatasetQuery::new().theme(facet.name.clone()).page(1, 0))
                .await;

            if listing.upstream_error && listing.total_source != TotalSource::Cached {
                info!(theme = %facet.name, count = facet.count, "Keeping upstream theme count");
                themes.push(facet);
                continue;
            }

            info!(theme = %facet.name, upstream = facet.count, real = listing.total, "Recomputed theme count");
            themes.push(Facet {
                name: facet.name,
                count: listing.total,
                source: CountSource::Recomputed,
            });
        }

        themes.sort_by_key(|facet| Reverse(facet.count));
        themes
    }

    /// Every dataset the filtered scan can see for a theme
    pub async fn all_datasets_in_theme(&self, theme: &str) -> DatasetListing {
        let query = DatasetQuery::new()
            .theme(theme)
            .page(self.limits.safety_ceiling, 0);
        self.list_datasets(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_prefers_upstream_proportion() {
        // 25 of 100 scanned matched, upstream has 400: 400 * 0.25 * 0.9 = 90
        assert_eq!(estimate_total(25, 100, 400), 90);
    }

    #[test]
    fn test_estimate_prefers_minimum_seen_fraction() {
        // 30 / 0.6 = 50 beats 100 * 0.3 * 0.9
        assert_eq!(estimate_total(30, 100, 100), 50);
    }

    #[test]
    fn test_estimate_never_below_found() {
        assert_eq!(estimate_total(0, 100, 5000), 0);
        assert_eq!(estimate_total(7, 0, 5000), 7);
        assert!(estimate_total(1, 100, 0) >= 1);
    }

    #[test]
    fn test_query_builder_and_signature() {
        let query = DatasetQuery::new()
            .theme(" Salud ")
            .search("hospital")
            .keyword("covid")
            .page(5, 10);
        assert_eq!(query.limit, 5);
        assert_eq!(query.offset, 10);
        assert_eq!(query.order_by, DEFAULT_ORDER_BY);

        let signature = query.signature();
        assert_eq!(signature.theme.as_deref(), Some("salud"));
        assert_eq!(signature.search.as_deref(), Some("hospital"));
        assert_eq!(signature.keyword.as_deref(), Some("covid"));
    }
}
