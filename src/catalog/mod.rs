//! Catalog access: transport, typed client, local filters and the search
//! aggregator that pages over filtered results.

pub mod client;
pub mod matching;
pub mod search;
pub mod total_cache;
pub mod transport;

pub use client::{CatalogClient, RawBatch, CATALOG_PATH, KEYWORD_FACET, THEME_FACET};
pub use matching::{matches_search, matches_theme, search_match, SearchMatch};
pub use search::{estimate_total, DatasetListing, DatasetQuery, SearchAggregator, TotalSource};
pub use total_cache::{QuerySignature, TotalCache};
pub use transport::{CatalogTransport, HttpTransport, QueryParams};
