//! # Query Total Cache
//!
//! Remembers the total reported for each filtered query so that every page of
//! the same query shows the same "page X of Y", even though each page reruns
//! the scan and a partial scan can only estimate the total.
//!
//! # Lifetime
//!
//! Entries live as long as the cache object. There is no eviction: one entry
//! per distinct (theme, search, keyword) a user asked for, cleared on restart.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Identity of one logical filtered query, independent of paging
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySignature {
    pub theme: Option<String>,
    pub search: Option<String>,
    pub keyword: Option<String>,
}

impl QuerySignature {
    /// Build a signature, normalizing theme and search to trimmed lowercase
    ///
    /// Blank values count as absent.
    pub fn new(theme: Option<&str>, search: Option<&str>, keyword: Option<&str>) -> Self {
        Self {
            theme: normalize(theme),
            search: normalize(search),
            keyword: keyword
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        }
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Process-lifetime map from query signature to reported total
///
/// Shared between concurrent handlers; writes are last-writer-wins.
#[derive(Debug, Default)]
pub struct TotalCache {
    totals: Mutex<HashMap<QuerySignature, u64>>,
}

impl TotalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &QuerySignature) -> Option<u64> {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signature)
            .copied()
    }

    pub fn insert(&self, signature: QuerySignature, total: u64) {
        debug!(?signature, total, "Caching query total");
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signature, total);
    }

    pub fn len(&self) -> usize {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
