//! # Catalog Data Model
//!
//! Typed values for everything the catalog API returns. The upstream JSON is
//! loosely shaped (strings where lists are expected, missing keys, HTML in
//! descriptions), so every document goes through one parse-with-defaults step
//! here and the rest of the crate only sees these types.
//!
//! ## Core Concepts
//!
//! - **Dataset**: one catalog entry with its metadata timestamps
//! - **ExportFormat**: a downloadable rendition of a dataset (`csv`, `json`, ...)
//! - **Facet**: a category label with a count
//! - **Attachment**: an extra file published next to a dataset
//!
//! Metadata the catalog does not provide is represented by the
//! [`UNAVAILABLE`] sentinel rather than by an empty string.

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::api_config::MAX_DATASET_ID_LEN;
use crate::api_errors::ApiError;

/// Placeholder the catalog bot shows for metadata the upstream did not provide
pub const UNAVAILABLE: &str = "Dato no disponible";

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^<]+?>").expect("HTML tag pattern should be valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("Whitespace pattern should be valid");
}

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
];

/// Whether a metadata value carries real content
pub fn is_available(value: &str) -> bool {
    !value.is_empty() && value != UNAVAILABLE
}

/// Strip HTML tags, decode the common entities and collapse whitespace
///
/// ```rust
/// use jcyl_bot::dataset_model::clean_html_text;
///
/// assert_eq!(clean_html_text("<p>Datos&nbsp;de <b>salud</b></p>\n"), "Datos de salud");
/// ```
pub fn clean_html_text(text: &str) -> String {
    if !is_available(text) {
        return text.to_string();
    }

    let mut clean = HTML_TAG.replace_all(text, "").into_owned();
    for (entity, replacement) in HTML_ENTITIES {
        clean = clean.replace(entity, replacement);
    }

    WHITESPACE.replace_all(&clean, " ").trim().to_string()
}

/// A catalog dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_id: String,
    pub title: String,
    pub description: String,
    pub publisher: String,
    pub license: String,
    /// Last change of the catalog entry as a whole
    pub modified: String,
    /// Last time the underlying data was reprocessed
    pub data_processed: String,
    /// Last time only the page metadata was reprocessed
    pub metadata_processed: String,
    pub records_count: u64,
    pub themes: Vec<String>,
    pub keywords: Vec<String>,
}

impl Dataset {
    /// Create a dataset with every metadata field set to the sentinel
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            title: UNAVAILABLE.to_string(),
            description: UNAVAILABLE.to_string(),
            publisher: UNAVAILABLE.to_string(),
            license: UNAVAILABLE.to_string(),
            modified: UNAVAILABLE.to_string(),
            data_processed: UNAVAILABLE.to_string(),
            metadata_processed: UNAVAILABLE.to_string(),
            records_count: 0,
            themes: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Parse one dataset document from the Explore API
    ///
    /// Missing or oddly-typed metadata falls back to defaults. Only a document
    /// that is not an object, or whose record count is not a non-negative
    /// integer, is rejected. The identifier invariant is checked separately
    /// with [`Dataset::has_valid_id`] so callers can drop those silently.
    pub fn from_api(data: &Value) -> Result<Self, ApiError> {
        let document = data
            .as_object()
            .ok_or_else(|| ApiError::parse("dataset document is not an object"))?;

        let empty = serde_json::Map::new();
        let metas = document
            .get("metas")
            .and_then(|m| m.get("default"))
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let dataset_id = document
            .get("dataset_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            title: string_value(metas.get("title")),
            description: string_value(metas.get("description")),
            publisher: string_value(metas.get("publisher")),
            license: string_value(metas.get("license")),
            modified: timestamp_value(metas.get("modified")),
            data_processed: timestamp_value(metas.get("data_processed")),
            metadata_processed: timestamp_value(metas.get("metadata_processed")),
            records_count: records_count_value(&dataset_id, metas.get("records_count"))?,
            themes: list_value(metas.get("theme")),
            keywords: list_value(metas.get("keyword")),
            dataset_id,
        })
    }

    /// Identifier must be non-empty and at most 200 characters
    pub fn has_valid_id(&self) -> bool {
        let len = self.dataset_id.chars().count();
        len > 0 && len <= MAX_DATASET_ID_LEN
    }

    /// The `modified` timestamp, when it parses as RFC 3339 or a plain date
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_catalog_timestamp(&self.modified)
    }
}

/// Parse the timestamp formats the catalog emits
///
/// Full timestamps look like `2025-08-12T11:14:26.781000+00:00`; some fields
/// carry only the date.
pub fn parse_catalog_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if !is_available(value) {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    let date_part = value.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn string_value(field: Option<&Value>) -> String {
    match field {
        Some(Value::String(s)) => clean_html_text(s),
        Some(Value::Array(items)) => match items.first() {
            Some(Value::String(s)) => clean_html_text(s),
            _ => UNAVAILABLE.to_string(),
        },
        _ => UNAVAILABLE.to_string(),
    }
}

fn timestamp_value(field: Option<&Value>) -> String {
    match field {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => UNAVAILABLE.to_string(),
    }
}

fn list_value(field: Option<&Value>) -> Vec<String> {
    match field {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn records_count_value(dataset_id: &str, field: Option<&Value>) -> Result<u64, ApiError> {
    match field {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => {
            if let Some(count) = n.as_u64() {
                return Ok(count);
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
                _ => Err(ApiError::parse(format!(
                    "records_count {n} of dataset '{dataset_id}' is not a non-negative integer"
                ))),
            }
        }
        Some(other) => Err(ApiError::parse(format!(
            "records_count of dataset '{dataset_id}' has unexpected type: {other}"
        ))),
    }
}

/// A downloadable export of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFormat {
    /// Lowercase format key, e.g. `csv`
    pub format: String,
    pub url: String,
}

/// Where a facet count came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountSource {
    /// As reported by the catalog facets endpoint
    Upstream,
    /// Recounted client-side with the same filter used for browsing
    Recomputed,
}

/// A category label with its dataset count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    pub count: u64,
    pub source: CountSource,
}

/// A file attached to a dataset page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub href: String,
    pub title: String,
    pub description: String,
}

/// Turn an exports document into formats, skipping the `self` link
pub fn parse_exports(data: &Value) -> Vec<ExportFormat> {
    let Some(links) = data.get("links").and_then(Value::as_array) else {
        return Vec::new();
    };

    links
        .iter()
        .filter_map(|link| {
            let rel = link.get("rel").and_then(Value::as_str).unwrap_or_default();
            let href = link.get("href").and_then(Value::as_str).unwrap_or_default();
            if rel.is_empty() || rel == "self" || href.is_empty() {
                return None;
            }
            Some(ExportFormat {
                format: rel.to_lowercase(),
                url: href.to_string(),
            })
        })
        .collect()
}

/// Extract the values of one facet from a facets document
pub fn parse_facets(data: &Value, facet: &str) -> Vec<Facet> {
    let Some(groups) = data.get("facets").and_then(Value::as_array) else {
        return Vec::new();
    };

    groups
        .iter()
        .find(|group| group.get("name").and_then(Value::as_str) == Some(facet))
        .and_then(|group| group.get("facets"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| Facet {
                    name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or(UNAVAILABLE)
                        .to_string(),
                    count: item.get("count").and_then(Value::as_u64).unwrap_or(0),
                    source: CountSource::Upstream,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse an attachments document; entries without an `href` are skipped
pub fn parse_attachments(data: &Value) -> Vec<Attachment> {
    let Some(items) = data.get("attachments").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(href) = item.get("href").and_then(Value::as_str) else {
                warn!(attachment = %item, "Skipping attachment without href");
                return None;
            };
            let text = |key: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(UNAVAILABLE)
                    .to_string()
            };
            Some(Attachment {
                href: href.to_string(),
                title: text("title"),
                description: text("description"),
            })
        })
        .collect()
}
