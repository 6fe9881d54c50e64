//! # Callback Payload Shortening
//!
//! Telegram limits inline-keyboard callback data to 64 bytes, which a dataset
//! identifier plus an action prefix easily exceeds. Long payloads are replaced
//! by a short token and resolved back when the button is pressed.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex characters of the payload digest used as the base token
const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Default)]
struct CallbackTables {
    id_to_data: HashMap<String, String>,
    data_to_id: HashMap<String, String>,
}

/// Bidirectional map between long callback payloads and short tokens
///
/// # Token Assignment
///
/// - The base token is the first 8 hex characters of the payload's SHA-256
/// - A base token already owned by a different payload gets a numeric
///   suffix (`1`, `2`, ...) until it is free
/// - The same payload always gets the token it got the first time
///
/// # Lifetime
///
/// Entries are never evicted. The map lives as long as the process, and
/// idempotent assignment keeps it from growing when keyboards are re-rendered.
///
/// # Examples
///
/// ```rust
/// use jcyl_bot::callback_map::CallbackMapper;
///
/// let mapper = CallbackMapper::new();
/// let token = mapper.get_short_id("dataset:registro-de-centros-sanitarios-de-castilla-y-leon");
/// assert_eq!(token.len(), 8);
/// assert_eq!(
///     mapper.get_full_data(&token).as_deref(),
///     Some("dataset:registro-de-centros-sanitarios-de-castilla-y-leon")
/// );
/// ```
#[derive(Debug, Default)]
pub struct CallbackMapper {
    tables: Mutex<CallbackTables>,
}

impl CallbackMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a payload, assigning one on first use
    pub fn get_short_id(&self, full_data: &str) -> String {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = tables.data_to_id.get(full_data) {
            return existing.clone();
        }

        let base = base_token(full_data);
        let mut short_id = base.clone();
        let mut counter = 0u32;
        while tables.id_to_data.contains_key(&short_id) {
            counter += 1;
            short_id = format!("{base}{counter}");
        }
        if counter > 0 {
            debug!(token = %short_id, collisions = counter, "Callback token collision resolved");
        }

        tables
            .id_to_data
            .insert(short_id.clone(), full_data.to_string());
        tables
            .data_to_id
            .insert(full_data.to_string(), short_id.clone());
        short_id
    }

    /// Payload a token was assigned to, if any
    pub fn get_full_data(&self, short_id: &str) -> Option<String> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id_to_data
            .get(short_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id_to_data
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a payload under a chosen token
    #[cfg(test)]
    fn force_entry(&self, short_id: &str, full_data: &str) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .id_to_data
            .insert(short_id.to_string(), full_data.to_string());
        tables
            .data_to_id
            .insert(full_data.to_string(), short_id.to_string());
    }
}

fn base_token(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(SHORT_ID_LEN);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_is_idempotent() {
        let mapper = CallbackMapper::new();
        let payload = "theme:Sector público:page:3";

        let first = mapper.get_short_id(payload);
        let second = mapper.get_short_id(payload);

        assert_eq!(first, second);
        assert_eq!(mapper.len(), 1);
        assert_eq!(mapper.get_full_data(&first).as_deref(), Some(payload));
    }

    #[test]
    fn test_base_token_is_hex_prefix_of_sha256() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(base_token("abc"), "ba7816bf");
        let mapper = CallbackMapper::new();
        assert_eq!(mapper.get_short_id("abc"), "ba7816bf");
    }

    #[test]
    fn test_collision_gets_numeric_suffix() {
        let mapper = CallbackMapper::new();
        let payload = "dataset:tasa-de-paro";
        let base = base_token(payload);

        // Another payload already owns this payload's base token and the first suffix
        mapper.force_entry(&base, "some-other-payload");
        mapper.force_entry(&format!("{base}1"), "yet-another-payload");

        let token = mapper.get_short_id(payload);
        assert_eq!(token, format!("{base}2"));
        assert_eq!(mapper.get_full_data(&token).as_deref(), Some(payload));
        assert_eq!(mapper.get_full_data(&base).as_deref(), Some("some-other-payload"));
        assert_eq!(mapper.get_short_id(payload), token);
    }

    #[test]
    fn test_distinct_payloads_never_alias() {
        let mapper = CallbackMapper::new();
        let tokens: Vec<String> = (0..500)
            .map(|i| mapper.get_short_id(&format!("export:dataset-{i}:csv")))
            .collect();

        let unique: std::collections::HashSet<&String> = tokens.iter().collect();
        assert_eq!(unique.len(), tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            assert_eq!(
                mapper.get_full_data(token),
                Some(format!("export:dataset-{i}:csv"))
            );
        }
    }

    #[test]
    fn test_unknown_token() {
        let mapper = CallbackMapper::new();
        assert!(mapper.is_empty());
        assert_eq!(mapper.get_full_data("deadbeef"), None);
    }
}
