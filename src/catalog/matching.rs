//! Client-side theme and search filters.
//!
//! The catalog's own `theme`/`q` refinements either ignore the filter or
//! over-match, so browsing filters records locally with these predicates.
//! The synonym tables are a fixed heuristic tuned for the regional catalog's
//! Spanish vocabulary.

use tracing::trace;

use crate::dataset_model::{is_available, Dataset};

/// Extra theme-label fragments accepted for a requested theme
const THEME_FUZZY_MATCHES: &[(&str, &[&str])] = &[
    ("sector público", &["sector", "publico", "gobierno", "administracion"]),
    ("salud", &["sanidad", "sanitario", "hospital", "medico"]),
    ("educación", &["educacion", "escolar", "universidad", "formacion"]),
    ("medio ambiente", &["medioambiente", "ambiental", "ecologia", "sostenible"]),
    ("transporte", &["vehiculo", "carretera", "movilidad"]),
    ("energía", &["energia", "electrico", "renovable", "consumo"]),
];

/// Related terms added to a search query
const SEARCH_SYNONYMS: &[(&str, &[&str])] = &[
    ("clinica", &["salud", "medicina", "hospital", "sanitario", "medico"]),
    ("clínica", &["salud", "medicina", "hospital", "sanitario", "medico"]),
    ("hospital", &["salud", "medicina", "clinica", "sanitario", "medico"]),
    ("medicina", &["salud", "clinica", "hospital", "sanitario", "medico"]),
    ("medico", &["salud", "medicina", "clinica", "hospital", "sanitario"]),
    ("sanitario", &["salud", "medicina", "clinica", "hospital", "medico"]),
    ("escuela", &["educacion", "educativo", "enseñanza", "colegio", "instituto"]),
    ("colegio", &["educacion", "educativo", "enseñanza", "escuela", "instituto"]),
    ("universidad", &["educacion", "educativo", "enseñanza", "universitario"]),
    ("trabajo", &["empleo", "laboral", "ocupacion", "profesional"]),
    ("empleo", &["trabajo", "laboral", "ocupacion", "profesional"]),
    ("transporte", &["movilidad", "vehiculo", "autobus", "tren", "carretera"]),
    ("economia", &["economico", "financiero", "presupuesto", "gasto", "inversion"]),
    ("turismo", &["turistico", "hotel", "alojamiento", "visitante"]),
];

/// Shortest term allowed to match inside a longer word
const MIN_PARTIAL_TERM_CHARS: usize = 3;

/// Which rule admitted a record into a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMatch {
    ExactPhrase,
    AllTerms,
    AnyTerm,
    Synonym,
    PartialWord,
}

/// Whether a dataset belongs to the requested theme
///
/// Labels match case-insensitively when either contains the other; failing
/// that, the fuzzy table is consulted. Datasets without themes never match.
pub fn matches_theme(theme: &str, dataset_themes: &[String]) -> bool {
    if dataset_themes.is_empty() {
        return false;
    }

    let theme_lower = theme.to_lowercase();
    let labels: Vec<String> = dataset_themes.iter().map(|t| t.to_lowercase()).collect();

    if labels
        .iter()
        .any(|label| label.contains(&theme_lower) || theme_lower.contains(label.as_str()))
    {
        return true;
    }

    THEME_FUZZY_MATCHES
        .iter()
        .filter(|(category, _)| *category == theme_lower)
        .flat_map(|(_, fragments)| fragments.iter())
        .any(|fragment| labels.iter().any(|label| label.contains(fragment)))
}

/// Lowercase text a search query is matched against
pub fn search_haystack(dataset: &Dataset) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for field in [&dataset.title, &dataset.description] {
        if is_available(field) {
            parts.push(field);
        }
    }
    parts.extend(dataset.keywords.iter().map(String::as_str));
    parts.extend(dataset.themes.iter().map(String::as_str));
    if is_available(&dataset.publisher) {
        parts.push(&dataset.publisher);
    }
    parts.join(" ").to_lowercase()
}

/// Query terms followed by their synonym expansions
fn expanded_terms(terms: &[&str]) -> Vec<String> {
    let mut all: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
    for term in terms {
        if let Some((_, synonyms)) = SEARCH_SYNONYMS.iter().find(|(key, _)| key == term) {
            all.extend(synonyms.iter().map(|s| s.to_string()));
        }
    }
    all
}

/// Decide whether a dataset matches a free-text search, and by which rule
///
/// Rules are tried in priority order and the first one that holds wins. The
/// rule only decides inclusion; results keep upstream order.
pub fn search_match(search: &str, dataset: &Dataset) -> Option<SearchMatch> {
    let query = search.to_lowercase();
    let haystack = search_haystack(dataset);
    let terms: Vec<&str> = query.split_whitespace().collect();

    if haystack.contains(&query) {
        return Some(SearchMatch::ExactPhrase);
    }
    if !terms.is_empty() && terms.iter().all(|term| haystack.contains(term)) {
        return Some(SearchMatch::AllTerms);
    }
    if terms.iter().any(|term| haystack.contains(term)) {
        return Some(SearchMatch::AnyTerm);
    }

    let all_terms = expanded_terms(&terms);
    if all_terms.iter().any(|term| haystack.contains(term.as_str())) {
        return Some(SearchMatch::Synonym);
    }

    let words: Vec<&str> = haystack.split_whitespace().collect();
    let partial = all_terms
        .iter()
        .filter(|term| term.chars().count() >= MIN_PARTIAL_TERM_CHARS)
        .any(|term| words.iter().any(|word| word.contains(term.as_str())));
    if partial {
        trace!(dataset_id = %dataset.dataset_id, query = %query, "Partial word match");
        return Some(SearchMatch::PartialWord);
    }

    None
}

pub fn matches_search(search: &str, dataset: &Dataset) -> bool {
    search_match(search, dataset).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(title: &str, themes: &[&str], keywords: &[&str]) -> Dataset {
        let mut d = Dataset::new("ds");
        d.title = title.to_string();
        d.themes = themes.iter().map(|t| t.to_string()).collect();
        d.keywords = keywords.iter().map(|k| k.to_string()).collect();
        d
    }

    fn themes(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_theme_substring_either_direction() {
        assert!(matches_theme("Salud", &themes(&["salud"])));
        assert!(matches_theme("salud", &themes(&["Salud pública"])));
        assert!(matches_theme("Medio ambiente y clima", &themes(&["Medio ambiente"])));
        assert!(!matches_theme("Salud", &themes(&["Transporte"])));
    }

    #[test]
    fn test_theme_fuzzy_table() {
        assert!(matches_theme("Salud", &themes(&["Servicios sanitarios"])));
        assert!(matches_theme("salud", &themes(&["Hospitales"])));
        assert!(matches_theme("Energía", &themes(&["Consumo eléctrico"])));
        // The table is keyed by the requested theme only
        assert!(!matches_theme("Hospital", &themes(&["Salud"])));
    }

    #[test]
    fn test_theme_never_matches_empty_theme_list() {
        assert!(!matches_theme("salud", &[]));
        assert!(!matches_theme("", &[]));
    }

    #[test]
    fn test_search_priority_order() {
        let d = dataset("Centros de salud de Burgos", &["Salud"], &["atención primaria"]);

        assert_eq!(search_match("centros de salud", &d), Some(SearchMatch::ExactPhrase));
        assert_eq!(search_match("burgos centros", &d), Some(SearchMatch::AllTerms));
        assert_eq!(search_match("farmacias burgos", &d), Some(SearchMatch::AnyTerm));
        assert_eq!(search_match("Centros De Salud", &d), Some(SearchMatch::ExactPhrase));
    }

    #[test]
    fn test_search_synonyms() {
        let d = dataset("Listado de centros de salud", &[], &[]);
        assert_eq!(search_match("clínica", &d), Some(SearchMatch::Synonym));
        assert_eq!(search_match("xyz", &d), None);
    }

    #[test]
    fn test_search_synonym_inside_longer_word() {
        // A fragment inside a word is already a haystack substring, so the
        // synonym rule admits it before the partial-word rule is reached
        let d = dataset("Reeducacion vial", &[], &[]);
        assert_eq!(search_match("escuela", &d), Some(SearchMatch::Synonym));

        // Short terms never match as fragments
        let d = dataset("Aguas", &[], &[]);
        assert_eq!(search_match("zz", &d), None);
    }

    #[test]
    fn test_haystack_ignores_unavailable_metadata() {
        let d = dataset("Paro registrado", &["Empleo"], &["paro"]);
        let haystack = search_haystack(&d);
        assert!(haystack.contains("paro registrado"));
        assert!(haystack.contains("empleo"));
        assert!(!haystack.contains("dato no disponible"));
        assert!(!matches_search("disponible", &d));
    }
}
