//! Normalizer: untrusted parsed JSON in, invariant-holding structures out.
//!
//! Pure, no I/O, never fails. Malformed optional fields are dropped
//! silently; the pipeline degrades instead of erroring.

use serde_json::Value;

use shared::{ChatAnswer, CountryAnswer, Mode, Section, StructuredAnswer};

use crate::cleanup::cleanup_model_text;
use crate::prompts::COUNTRY_SECTION_COUNT;

/// Punctuation trimmed from both ends of a candidate source URL.
const URL_TRIM_CHARS: &[char] = &['.', ',', ';', ':', ')', '(', ']', '[', '<', '>', '"', '\''];

/// Normalize one parsed retrieval object for the given mode.
pub fn normalize(mode: Mode, value: &Value, query: &str) -> StructuredAnswer {
    match mode {
        Mode::Chat => StructuredAnswer::Chat(normalize_chat(value)),
        Mode::Country => StructuredAnswer::Country(normalize_country(value, query)),
    }
}

pub fn normalize_chat(value: &Value) -> ChatAnswer {
    let answer = value
        .get("answer")
        .and_then(Value::as_str)
        .map(cleanup_model_text)
        .unwrap_or_default();

    let clarify = value
        .get("clarify")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(cleanup_model_text)
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ChatAnswer {
        answer,
        clarify,
        sources: normalize_sources(value.get("sources")),
    }
}

pub fn normalize_country(value: &Value, query: &str) -> CountryAnswer {
    let country = value
        .get("country")
        .and_then(Value::as_str)
        .map(cleanup_model_text)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| query.trim().to_string());

    let sections = value
        .get("sections")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(normalize_section)
                .take(COUNTRY_SECTION_COUNT)
                .collect()
        })
        .unwrap_or_default();

    CountryAnswer {
        country,
        sections,
        sources: normalize_sources(value.get("sources")),
    }
}

/// Keep only dict-like entries reducible to string title/body with at least
/// one of the two non-empty.
fn normalize_section(value: &Value) -> Option<Section> {
    let object = value.as_object()?;
    let title = object
        .get("title")
        .and_then(Value::as_str)
        .map(cleanup_model_text)
        .unwrap_or_default();
    let body = object
        .get("body")
        .and_then(Value::as_str)
        .map(cleanup_model_text)
        .unwrap_or_default();

    if title.is_empty() && body.is_empty() {
        return None;
    }
    Some(Section { title, body })
}

/// Keep only strings that are HTTP(S) URLs after trimming surrounding
/// punctuation; drop everything else silently.
fn normalize_sources(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(clean_source)
        .collect()
}

fn clean_source(raw: &str) -> Option<String> {
    let url = raw.trim().trim_matches(URL_TRIM_CHARS);
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sources_keep_only_urls() {
        let value = json!({
            "sources": [
                "https://www.bamf.de",
                " (http://example.gov). ",
                "www.without-scheme.com",
                "см. сайт посольства",
                42,
                null
            ]
        });
        let sources = normalize_sources(value.get("sources"));
        assert_eq!(sources, vec!["https://www.bamf.de", "http://example.gov"]);
    }

    #[test]
    fn test_every_surviving_source_is_http() {
        let value = json!({"sources": ["ftp://x", "https://a.de", "mailto:b@c", "  "]});
        for url in normalize_sources(value.get("sources")) {
            assert!(url.starts_with("http://") || url.starts_with("https://"));
        }
    }

    #[test]
    fn test_sections_drop_malformed_entries() {
        let value = json!({
            "sections": [
                {"title": "Визы и ВНЖ", "body": "Нужна национальная виза."},
                {"title": "", "body": ""},
                {"title": "Только заголовок"},
                "не объект",
                17
            ]
        });
        let answer = normalize_country(&value, "Германия");
        assert_eq!(answer.sections.len(), 2);
        assert_eq!(answer.sections[0].title, "Визы и ВНЖ");
        assert_eq!(answer.sections[1].title, "Только заголовок");
        assert_eq!(answer.sections[1].body, "");
    }

    #[test]
    fn test_sections_capped_at_contract_count() {
        let sections: Vec<_> = (0..12)
            .map(|i| json!({"title": format!("Раздел {}", i), "body": "текст"}))
            .collect();
        let value = json!({"sections": sections});
        let answer = normalize_country(&value, "Канада");
        assert_eq!(answer.sections.len(), COUNTRY_SECTION_COUNT);
    }

    #[test]
    fn test_country_falls_back_to_query() {
        let answer = normalize_country(&json!({}), "  Германия ");
        assert_eq!(answer.country, "Германия");
        assert!(answer.sections.is_empty());
    }

    #[test]
    fn test_chat_cleans_citation_markers() {
        let value = json!({
            "answer": "Виза нужна [1] всем.",
            "clarify": ["Какая у вас цель? ", "", 5],
            "sources": []
        });
        let answer = normalize_chat(&value);
        assert_eq!(answer.answer, "Виза нужна всем.");
        assert_eq!(answer.clarify, vec!["Какая у вас цель?"]);
    }

    #[test]
    fn test_missing_fields_yield_defaults() {
        let answer = normalize_chat(&json!({"unrelated": true}));
        assert!(answer.answer.is_empty());
        assert!(answer.clarify.is_empty());
        assert!(answer.sources.is_empty());
    }
}
