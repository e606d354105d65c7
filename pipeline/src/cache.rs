//! Country-brief cache policy: TTL, key normalization and the quality gate.
//!
//! The storage itself lives behind [`AssistantStore`]; this module decides
//! what is worth caching and whether a stored entry is still usable. A
//! truncated or apologetic model response must not poison the cache for all
//! future askers of the same country.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::{debug, warn};

use shared::{AssistantStore, CacheConfig};

use crate::cleanup::strip_markup;

/// Case-insensitive substrings that mark an answer as a failure artifact.
const ERROR_MARKERS: [&str; 7] = [
    "ошибка",
    "error",
    "таймаут",
    "timeout",
    "попробуйте ещё раз",
    "exception",
    "traceback",
];

/// Topic markers expected in a real country brief.
const TOPIC_KEYWORDS: [&str; 10] = [
    "виз",
    "внж",
    "гражданств",
    "стоимост",
    "жиль",
    "работ",
    "медицин",
    "образован",
    "официальн",
    "страховк",
];

fn list_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+[.)]").unwrap())
}

/// Quality gate: should this rendered answer be stored for future askers?
pub fn is_country_answer_cacheable(answer: &str, config: &CacheConfig) -> bool {
    let lowered = answer.to_lowercase();
    if ERROR_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return false;
    }

    let plain = strip_markup(answer);
    if plain.chars().count() >= config.min_answer_chars {
        return true;
    }

    // A short answer still counts when it is visibly structured.
    let list_markers = list_marker_re().find_iter(&plain).count();
    if list_markers >= config.min_list_markers {
        return true;
    }

    let keyword_hits = TOPIC_KEYWORDS
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .count();
    keyword_hits >= config.min_topic_keywords
}

/// TTL- and quality-aware view over the persisted country cache.
pub struct CountryCache {
    store: Arc<dyn AssistantStore>,
    config: CacheConfig,
}

impl CountryCache {
    pub fn new(store: Arc<dyn AssistantStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Cached answer for the query, or `None` on miss, expiry, storage
    /// failure, or an entry that no longer passes the quality gate.
    pub async fn lookup(&self, query: &str) -> Option<String> {
        self.lookup_at(query, Utc::now()).await
    }

    pub(crate) async fn lookup_at(&self, query: &str, now: DateTime<Utc>) -> Option<String> {
        let entry = match self.store.cached_country_info(query).await {
            Ok(entry) => entry?,
            Err(error) => {
                warn!(error = %error, "Country cache read failed, treating as miss");
                return None;
            }
        };

        if now - entry.created_at > Duration::days(self.config.ttl_days) {
            debug!(key = %entry.country_key, "Country cache entry expired");
            return None;
        }

        if !is_country_answer_cacheable(&entry.answer, &self.config) {
            debug!(key = %entry.country_key, "Cached answer fails quality re-check, invalidating");
            if let Err(error) = self.store.delete_country_info(query).await {
                warn!(error = %error, "Could not invalidate stale cache entry");
            }
            return None;
        }

        Some(entry.answer)
    }

    /// Store the answer if it passes the quality gate; sweeps expired
    /// entries opportunistically. Returns whether the answer was cached.
    pub async fn store(&self, query: &str, answer: &str) -> bool {
        if !is_country_answer_cacheable(answer, &self.config) {
            debug!("Answer rejected by cache quality gate");
            return false;
        }

        if let Err(error) = self.store.put_country_info(query, query, answer).await {
            warn!(error = %error, "Country cache write failed");
            return false;
        }

        if let Err(error) = self.store.sweep_country_cache(self.config.ttl_days).await {
            warn!(error = %error, "Country cache sweep failed");
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::Duration;

    fn long_brief() -> String {
        let sections: Vec<String> = (1..=8)
            .map(|i| {
                format!(
                    "<b>{}. Раздел про визу и ВНЖ</b>\nПодробности о работе, жилье и медицине в стране.{}",
                    i,
                    " Дополнительные сведения для переезда и адаптации.".repeat(3)
                )
            })
            .collect();
        sections.join("\n\n")
    }

    #[test]
    fn test_long_structured_answer_cacheable() {
        assert!(is_country_answer_cacheable(&long_brief(), &CacheConfig::default()));
    }

    #[test]
    fn test_short_apologetic_answer_not_cacheable() {
        let config = CacheConfig::default();
        assert!(!is_country_answer_cacheable("Извините, не получилось.", &config));
    }

    #[test]
    fn test_error_marker_rejects_regardless_of_length() {
        let config = CacheConfig::default();
        let text = format!("Ошибка HTTP 502: {}", "x".repeat(1000));
        assert!(!is_country_answer_cacheable(&text, &config));
    }

    #[test]
    fn test_numbered_list_rescues_short_answer() {
        let config = CacheConfig::default();
        let text = (1..=6)
            .map(|i| format!("{}. Пункт", i))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(text.chars().count() < config.min_answer_chars);
        assert!(is_country_answer_cacheable(&text, &config));
    }

    #[test]
    fn test_topic_keywords_rescue_short_answer() {
        let config = CacheConfig::default();
        let text = "Виза и ВНЖ оформляются онлайн; жильё и работа ищутся заранее.";
        assert!(text.chars().count() < config.min_answer_chars);
        assert!(is_country_answer_cacheable(text, &config));
    }

    #[tokio::test]
    async fn test_round_trip_within_ttl() {
        let store = Arc::new(MemoryStore::new());
        let cache = CountryCache::new(store, CacheConfig::default());
        let answer = long_brief();

        assert!(cache.store("Германия", &answer).await);
        assert_eq!(cache.lookup("германия").await.as_deref(), Some(answer.as_str()));
        // Key normalization: different casing and spacing hit the same entry.
        assert_eq!(cache.lookup("  ГЕРМАНИЯ ").await.as_deref(), Some(answer.as_str()));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = CountryCache::new(store.clone(), CacheConfig::default());
        let answer = long_brief();

        assert!(cache.store("Германия", &answer).await);

        let later = Utc::now() + Duration::days(46);
        assert!(cache.lookup_at("Германия", later).await.is_none());
    }

    #[tokio::test]
    async fn test_uncacheable_answer_never_stored() {
        let store = Arc::new(MemoryStore::new());
        let cache = CountryCache::new(store.clone(), CacheConfig::default());

        assert!(!cache.store("Германия", "Извините, не получилось.").await);
        assert!(cache.lookup("Германия").await.is_none());
    }

    #[tokio::test]
    async fn test_quality_recheck_invalidates_stale_entry() {
        let store = Arc::new(MemoryStore::new());
        let cache = CountryCache::new(store.clone(), CacheConfig::default());

        // Entry written under an older, laxer policy.
        store.put_raw("германия", "Германия", "Ошибка: таймаут").await;
        assert!(cache.lookup("Германия").await.is_none());
        assert!(store.cached_country_info("германия").await.unwrap().is_none());
    }
}
