//! Configuration loaded from environment variables.

use std::env;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Search-augmented model endpoint (chat/completions)
    pub search_api_url: String,
    /// Bearer token for the search model; absent means calls fail with a user-facing message
    pub search_api_key: Option<String>,
    /// Search model name
    pub search_model: String,
    /// Formatting/classification model endpoint (chat/completions)
    pub format_api_url: String,
    /// Bearer token for the formatting model
    pub format_api_key: Option<String>,
    /// Formatting model name
    pub format_model: String,
    /// Daily quotas and boost window
    pub limits: LimitsConfig,
    /// Country-brief cache policy
    pub cache: CacheConfig,
}

/// Daily quotas per mode, with the boosted override.
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub daily_chat_limit: i64,
    pub daily_country_limit: i64,
    pub boosted_chat_limit: i64,
    pub boosted_country_limit: i64,
    /// Days added by one boost extension
    pub boost_days: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_chat_limit: 20,
            daily_country_limit: 10,
            boosted_chat_limit: 100,
            boosted_country_limit: 50,
            boost_days: 30,
        }
    }
}

/// Cache TTL and quality-gate thresholds.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_days: i64,
    /// Minimum plain-text length (markup stripped) for an answer to be cacheable
    pub min_answer_chars: usize,
    /// Numbered-list markers that rescue a short answer
    pub min_list_markers: usize,
    /// Distinct topic keywords that rescue a short answer
    pub min_topic_keywords: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: 45,
            min_answer_chars: 400,
            min_list_markers: 6,
            min_topic_keywords: 4,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            search_api_url: env::var("SEARCH_API_URL")
                .unwrap_or_else(|_| "https://api.perplexity.ai/chat/completions".to_string()),
            search_api_key: env::var("SEARCH_API_KEY").ok(),
            search_model: env::var("SEARCH_MODEL").unwrap_or_else(|_| "sonar".to_string()),
            format_api_url: env::var("FORMAT_API_URL")
                .unwrap_or_else(|_| "https://api.perplexity.ai/chat/completions".to_string()),
            format_api_key: env::var("FORMAT_API_KEY")
                .ok()
                .or_else(|| env::var("SEARCH_API_KEY").ok()),
            format_model: env::var("FORMAT_MODEL").unwrap_or_else(|_| "sonar".to_string()),
            limits: LimitsConfig {
                daily_chat_limit: env_i64("DAILY_CHAT_LIMIT", 20),
                daily_country_limit: env_i64("DAILY_COUNTRY_LIMIT", 10),
                boosted_chat_limit: env_i64("BOOSTED_CHAT_LIMIT", 100),
                boosted_country_limit: env_i64("BOOSTED_COUNTRY_LIMIT", 50),
                boost_days: env_i64("BOOST_DAYS", 30),
            },
            cache: CacheConfig {
                ttl_days: env_i64("CACHE_TTL_DAYS", 45),
                ..CacheConfig::default()
            },
        })
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
