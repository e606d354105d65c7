//! Shared library for the migration assistant.
//!
//! This crate provides configuration, error types, data models and the
//! storage layer used by the answer pipeline and the binaries.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use config::{CacheConfig, Config, LimitsConfig};
pub use error::{Error, Result};
pub use models::{
    AnswerRequest, CachedCountryInfo, ChatAnswer, CountryAnswer, HistoryMessage, Mode, Role,
    Section, StructuredAnswer, UserProfile,
};
pub use store::{normalize_country_key, stack_boost, AssistantStore, PgStore};
