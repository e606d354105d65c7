//! Test doubles: in-memory store and a scripted model client.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use shared::{
    normalize_country_key, stack_boost, AssistantStore, CachedCountryInfo, HistoryMessage, Mode,
    Result, Role, UserProfile,
};

use crate::llm::{ChatRequest, LlmClient, LlmError};

#[derive(Default)]
struct UserRecord {
    username: Option<String>,
    profile: UserProfile,
    boost_until: Option<DateTime<Utc>>,
}

struct StoredMessage {
    user_id: i64,
    role: Role,
    text: String,
    mode: Mode,
    created_at: DateTime<Utc>,
}

/// In-memory [`AssistantStore`] for tests.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<i64, UserRecord>>,
    messages: Mutex<Vec<StoredMessage>>,
    cache: Mutex<HashMap<String, CachedCountryInfo>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_boost_until(&self, user_id: i64, until: Option<DateTime<Utc>>) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.entry(user_id).or_default().boost_until = until;
    }

    /// Insert a cache row directly, bypassing the quality gate.
    pub async fn put_raw(&self, key: &str, query: &str, answer: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            key.to_string(),
            CachedCountryInfo {
                country_key: key.to_string(),
                country_query: query.to_string(),
                answer: answer.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl AssistantStore for MemoryStore {
    async fn ensure_user(&self, user_id: i64, username: Option<&str>) -> Result<()> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.entry(user_id).or_default().username = username.map(String::from);
        Ok(())
    }

    async fn get_user_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&user_id).map(|u| u.profile.clone()))
    }

    async fn update_user_profile(&self, user_id: i64, profile: &UserProfile) -> Result<()> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.entry(user_id).or_default().profile = profile.clone();
        Ok(())
    }

    async fn save_message(&self, user_id: i64, role: Role, text: &str, mode: Mode) -> Result<()> {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push(StoredMessage {
            user_id,
            role,
            text: text.to_string(),
            mode,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_messages(&self, user_id: i64, limit: i64) -> Result<Vec<HistoryMessage>> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let mut recent: Vec<HistoryMessage> = messages
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .take(limit as usize)
            .map(|m| HistoryMessage {
                role: m.role,
                text: m.text.clone(),
            })
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn daily_message_count(&self, user_id: i64, mode: Mode) -> Result<i64> {
        let today = Utc::now().date_naive();
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(messages
            .iter()
            .filter(|m| {
                m.user_id == user_id
                    && m.role == Role::User
                    && m.mode == mode
                    && m.created_at.date_naive() == today
            })
            .count() as i64)
    }

    async fn boost_until(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&user_id).and_then(|u| u.boost_until))
    }

    async fn extend_boost(&self, user_id: i64, days: i64) -> Result<DateTime<Utc>> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let record = users.entry(user_id).or_default();
        let until = stack_boost(Utc::now(), record.boost_until, days);
        record.boost_until = Some(until);
        Ok(until)
    }

    async fn cached_country_info(&self, key: &str) -> Result<Option<CachedCountryInfo>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.get(&normalize_country_key(key)).cloned())
    }

    async fn put_country_info(&self, key: &str, query: &str, answer: &str) -> Result<()> {
        let normalized = normalize_country_key(key);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            normalized.clone(),
            CachedCountryInfo {
                country_key: normalized,
                country_query: query.to_string(),
                answer: answer.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_country_info(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.remove(&normalize_country_key(key));
        Ok(())
    }

    async fn sweep_country_cache(&self, ttl_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(ttl_days);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, entry| entry.created_at >= cutoff);
        Ok((before - cache.len()) as u64)
    }
}

/// Scripted [`LlmClient`]: replies are consumed in order; an exhausted
/// script or the `failing` variant produces errors. Counts calls.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicU64,
    fail: bool,
    wait_for: Option<Arc<Notify>>,
}

impl ScriptedLlm {
    pub fn replies(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: AtomicU64::new(0),
            fail: false,
            wait_for: None,
        }
    }

    /// Every call fails with a timeout.
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
            fail: true,
            wait_for: None,
        }
    }

    /// Block each call until `notify` fires; for in-flight concurrency tests.
    pub fn paused(replies: &[&str], notify: Arc<Notify>) -> Self {
        Self {
            wait_for: Some(notify),
            ..Self::replies(replies)
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, _request: &ChatRequest) -> std::result::Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(notify) = &self.wait_for {
            notify.notified().await;
        }

        if self.fail {
            return Err(LlmError::Timeout);
        }

        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        replies
            .pop_front()
            .ok_or_else(|| LlmError::Api("scripted replies exhausted".to_string()))
    }
}
