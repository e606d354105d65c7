//! The answer pipeline orchestrator.
//!
//! One entry point, [`AnswerPipeline::generate_answer`], implementing the
//! stage order: concurrency guard, quota, cache lookup, domain gate,
//! retrieval, normalization, rendering, cache store. Every branch ends in a
//! user-facing string; nothing here returns an error to the caller.

use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use shared::{AnswerRequest, AssistantStore, CacheConfig, LimitsConfig, Mode, Role};

use crate::cache::CountryCache;
use crate::fallback::render_fallback;
use crate::gate::{check_scope, GateDecision};
use crate::limits::{ConcurrencyGuard, QuotaDecision, RateLimiter};
use crate::llm::LlmClient;
use crate::normalize::normalize;
use crate::render::render_with_model;
use crate::retrieval::{retrieve, RetrievalOutcome};
use crate::texts::{empty_request_reply, BUSY_REPLY, EMPTY_ANSWER_REPLY};

/// The assembled answer-generation pipeline.
///
/// `search` is the retrying retrieval client; `format` is the single-attempt
/// client shared by the gate classifier and the renderer.
pub struct AnswerPipeline {
    store: Arc<dyn AssistantStore>,
    search: Arc<dyn LlmClient>,
    format: Arc<dyn LlmClient>,
    guard: ConcurrencyGuard,
    limiter: RateLimiter,
    cache: CountryCache,
}

impl AnswerPipeline {
    pub fn new(
        store: Arc<dyn AssistantStore>,
        search: Arc<dyn LlmClient>,
        format: Arc<dyn LlmClient>,
        limits: LimitsConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(store.clone(), limits),
            cache: CountryCache::new(store.clone(), cache_config),
            guard: ConcurrencyGuard::new(),
            store,
            search,
            format,
        }
    }

    /// Produce one answer. Total: always returns a non-empty string, never
    /// panics and never raises; failures surface as user-facing text.
    pub async fn generate_answer(&self, request: &AnswerRequest) -> String {
        if request.validate().is_err() || request.text.trim().is_empty() {
            return empty_request_reply(request.mode).to_string();
        }

        // Busy flag is held until this token drops, on every exit path.
        let Some(_busy) = self.guard.try_acquire(request.user_id) else {
            return BUSY_REPLY.to_string();
        };

        if let QuotaDecision::Exceeded(reply) =
            self.limiter.check(request.user_id, request.mode).await
        {
            info!(user_id = request.user_id, mode = request.mode.as_str(), "Quota exceeded");
            return reply;
        }

        // Cache hits do not consume quota and are not persisted.
        if request.mode == Mode::Country {
            if let Some(answer) = self.cache.lookup(&request.text).await {
                info!(user_id = request.user_id, "Served country brief from cache");
                return answer;
            }
        }

        if let Err(error) = self
            .store
            .save_message(request.user_id, Role::User, &request.text, request.mode)
            .await
        {
            warn!(user_id = request.user_id, error = %error, "Could not persist user message");
        }

        if let GateDecision::OutOfScope(reply) =
            check_scope(self.format.as_ref(), &request.text, request.mode).await
        {
            info!(user_id = request.user_id, "Gate redirected out-of-scope message");
            self.persist_assistant_reply(request, &reply).await;
            return reply;
        }

        let answer = match retrieve(self.search.as_ref(), request).await {
            RetrievalOutcome::Failed(message) => message,
            RetrievalOutcome::Unstructured(text) => {
                if text.is_empty() {
                    EMPTY_ANSWER_REPLY.to_string()
                } else {
                    text
                }
            }
            RetrievalOutcome::Structured(value) => {
                let normalized = normalize(request.mode, &value, &request.text);
                let rendered =
                    match render_with_model(self.format.as_ref(), &request.text, request.mode, &normalized)
                        .await
                    {
                        Some(rendered) => rendered,
                        None => render_fallback(&normalized),
                    };
                if rendered.trim().is_empty() {
                    EMPTY_ANSWER_REPLY.to_string()
                } else {
                    rendered
                }
            }
        };

        if request.mode == Mode::Country {
            self.cache.store(&request.text, &answer).await;
        }

        self.persist_assistant_reply(request, &answer).await;

        answer
    }

    /// Chat history keeps assistant replies; country briefs are not part of
    /// a dialog and are only cached.
    async fn persist_assistant_reply(&self, request: &AnswerRequest, reply: &str) {
        if request.mode != Mode::Chat {
            return;
        }
        if let Err(error) = self
            .store
            .save_message(request.user_id, Role::Assistant, reply, request.mode)
            .await
        {
            warn!(user_id = request.user_id, error = %error, "Could not persist assistant reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedLlm};
    use serde_json::json;
    use tokio::sync::Notify;

    fn country_json() -> String {
        let sections: Vec<_> = [
            "Общая информация",
            "Визы и ВНЖ",
            "Работа и доходы",
            "Стоимость жизни",
            "Жильё",
            "Медицина и страховка",
            "Образование",
            "Официальные ресурсы",
        ]
        .iter()
        .map(|title| {
            json!({
                "title": title,
                "body": "Подробные сведения для переезда, работы и жизни в стране. \
                         Официальные порталы публикуют актуальные требования."
            })
        })
        .collect();
        json!({
            "country": "Германия",
            "sections": sections,
            "sources": ["https://www.bamf.de", "https://www.make-it-in-germany.com"]
        })
        .to_string()
    }

    fn gate_pass() -> &'static str {
        r#"{"in_scope": true, "reply": ""}"#
    }

    fn long_rendered() -> String {
        (1..=8)
            .map(|i| {
                format!(
                    "<b>{}. Раздел о визе, работе и жилье</b>\nПодробности о переезде и медицине.{}",
                    i,
                    " Дополнительные официальные сведения для будущих заявителей.".repeat(3)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn pipeline(
        store: Arc<MemoryStore>,
        search: Arc<ScriptedLlm>,
        format: Arc<ScriptedLlm>,
    ) -> AnswerPipeline {
        AnswerPipeline::new(
            store,
            search,
            format,
            LimitsConfig::default(),
            CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_country_flow_then_cache_hit() {
        let store = Arc::new(MemoryStore::new());
        let rendered = long_rendered();
        let search = Arc::new(ScriptedLlm::replies(&[&country_json()]));
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass(), &rendered]));
        let pipeline = pipeline(store.clone(), search.clone(), format.clone());

        let request = AnswerRequest::new(7, "Германия", Mode::Country);
        let first = pipeline.generate_answer(&request).await;
        assert_eq!(first, rendered);
        assert_eq!(search.call_count(), 1);
        assert_eq!(format.call_count(), 2);

        // Identical second request is served from cache: no further model calls.
        let second = pipeline.generate_answer(&request).await;
        assert_eq!(second, first);
        assert_eq!(search.call_count(), 1);
        assert_eq!(format.call_count(), 2);
    }

    #[tokio::test]
    async fn test_render_failure_uses_fallback() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::replies(&[&country_json()]));
        // Gate passes, then the renderer call fails (script exhausted).
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass()]));
        let pipeline = pipeline(store.clone(), search, format);

        let request = AnswerRequest::new(7, "Германия", Mode::Country);
        let answer = pipeline.generate_answer(&request).await;
        assert!(answer.contains("<b>1. Общая информация</b>"));
        assert!(answer.contains("<b>Источники:</b>\nhttps://www.bamf.de"));
    }

    #[tokio::test]
    async fn test_chat_flow_persists_both_messages() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::replies(&[
            r#"{"answer": "Да, виза нужна.", "clarify": ["Какая цель поездки?"], "sources": []}"#,
        ]));
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass(), "<b>Да, виза нужна.</b>"]));
        let pipeline = pipeline(store.clone(), search, format);

        let request = AnswerRequest::new(3, "Нужна ли виза в Германию?", Mode::Chat);
        let answer = pipeline.generate_answer(&request).await;
        assert_eq!(answer, "<b>Да, виза нужна.</b>");
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn test_gate_redirect_skips_retrieval() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::replies(&[]));
        let format = Arc::new(ScriptedLlm::replies(&[
            r#"{"in_scope": false, "reply": "Я отвечаю только на вопросы о миграции."}"#,
        ]));
        let pipeline = pipeline(store.clone(), search.clone(), format);

        let request = AnswerRequest::new(3, "Напиши сказку", Mode::Chat);
        let answer = pipeline.generate_answer(&request).await;
        assert_eq!(answer, "Я отвечаю только на вопросы о миграции.");
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_rejection_before_any_model_call() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..LimitsConfig::default().daily_chat_limit {
            store
                .save_message(5, Role::User, "вопрос", Mode::Chat)
                .await
                .unwrap();
        }
        let search = Arc::new(ScriptedLlm::replies(&[]));
        let format = Arc::new(ScriptedLlm::replies(&[]));
        let pipeline = pipeline(store, search.clone(), format.clone());

        let request = AnswerRequest::new(5, "вопрос", Mode::Chat);
        let answer = pipeline.generate_answer(&request).await;
        assert!(answer.contains("лимит"));
        assert_eq!(search.call_count(), 0);
        assert_eq!(format.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unstructured_retrieval_degrades_to_text() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::replies(&["**Виза** нужна [1] всем."]));
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass()]));
        let pipeline = pipeline(store, search, format.clone());

        let request = AnswerRequest::new(3, "Нужна ли виза?", Mode::Chat);
        let answer = pipeline.generate_answer(&request).await;
        assert_eq!(answer, "Виза нужна всем.");
        // Gate only; the renderer never runs on unstructured text.
        assert_eq!(format.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_user_facing() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::failing());
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass()]));
        let pipeline = pipeline(store.clone(), search, format);

        let request = AnswerRequest::new(3, "Германия", Mode::Country);
        let answer = pipeline.generate_answer(&request).await;
        assert!(answer.starts_with("Ошибка"));
        // Error strings never poison the cache.
        assert!(store.cached_country_info("германия").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_degenerate_answer_maps_to_no_content_reply() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::replies(&[
            r#"{"answer": "", "clarify": [], "sources": []}"#,
        ]));
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass(), "   "]));
        let pipeline = pipeline(store, search, format);

        let request = AnswerRequest::new(3, "вопрос о визе", Mode::Chat);
        let answer = pipeline.generate_answer(&request).await;
        assert_eq!(answer, EMPTY_ANSWER_REPLY);
    }

    #[tokio::test]
    async fn test_empty_request_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::replies(&[]));
        let format = Arc::new(ScriptedLlm::replies(&[]));
        let pipeline = pipeline(store, search.clone(), format);

        let request = AnswerRequest::new(3, "   ", Mode::Country);
        let answer = pipeline.generate_answer(&request).await;
        assert!(answer.contains("название страны"));
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_request_same_user_is_busy() {
        let store = Arc::new(MemoryStore::new());
        let notify = Arc::new(Notify::new());
        let search = Arc::new(ScriptedLlm::paused(&[&country_json()], notify.clone()));
        let format = Arc::new(ScriptedLlm::replies(&[gate_pass(), &long_rendered()]));
        let pipeline = Arc::new(pipeline(store, search.clone(), format));

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let request = AnswerRequest::new(9, "Германия", Mode::Country);
                pipeline.generate_answer(&request).await
            })
        };

        // Wait until the first request is blocked inside the retrieval call.
        while search.call_count() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let request = AnswerRequest::new(9, "Германия", Mode::Country);
        let second = pipeline.generate_answer(&request).await;
        assert_eq!(second, BUSY_REPLY);

        notify.notify_one();
        let first = first.await.unwrap();
        assert_ne!(first, BUSY_REPLY);

        // The guard was released: the same user is admitted again (cache hit).
        let third = pipeline.generate_answer(&request).await;
        assert_eq!(third, first);
    }

    #[tokio::test]
    async fn test_guard_released_after_failure() {
        let store = Arc::new(MemoryStore::new());
        let search = Arc::new(ScriptedLlm::failing());
        let format = Arc::new(ScriptedLlm::failing());
        let pipeline = pipeline(store, search, format);

        let request = AnswerRequest::new(4, "вопрос о визе", Mode::Chat);
        let first = pipeline.generate_answer(&request).await;
        assert!(first.starts_with("Ошибка"));

        // A failed run must not leave the user marked busy.
        let second = pipeline.generate_answer(&request).await;
        assert_ne!(second, BUSY_REPLY);
    }
}
