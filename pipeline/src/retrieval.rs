//! Structured retrieval: the search-augmented model call.
//!
//! The only stage with automatic retries, and the only one whose failure is
//! surfaced to the user ("fail-closed"). A successful call whose body does
//! not contain a JSON object degrades to cleaned plain text instead.

use serde_json::Value;
use tracing::{debug, warn};

use shared::AnswerRequest;

use crate::cleanup::cleanup_model_text;
use crate::llm::{ChatRequest, LlmClient};
use crate::prompts::{build_retrieval_content, CHAT_SYSTEM_PROMPT, COUNTRY_SYSTEM_PROMPT};
use crate::texts::llm_error_reply;

/// Result of one retrieval call. Exactly one variant reaches the caller.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// Response contained one parsable JSON object.
    Structured(Value),
    /// Response was usable text but not the JSON contract; already cleaned.
    Unstructured(String),
    /// Call failed; carries the user-facing error string.
    Failed(String),
}

/// Extract the outermost brace-delimited JSON object from possibly noisy
/// model text (greedy: first `{` to last `}`). Returns objects only.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Issue the retrieval call for one request.
pub async fn retrieve(client: &dyn LlmClient, request: &AnswerRequest) -> RetrievalOutcome {
    let system = match request.mode {
        shared::Mode::Chat => CHAT_SYSTEM_PROMPT,
        shared::Mode::Country => COUNTRY_SYSTEM_PROMPT,
    };
    let chat = ChatRequest {
        system: system.to_string(),
        user: build_retrieval_content(
            &request.text,
            request.mode,
            request.profile.as_ref(),
            &request.history,
        ),
        temperature: 0.3,
    };

    let response = match client.chat(&chat).await {
        Ok(response) => response,
        Err(error) => {
            warn!(mode = request.mode.as_str(), error = %error, "Retrieval call failed");
            return RetrievalOutcome::Failed(llm_error_reply(&error));
        }
    };

    match extract_json_object(&response) {
        Some(value) => RetrievalOutcome::Structured(value),
        None => {
            debug!(
                mode = request.mode.as_str(),
                "Retrieval response had no JSON object, degrading to plain text"
            );
            RetrievalOutcome::Unstructured(cleanup_model_text(&response))
        }
    }
}
