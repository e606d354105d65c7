//! Model-based renderer.
//!
//! Single-attempt, best-effort: re-expresses the normalized answer as
//! allow-listed markup. Any failure yields `None` and the caller falls back
//! to the deterministic renderer; this path is invisible to the end user.

use tracing::debug;

use shared::{Mode, StructuredAnswer};

use crate::cleanup::cleanup_model_text;
use crate::llm::{ChatRequest, LlmClient};
use crate::prompts::{build_render_content, RENDER_SYSTEM_PROMPT};

/// Render the normalized answer through the formatting model.
/// Returns `None` on any failure or empty output.
pub async fn render_with_model(
    client: &dyn LlmClient,
    original_text: &str,
    mode: Mode,
    answer: &StructuredAnswer,
) -> Option<String> {
    let answer_json = match serde_json::to_string(answer) {
        Ok(json) => json,
        Err(error) => {
            debug!(error = %error, "Could not serialize answer for rendering");
            return None;
        }
    };

    let request = ChatRequest {
        system: RENDER_SYSTEM_PROMPT.to_string(),
        user: build_render_content(original_text, mode, &answer_json),
        temperature: 0.0,
    };

    match client.chat(&request).await {
        Ok(response) => {
            let cleaned = cleanup_model_text(&response);
            if cleaned.is_empty() {
                debug!("Renderer returned empty output, falling back");
                None
            } else {
                Some(cleaned)
            }
        }
        Err(error) => {
            debug!(error = %error, "Renderer call failed, falling back");
            None
        }
    }
}
