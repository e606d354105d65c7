//! Domain gate: scope classifier for incoming messages.
//!
//! Advisory only. Any failure of the classifier call or its JSON contract
//! is treated as "gate absent" and the pipeline proceeds to retrieval.

use serde::Deserialize;
use tracing::debug;

use shared::Mode;

use crate::llm::{ChatRequest, LlmClient};
use crate::prompts::{build_gate_content, GATE_SYSTEM_PROMPT};
use crate::retrieval::extract_json_object;
use crate::texts::DEFAULT_REDIRECT;

/// Outcome of the scope check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed to retrieval.
    InScope,
    /// Stop and send the redirect reply back to the user.
    OutOfScope(String),
}

#[derive(Debug, Deserialize)]
struct GateVerdict {
    in_scope: bool,
    #[serde(default)]
    reply: String,
}

/// Classify one message. Fail-open: errors never block the pipeline.
pub async fn check_scope(client: &dyn LlmClient, text: &str, mode: Mode) -> GateDecision {
    let request = ChatRequest {
        system: GATE_SYSTEM_PROMPT.to_string(),
        user: build_gate_content(text, mode),
        temperature: 0.0,
    };

    let response = match client.chat(&request).await {
        Ok(response) => response,
        Err(error) => {
            debug!(error = %error, "Gate call failed, proceeding without gate");
            return GateDecision::InScope;
        }
    };

    let Some(json) = extract_json_object(&response) else {
        debug!("Gate returned no JSON object, proceeding without gate");
        return GateDecision::InScope;
    };

    match serde_json::from_value::<GateVerdict>(json) {
        Ok(verdict) if verdict.in_scope => GateDecision::InScope,
        Ok(verdict) => {
            let reply = verdict.reply.trim();
            let reply = if reply.is_empty() {
                DEFAULT_REDIRECT.to_string()
            } else {
                reply.to_string()
            };
            GateDecision::OutOfScope(reply)
        }
        Err(error) => {
            debug!(error = %error, "Gate verdict did not match contract, proceeding");
            GateDecision::InScope
        }
    }
}
