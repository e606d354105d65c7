//! Deterministic fallback renderer.
//!
//! Builds the final markup from a normalized answer without any network
//! call. Identical input yields byte-identical output.

use shared::{ChatAnswer, CountryAnswer, StructuredAnswer};

use crate::cleanup::escape_html;

/// Clarify questions shown at most.
const MAX_CLARIFY: usize = 2;
/// Sources shown at most in chat mode.
const MAX_CHAT_SOURCES: usize = 10;

/// Render a normalized answer as allow-listed markup. A degenerate answer
/// (no sections, empty text) yields an empty string; the caller maps that
/// to a user-visible "no content" reply.
pub fn render_fallback(answer: &StructuredAnswer) -> String {
    match answer {
        StructuredAnswer::Chat(chat) => render_chat(chat),
        StructuredAnswer::Country(country) => render_country(country),
    }
}

fn render_chat(answer: &ChatAnswer) -> String {
    let mut blocks: Vec<String> = Vec::new();

    let text = answer.answer.trim();
    if !text.is_empty() {
        blocks.push(escape_html(text));
    }

    let clarify: Vec<String> = answer
        .clarify
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .take(MAX_CLARIFY)
        .map(|q| format!("• {}", escape_html(q)))
        .collect();
    if !clarify.is_empty() {
        blocks.push(clarify.join("\n"));
    }

    if let Some(sources) = source_block(&answer.sources, MAX_CHAT_SOURCES) {
        blocks.push(sources);
    }

    blocks.join("\n\n")
}

fn render_country(answer: &CountryAnswer) -> String {
    let mut blocks: Vec<String> = Vec::new();

    let country = answer.country.trim();
    if !country.is_empty() && !answer.sections.is_empty() {
        blocks.push(format!("<b>{}</b>", escape_html(country)));
    }

    for (index, section) in answer.sections.iter().enumerate() {
        let title = section.title.trim();
        let body = section.body.trim();
        let mut block = String::new();
        if !title.is_empty() {
            block.push_str(&format!("<b>{}. {}</b>", index + 1, escape_html(title)));
        }
        if !body.is_empty() {
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(&escape_html(body));
        }
        if !block.is_empty() {
            blocks.push(block);
        }
    }

    if let Some(sources) = source_block(&answer.sources, usize::MAX) {
        blocks.push(sources);
    }

    blocks.join("\n\n")
}

fn source_block(sources: &[String], max: usize) -> Option<String> {
    let urls: Vec<&str> = sources
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(max)
        .collect();
    if urls.is_empty() {
        return None;
    }
    Some(format!("<b>Источники:</b>\n{}", urls.join("\n")))
}
