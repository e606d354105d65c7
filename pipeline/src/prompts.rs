//! Prompt templates and context builders.
//!
//! All user-visible model output is Russian; the instruction scaffolding is
//! English because the search models follow it more reliably.

use shared::{HistoryMessage, Mode, Role, UserProfile};

use crate::llm::truncate_chars;

/// Character budget for the user's question inside a prompt.
pub const MAX_QUESTION_CHARS: usize = 2000;
/// History items included in chat context.
pub const HISTORY_MAX_ITEMS: usize = 6;
/// Character budget per history item.
pub const HISTORY_ITEM_CHARS: usize = 500;
/// Character budget for the whole history block.
pub const HISTORY_TOTAL_CHARS: usize = 4000;

/// Expected number of sections in a country brief.
pub const COUNTRY_SECTION_COUNT: usize = 8;

/// Section plan of a country brief, in order.
pub const COUNTRY_SECTION_TITLES: [&str; COUNTRY_SECTION_COUNT] = [
    "Общая информация",
    "Визы и ВНЖ",
    "Работа и доходы",
    "Стоимость жизни",
    "Жильё",
    "Медицина и страховка",
    "Образование",
    "Официальные ресурсы",
];

pub const CHAT_SYSTEM_PROMPT: &str = "\
Ты — ассистент по международной миграции: визы, ВНЖ, гражданство, работа и учёба за рубежом, \
стоимость жизни и адаптация. Отвечаешь только на русском языке, кратко и по делу.\n\
Return EXACTLY ONE JSON object and nothing else, with this schema:\n\
{\"answer\": string, \"clarify\": [string], \"sources\": [string]}\n\
- \"answer\": 2-6 sentences in Russian, no markdown, no citation markers like [1].\n\
- \"clarify\": 0-2 short follow-up questions in Russian, empty array if the question is specific.\n\
- \"sources\": real official URLs only (government portals, embassies), plain http(s) strings, \
empty array if none apply.\n\
Do not invent URLs. Do not wrap the JSON in markdown fences.";

pub const COUNTRY_SYSTEM_PROMPT: &str = "\
Ты готовишь краткую миграционную справку по одной стране на русском языке.\n\
Return EXACTLY ONE JSON object and nothing else, with this schema:\n\
{\"country\": string, \"sections\": [{\"title\": string, \"body\": string}], \"sources\": [string]}\n\
- \"sections\": exactly 8 objects, in this order: \
1. Общая информация; 2. Визы и ВНЖ; 3. Работа и доходы; 4. Стоимость жизни; 5. Жильё; \
6. Медицина и страховка; 7. Образование; 8. Официальные ресурсы.\n\
- Each \"body\": 2-5 sentences in Russian, no markdown, no citation markers.\n\
- \"sources\": real official URLs only, plain http(s) strings.\n\
Do not ask questions. Do not add any text before or after the JSON object.";

pub const GATE_SYSTEM_PROMPT: &str = "\
You are a scope classifier for a Russian-language migration assistant. The assistant only \
answers questions about migration: visas, residence permits, citizenship, moving abroad, \
work and study abroad, cost of living and adaptation.\n\
Return EXACTLY ONE JSON object: {\"in_scope\": boolean, \"reply\": string}\n\
- \"in_scope\": true if the message belongs to the assistant's scope or is a country name.\n\
- \"reply\": when in_scope is false, a short polite refusal in Russian asking the user to \
rephrase the question in a migration context; empty string otherwise.";

pub const RENDER_SYSTEM_PROMPT: &str = "\
You format a prepared JSON answer for a Russian-language messenger bot.\n\
Rules:\n\
- Reproduce the JSON's factual content VERBATIM: do not add, drop or change any facts, \
numbers, names or URLs. Do not introduce anything that is not in the JSON.\n\
- Output plain text with ONLY these HTML tags allowed: <b>, <i>, <u>, <s>, <code>, <pre>, \
<a href=\"...\">. No other markup, no markdown, no citation markers.\n\
- Use blank lines between blocks. Keep the original order of sections and sources.\n\
- The output language is Russian.";

/// Profile block for the chat prompt. Empty string when there is nothing to tell.
pub fn build_profile_context(profile: Option<&UserProfile>) -> String {
    let Some(profile) = profile else {
        return String::new();
    };

    let mut parts: Vec<String> = Vec::new();
    let mut push = |label: &str, value: &Option<String>| {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            parts.push(format!("- {}: {}", label, value));
        }
    };
    push("страна проживания", &profile.home_country);
    push("страна, куда хочет переехать", &profile.target_country);
    push("цель переезда", &profile.migration_goal);
    push("примерный бюджет", &profile.budget);
    push("профессия/сфера", &profile.profession);
    push("дополнительные заметки", &profile.notes);

    if parts.is_empty() {
        return String::new();
    }
    format!("Из профиля пользователя известно:\n{}\n\n", parts.join("\n"))
}

/// History block for the chat prompt, oldest to newest, bounded by the
/// per-item and total character budgets.
pub fn build_history_context(history: &[HistoryMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut total = 0usize;
    let start = history.len().saturating_sub(HISTORY_MAX_ITEMS);
    for message in &history[start..] {
        let text = message.text.trim();
        if text.is_empty() {
            continue;
        }
        let prefix = match message.role {
            Role::User => "Пользователь",
            Role::Assistant => "Ассистент",
        };
        let line = format!("{}: {}", prefix, truncate_chars(text, HISTORY_ITEM_CHARS));
        total += line.chars().count();
        if total > HISTORY_TOTAL_CHARS {
            break;
        }
        lines.push(line);
    }

    if lines.is_empty() {
        return String::new();
    }
    format!(
        "Краткая история последних сообщений (от старых к новым):\n{}\n\n",
        lines.join("\n")
    )
}

/// User content of the structured-retrieval call.
pub fn build_retrieval_content(
    text: &str,
    mode: Mode,
    profile: Option<&UserProfile>,
    history: &[HistoryMessage],
) -> String {
    let question = truncate_chars(text.trim(), MAX_QUESTION_CHARS);
    match mode {
        Mode::Country => format!(
            "The user requested a short migration-related overview for a single country.\n\
             Country name (as provided by the user): {}\n\
             Follow the system prompt schema exactly: one JSON object, 8 sections, Russian text.",
            question
        ),
        Mode::Chat => format!(
            "{}{}Новое сообщение пользователя (на русском): {}\n\
             Answer per the system prompt schema: one JSON object, Russian text, no markdown.",
            build_profile_context(profile),
            build_history_context(history),
            question
        ),
    }
}

/// User content of the gate call.
pub fn build_gate_content(text: &str, mode: Mode) -> String {
    format!(
        "Mode: {}\nUser message: {}",
        mode.as_str(),
        truncate_chars(text.trim(), MAX_QUESTION_CHARS)
    )
}

/// User content of the renderer call: the normalized JSON plus the original question.
pub fn build_render_content(original_text: &str, mode: Mode, answer_json: &str) -> String {
    format!(
        "Mode: {}\nOriginal user message: {}\nJSON to format:\n{}",
        mode.as_str(),
        truncate_chars(original_text.trim(), MAX_QUESTION_CHARS),
        answer_json
    )
}
