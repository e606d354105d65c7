//! Fixed user-facing replies and error strings (Russian).

use crate::llm::LlmError;

/// Reply when the user's previous request is still in flight.
pub const BUSY_REPLY: &str =
    "Я ещё отвечаю на ваш предыдущий запрос. Подождите, пожалуйста 🙌";

/// Default redirect when the gate rejects a message but supplies no reply.
pub const DEFAULT_REDIRECT: &str = "Я помогаю только с вопросами о миграции: визы, ВНЖ, \
гражданство, работа и учёба за рубежом, стоимость жизни и адаптация. Переформулируйте, \
пожалуйста, вопрос в миграционном контексте.";

/// Reply when the pipeline produced no usable content.
pub const EMPTY_ANSWER_REPLY: &str =
    "Не получилось подготовить ответ. Попробуйте переформулировать вопрос.";

/// Reply for an empty or oversized request, before any model call.
pub fn empty_request_reply(mode: shared::Mode) -> &'static str {
    match mode {
        shared::Mode::Country => {
            "Пожалуйста, введите название страны, например: Франция, Германия, Канада."
        }
        shared::Mode::Chat => "Пожалуйста, введите вопрос о миграции.",
    }
}

/// Reply when the daily quota for the mode is exhausted.
pub fn quota_reply(limit: i64) -> String {
    format!(
        "Дневной лимит запросов ({}) исчерпан. Лимит обновится завтра (по UTC).",
        limit
    )
}

/// User-facing string for one failed model call, one phrasing per failure class.
pub fn llm_error_reply(error: &LlmError) -> String {
    match error {
        LlmError::MissingCredential => {
            "Ошибка: ключ API не настроен. Обратитесь к администратору бота.".to_string()
        }
        LlmError::Timeout => {
            "Ошибка: таймаут при обращении к модели. Попробуйте ещё раз.".to_string()
        }
        LlmError::Connect(_) => {
            "Ошибка соединения с моделью. Попробуйте ещё раз чуть позже.".to_string()
        }
        LlmError::Status { status, body } => format!("Ошибка HTTP {}: {}", status, body),
        LlmError::InvalidBody { status, body } => {
            format!("Ошибка: ответ не JSON. HTTP {}: {}", status, body)
        }
        LlmError::Api(message) => format!("Ошибка от модели: {}", message),
    }
}
