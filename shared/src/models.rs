//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Pipeline operating context: general assistant chat or a single-country brief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Chat,
    Country,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Country => "country",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Mode::Chat),
            "country" => Ok(Mode::Country),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Author of a persisted or in-flight conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the conversation history handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub text: String,
}

/// Migration profile fields a user may have filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub home_country: Option<String>,
    pub target_country: Option<String>,
    pub migration_goal: Option<String>,
    pub budget: Option<String>,
    pub profession: Option<String>,
    pub notes: Option<String>,
}

impl UserProfile {
    /// True if at least one profile field is filled in.
    pub fn has_data(&self) -> bool {
        [
            &self.home_country,
            &self.target_country,
            &self.migration_goal,
            &self.budget,
            &self.profession,
            &self.notes,
        ]
        .iter()
        .any(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// One answer-generation request. Immutable once constructed.
#[derive(Debug, Clone, Validate)]
pub struct AnswerRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
    pub mode: Mode,
    pub profile: Option<UserProfile>,
    pub history: Vec<HistoryMessage>,
}

impl AnswerRequest {
    pub fn new(user_id: i64, text: impl Into<String>, mode: Mode) -> Self {
        Self {
            user_id,
            text: text.into(),
            mode,
            profile: None,
            history: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: Option<UserProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }
}

/// One title/body block of a country brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub body: String,
}

/// Normalized structured answer for chat mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub clarify: Vec<String>,
    pub sources: Vec<String>,
}

/// Normalized structured answer for country mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryAnswer {
    pub country: String,
    pub sections: Vec<Section>,
    pub sources: Vec<String>,
}

/// Validated structured answer, one variant per mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum StructuredAnswer {
    Chat(ChatAnswer),
    Country(CountryAnswer),
}

/// One cached country brief.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CachedCountryInfo {
    pub country_key: String,
    pub country_query: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        assert_eq!("chat".parse::<Mode>().unwrap(), Mode::Chat);
        assert_eq!("country".parse::<Mode>().unwrap(), Mode::Country);
        assert!("other".parse::<Mode>().is_err());
        assert_eq!(Mode::Country.as_str(), "country");
    }

    #[test]
    fn test_empty_request_rejected() {
        let request = AnswerRequest::new(1, "", Mode::Chat);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_profile_has_data() {
        let mut profile = UserProfile::default();
        assert!(!profile.has_data());
        profile.target_country = Some("Германия".to_string());
        assert!(profile.has_data());
        profile.target_country = Some("   ".to_string());
        assert!(!profile.has_data());
    }
}
